use std::collections::HashMap;

/// Replaces each whitespace-delimited token that is a key of `slang` with its
/// canonical form and rejoins the tokens with single spaces.
pub fn correct(text: &str, slang: &HashMap<String, String>) -> String {
    text.split_whitespace()
        .map(|token| slang.get(token).map(String::as_str).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}
