use once_cell::sync::Lazy;
use regex::Regex;

/// Removes escape debris left behind when tweets were exported with their
/// UTF-8 bytes spelled out (`\xf0\x9f...`): first every backslash, then every
/// `x` followed by digits.
pub fn strip_encoding_artifacts(text: &str) -> String {
    static ESCAPED_BYTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"x\d+").unwrap());

    let without_backslashes = text.replace('\\', "");
    ESCAPED_BYTE
        .replace_all(&without_backslashes, "")
        .into_owned()
}
