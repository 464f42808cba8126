/// Lower-cases `text` and replaces every code point outside `[a-z0-9]` with a
/// single space. Runs of spaces are left as they are.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect()
}
