use encoding_rs::mem;

/// Decodes ISO-8859-1 bytes: each byte becomes the code point of equal value,
/// so decoding never fails. This is true Latin-1, not the WHATWG
/// `windows-1252` that the `iso-8859-1` label resolves to.
pub fn decode_latin1(bytes: &[u8]) -> String {
    mem::decode_latin1(bytes).into_owned()
}
