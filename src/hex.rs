use std::num::ParseIntError;

/// Decode a string of hex digit pairs (`"1B40"`) into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, ParseIntError> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2).unwrap_or(""), 16))
        .collect()
}
