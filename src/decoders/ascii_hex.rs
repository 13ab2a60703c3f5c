//! ASCIIHexDecode implementation.
//!
//! Decodes hexadecimal-encoded data (e.g., "48656C6C6F" -> "Hello").
//! Whitespace is ignored, decoding stops at '>', and a trailing odd digit is
//! padded with an implicit '0'.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use crate::object::PdfDictionary;

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8], _params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut digits = input
            .iter()
            .copied()
            .take_while(|&c| c != b'>')
            .filter(|c| !c.is_ascii_whitespace() && *c != 0);

        while let Some(high) = digits.next() {
            let low = digits.next().unwrap_or(b'0');
            let value = |digit: u8| {
                hex_digit_to_value(digit).ok_or_else(|| {
                    Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", digit as char))
                })
            };
            output.push((value(high)? << 4) | value(low)?);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Convert a hexadecimal ASCII character to its numeric value.
pub(crate) fn hex_digit_to_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_hex_decode_simple() {
        let output = AsciiHexDecoder.decode(b"48656C6C6F", None).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_ascii_hex_decode_with_whitespace() {
        let output = AsciiHexDecoder.decode(b"48 65\n6C 6C 6F", None).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_ascii_hex_decode_odd_length() {
        let output = AsciiHexDecoder.decode(b"486", None).unwrap();
        assert_eq!(output, b"H`");
    }

    #[test]
    fn test_ascii_hex_decode_stops_at_end_marker() {
        let output = AsciiHexDecoder.decode(b"48656c6C6F>garbage", None).unwrap();
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_ascii_hex_decode_invalid_digit() {
        assert!(AsciiHexDecoder.decode(b"4G", None).is_err());
    }

    #[test]
    fn test_hex_digit_to_value() {
        assert_eq!(hex_digit_to_value(b'0'), Some(0));
        assert_eq!(hex_digit_to_value(b'f'), Some(15));
        assert_eq!(hex_digit_to_value(b'F'), Some(15));
        assert_eq!(hex_digit_to_value(b'G'), None);
    }
}
