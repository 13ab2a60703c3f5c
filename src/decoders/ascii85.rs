//! ASCII85Decode (Base85) implementation.
//!
//! Four bytes are represented by five characters in the range '!' to 'u'.
//! 'z' stands for four zero bytes and '~>' ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use crate::object::PdfDictionary;

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8], _params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 4 / 5);
        let mut group = Vec::with_capacity(5);

        let body = input.strip_prefix(b"<~").unwrap_or(input);
        for &byte in body.iter().take_while(|&&b| b != b'~') {
            match byte {
                b'z' if group.is_empty() => output.extend_from_slice(&[0; 4]),
                b'z' => {
                    return Err(Error::Decode("ASCII85Decode: 'z' inside a group".to_string()));
                },
                b'!'..=b'u' => {
                    group.push(byte - b'!');
                    if group.len() == 5 {
                        output.extend_from_slice(&group_value(&group)?.to_be_bytes());
                        group.clear();
                    }
                },
                b if b.is_ascii_whitespace() || b == 0 => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character '{}'",
                        other as char
                    )));
                },
            }
        }

        match group.len() {
            0 => {},
            1 => return Err(Error::Decode("ASCII85Decode: lone trailing character".to_string())),
            kept => {
                // A short final group is padded with 'u' and yields one byte
                // less than it has characters.
                group.resize(5, 84);
                output.extend_from_slice(&group_value(&group)?.to_be_bytes()[..kept - 1]);
            },
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

/// Base-85 value of five digits.
fn group_value(digits: &[u8]) -> Result<u32> {
    let value = digits.iter().fold(0u64, |acc, &d| acc * 85 + u64::from(d));
    u32::try_from(value).map_err(|_| Error::Decode("ASCII85Decode: group overflows".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii85_decode_group() {
        let output = Ascii85Decoder.decode(b"<+U,m~>", None).unwrap();
        assert_eq!(output, b"Test");
    }

    #[test]
    fn test_ascii85_decode_z() {
        let output = Ascii85Decoder.decode(b"zz", None).unwrap();
        assert_eq!(output, vec![0u8; 8]);
    }

    #[test]
    fn test_ascii85_decode_partial_group() {
        // "Hi" encodes to a three-character partial group.
        let output = Ascii85Decoder.decode(b"88/~>", None).unwrap();
        assert_eq!(output, b"Hi");
    }

    #[test]
    fn test_ascii85_decode_with_prefix() {
        assert_eq!(Ascii85Decoder.decode(b"<~<+U,m~>", None).unwrap(), b"Test");
    }

    #[test]
    fn test_ascii85_decode_errors() {
        assert!(Ascii85Decoder.decode(b"uuuuu", None).is_err());
        assert!(Ascii85Decoder.decode(b"!z", None).is_err());
        assert!(Ascii85Decoder.decode(b"!", None).is_err());
        assert!(Ascii85Decoder.decode(b"abc{", None).is_err());
    }
}
