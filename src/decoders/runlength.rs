//! RunLengthDecode implementation.
//!
//! - Length byte 0-127: copy the next N+1 bytes literally
//! - Length byte 128: end of data
//! - Length byte 129-255: repeat the next byte 257-N times

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use crate::object::PdfDictionary;

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8], _params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut rest = input;

        while let Some((&length, tail)) = rest.split_first() {
            rest = match length {
                128 => break,
                0..=127 => {
                    let run = usize::from(length) + 1;
                    let literal = tail.get(..run).ok_or_else(|| {
                        Error::Decode(format!(
                            "RunLengthDecode: literal run of {} bytes, {} left",
                            run,
                            tail.len()
                        ))
                    })?;
                    output.extend_from_slice(literal);
                    &tail[run..]
                },
                _ => {
                    let (&byte, after) = tail.split_first().ok_or_else(|| {
                        Error::Decode("RunLengthDecode: repeat run without a byte".to_string())
                    })?;
                    output.extend(std::iter::repeat(byte).take(257 - usize::from(length)));
                    after
                },
            };
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runlength_decode_mixed() {
        let input = vec![1, b'H', b'i', 254, b'X'];
        assert_eq!(RunLengthDecoder.decode(&input, None).unwrap(), b"HiXXX");
    }

    #[test]
    fn test_runlength_decode_eod_marker() {
        let input = vec![1, b'H', b'i', 128, 99, 99, 99];
        assert_eq!(RunLengthDecoder.decode(&input, None).unwrap(), b"Hi");
    }

    #[test]
    fn test_runlength_decode_max_run() {
        let output = RunLengthDecoder.decode(&[129, b'B'], None).unwrap();
        assert_eq!(output, vec![b'B'; 128]);
    }

    #[test]
    fn test_runlength_truncated_input() {
        assert!(RunLengthDecoder.decode(&[4, b'A', b'B'], None).is_err());
        assert!(RunLengthDecoder.decode(&[252], None).is_err());
    }
}
