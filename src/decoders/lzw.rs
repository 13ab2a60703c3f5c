//! LZWDecode implementation.
//!
//! PDF's LZW variant reads MSB-first codes starting at 9 bits, with clear
//! code 256 and end code 257. With `EarlyChange` 1 (the default) the code
//! width grows one code earlier than in GIF.

use weezl::BitOrder;
use weezl::decode::Decoder as WeezlDecoder;

use crate::decoders::StreamDecoder;
use crate::decoders::predictor::{DecodeParams, decode_predictor};
use crate::error::{Error, Result};
use crate::object::PdfDictionary;

const CLEAR_CODE: u16 = 256;
const EOD_CODE: u16 = 257;
const FIRST_CODE: u16 = 258;
const MAX_CODE_BITS: u8 = 12;

/// LZWDecode filter implementation.
pub struct LzwDecoder;

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8], params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
        let early_change = params.map(|p| p.get_integer_or("EarlyChange", 1)).unwrap_or(1) != 0;
        let decoded = match decode_lzw_weezl(input, early_change) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("{}, falling back to table decoder", e);
                decode_lzw_table(input, early_change)?
            },
        };
        let params = DecodeParams::from_dict(params);
        if params.predictor > 1 {
            decode_predictor(&decoded, &params)
        } else {
            Ok(decoded)
        }
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

fn decode_lzw_weezl(input: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        WeezlDecoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(input)
        .map_err(|e| Error::Decode(format!("LZWDecode error: {:?}", e)))
}

/// Straightforward string-table decoder for inputs weezl rejects
/// (for example a missing clear code at the start).
fn decode_lzw_table(input: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut table: Vec<Vec<u8>> = initial_table();
    let mut code_bits = 9u8;
    let mut reader = BitReader::new(input);
    let mut previous: Option<Vec<u8>> = None;

    while let Some(code) = reader.read_bits(code_bits) {
        let code = code as u16;
        if code == EOD_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table = initial_table();
            code_bits = 9;
            previous = None;
            continue;
        }

        let entry = match (table.get(code as usize), &previous) {
            (Some(entry), _) => entry.clone(),
            (None, Some(prev)) if code as usize == table.len() => {
                let mut entry = prev.clone();
                entry.push(prev[0]);
                entry
            },
            _ => {
                return Err(Error::Decode(format!(
                    "Invalid LZW code: {} (table size: {})",
                    code,
                    table.len()
                )));
            },
        };
        output.extend_from_slice(&entry);

        if let Some(prev) = previous.take() {
            if table.len() < 4096 {
                let mut added = prev;
                added.push(entry[0]);
                table.push(added);
            }
        }
        previous = Some(entry);

        let next = table.len() + usize::from(early_change);
        if code_bits < MAX_CODE_BITS && next >= (1usize << code_bits) {
            code_bits += 1;
        }
    }

    Ok(output)
}

fn initial_table() -> Vec<Vec<u8>> {
    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    // Placeholders for the clear and end codes.
    table.push(Vec::new());
    table.push(Vec::new());
    debug_assert_eq!(table.len(), FIRST_CODE as usize);
    table
}

/// Bit reader for MSB-first bit ordering.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read_bits(&mut self, n: u8) -> Option<u32> {
        if self.bit_pos + n as usize > self.data.len() * 8 {
            return None;
        }
        let mut result = 0u32;
        for _ in 0..n {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            result = (result << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder as LzwEncoder;

    #[test]
    fn test_lzw_early_change_default() {
        let original = b"The quick brown fox jumps over the lazy dog. ".repeat(40);
        let compressed = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();
        assert_eq!(LzwDecoder.decode(&compressed, None).unwrap(), original);
    }

    #[test]
    fn test_lzw_without_early_change() {
        let original = b"ABCABCABCABC".repeat(60);
        let compressed = LzwEncoder::new(BitOrder::Msb, 8).encode(&original).unwrap();
        let params = PdfDictionary::new().with("EarlyChange", 0);
        assert_eq!(LzwDecoder.decode(&compressed, Some(&params)).unwrap(), original);
    }

    #[test]
    fn test_table_decoder_matches_weezl() {
        let original = b"TOBEORNOTTOBEORTOBEORNOT".repeat(30);
        let compressed = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();
        assert_eq!(decode_lzw_table(&compressed, true).unwrap(), original);
    }

    #[test]
    fn test_bit_reader() {
        let mut reader = BitReader::new(&[0b1010_0000, 0xFF]);
        assert_eq!(reader.read_bits(3), Some(0b101));
        assert_eq!(reader.read_bits(9), Some(0b0_0000_1111));
        assert_eq!(reader.read_bits(9), None);
    }
}
