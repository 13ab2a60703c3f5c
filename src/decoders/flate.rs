//! FlateDecode (zlib/deflate) implementation and the matching compressor.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::decoders::predictor::{DecodeParams, decode_predictor};
use crate::decoders::{Compressor, StreamDecoder};
use crate::error::{Error, Result};
use crate::object::PdfDictionary;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8], params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
        let inflated = inflate(input)?;
        let params = DecodeParams::from_dict(params);
        if params.predictor > 1 {
            decode_predictor(&inflated, &params)
        } else {
            Ok(inflated)
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

fn inflate(input: &[u8]) -> Result<Vec<u8>> {
    let zlib_err = match inflate_complete(input, true) {
        Ok(output) => return Ok(output),
        Err(e) => e,
    };

    // Some writers omit the zlib wrapper.
    log::debug!("Zlib decode failed ({}), trying raw deflate", zlib_err);
    match inflate_complete(input, false) {
        Ok(output) if !output.is_empty() => Ok(output),
        Ok(_) => Err(Error::Decode(format!(
            "FlateDecode decompression failed: {} ({} input bytes)",
            zlib_err,
            input.len()
        ))),
        Err(deflate_err) => Err(Error::Decode(format!(
            "FlateDecode decompression failed: zlib: {}, deflate: {} ({} input bytes)",
            zlib_err,
            deflate_err,
            input.len()
        ))),
    }
}

/// Inflate `input`, succeeding only when the stream reaches its end marker.
/// A truncated or corrupt stream is an error even if some bytes came out.
fn inflate_complete(input: &[u8], zlib_header: bool) -> std::result::Result<Vec<u8>, String> {
    let mut decompress = Decompress::new(zlib_header);
    let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(64));
    loop {
        if output.len() == output.capacity() {
            output.reserve(output.capacity().max(64));
        }
        let before = (decompress.total_in(), decompress.total_out());
        let consumed = usize::try_from(before.0).unwrap_or(input.len()).min(input.len());
        let status = decompress
            .decompress_vec(&input[consumed..], &mut output, FlushDecompress::Finish)
            .map_err(|e| e.to_string())?;
        if matches!(status, Status::StreamEnd) {
            return Ok(output);
        }
        if (decompress.total_in(), decompress.total_out()) == before {
            return Err(format!(
                "stream ends early after {} of {} input bytes ({} bytes inflated)",
                consumed,
                input.len(),
                output.len()
            ));
        }
    }
}

/// Zlib compressor used for `FlateDecode` output.
#[derive(Debug, Clone, Copy)]
pub struct FlateCompressor {
    level: u32,
}

impl FlateCompressor {
    /// Compressor with an explicit level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for FlateCompressor {
    fn default() -> Self {
        Self::with_level(6)
    }
}

impl Compressor for FlateCompressor {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(input)
            .map_err(|e| Error::Encode(format!("Failed to compress: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::Encode(format!("Failed to finish compression: {}", e)))
    }

    fn filter_name(&self) -> &str {
        "FlateDecode"
    }
}
