//! Stream filter pipeline.
//!
//! A stream's `Filter` entry (a name or an array of names) together with the
//! positionally matched `DecodeParms` selects an ordered chain of decoders.
//! The [`DecoderRegistry`] runs that chain: the output of stage *i* is the
//! input of stage *i + 1*, and the first failing stage aborts the whole
//! chain.
//!
//! Built-in decoders:
//! - FlateDecode (zlib/deflate, with PNG/TIFF predictors)
//! - LZWDecode (with PNG/TIFF predictors and EarlyChange)
//! - ASCIIHexDecode
//! - ASCII85Decode
//! - RunLengthDecode
//!
//! CCITTFaxDecode, JBIG2Decode, DCTDecode and JPXDecode are recognized but
//! have no built-in codec; a chain that contains one fails with
//! [`Error::UnsupportedFilter`] unless a decoder for it has been registered.
//! Unrecognized names are passed through unchanged.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::object::PdfDictionary;

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii_hex::AsciiHexDecoder;
pub use ascii85::Ascii85Decoder;
pub use flate::{FlateCompressor, FlateDecoder};
pub use lzw::LzwDecoder;
pub use predictor::{DecodeParams, decode_predictor};
pub use runlength::RunLengthDecoder;

/// Default maximum decoded stream size: 100 MB.
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

/// Filters whose codecs are outside this crate.
const EXTERNAL_FILTERS: &[&str] = &["CCITTFaxDecode", "JBIG2Decode", "DCTDecode", "JPXDecode"];

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode `input` using the optional `DecodeParms` dictionary for this stage.
    fn decode(&self, input: &[u8], params: Option<&PdfDictionary>) -> Result<Vec<u8>>;

    /// Filter name this decoder handles (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Encoder used when saving unfiltered streams.
pub trait Compressor {
    /// Encode `input`.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name to record in the stream dictionary.
    fn filter_name(&self) -> &str;
}

/// Map inline-image abbreviations to full filter names.
pub fn canonical_filter_name(name: &str) -> &str {
    match name {
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "LZW" => "LZWDecode",
        "Fl" => "FlateDecode",
        "RL" => "RunLengthDecode",
        "CCF" => "CCITTFaxDecode",
        "DCT" => "DCTDecode",
        other => other,
    }
}

/// Decoders by filter name, plus the decoded size limit.
pub struct DecoderRegistry {
    decoders: HashMap<String, Box<dyn StreamDecoder>>,
    max_decompressed_size: usize,
}

impl DecoderRegistry {
    /// Registry with no decoders.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Registry with the built-in decoders.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(FlateDecoder));
        registry.register(Box::new(LzwDecoder));
        registry.register(Box::new(AsciiHexDecoder));
        registry.register(Box::new(Ascii85Decoder));
        registry.register(Box::new(RunLengthDecoder));
        registry
    }

    /// Set the maximum decoded size (0 disables the check).
    pub fn with_max_decompressed_size(mut self, limit: usize) -> Self {
        self.max_decompressed_size = limit;
        self
    }

    /// Register (or replace) the decoder for `decoder.name()`.
    pub fn register(&mut self, decoder: Box<dyn StreamDecoder>) {
        self.decoders.insert(decoder.name().to_string(), decoder);
    }

    /// True if a decoder is registered for `name`.
    pub fn supports(&self, name: &str) -> bool {
        self.decoders.contains_key(canonical_filter_name(name))
    }

    /// Run `filters` over `data` in order.
    ///
    /// `params[i]` belongs to `filters[i]`; missing entries mean no parameters.
    pub fn decode_chain(
        &self,
        data: &[u8],
        filters: &[String],
        params: &[Option<PdfDictionary>],
    ) -> Result<Vec<u8>> {
        let mut current = data.to_vec();
        for (i, filter) in filters.iter().enumerate() {
            let name = canonical_filter_name(filter);
            let stage_params = params.get(i).and_then(Option::as_ref);
            current = match self.decoders.get(name) {
                Some(decoder) => decoder.decode(&current, stage_params)?,
                None if name == "Crypt" => crypt_passthrough(current, stage_params)?,
                None if EXTERNAL_FILTERS.contains(&name) => {
                    return Err(Error::UnsupportedFilter(name.to_string()));
                },
                None => {
                    log::warn!("Unknown filter {}, passing data through", filter);
                    current
                },
            };

            if self.max_decompressed_size > 0 && current.len() > self.max_decompressed_size {
                return Err(Error::Decode(format!(
                    "Decompression bomb detected: decompressed size {} bytes exceeds limit {} bytes",
                    current.len(),
                    self.max_decompressed_size
                )));
            }
        }
        Ok(current)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The Identity crypt filter leaves data unchanged; others need a security handler.
fn crypt_passthrough(data: Vec<u8>, params: Option<&PdfDictionary>) -> Result<Vec<u8>> {
    let name = params
        .and_then(|p| p.get_name("Name"))
        .unwrap_or_else(|| "Identity".to_string());
    if name == "Identity" {
        Ok(data)
    } else {
        Err(Error::UnsupportedFilter(format!("Crypt/{}", name)))
    }
}
