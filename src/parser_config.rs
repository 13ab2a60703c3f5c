//! Reader configuration.

use crate::decoders::{DEFAULT_MAX_DECOMPRESSED_SIZE, DecoderRegistry};

/// Options controlling how strictly a file is read.
///
/// # Example
///
/// ```
/// use pdf_graft::parser_config::ReaderOptions;
///
/// let strict = ReaderOptions::strict();
/// assert!(strict.strict);
///
/// let custom = ReaderOptions::default().with_max_nesting(32);
/// assert_eq!(custom.max_nesting, 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Fail on spec violations instead of recovering.
    ///
    /// In strict mode a stream whose `Length` does not land on `endstream`,
    /// a missing `endobj`, or a `stream` keyword without a proper EOL is an
    /// error. Otherwise these are logged and worked around.
    pub strict: bool,

    /// Maximum array/dictionary nesting depth
    pub max_nesting: u32,

    /// Maximum decoded stream size in bytes (0 disables the check)
    pub max_decompressed_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ReaderOptions {
    /// Fail on the first malformed construct.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Recover from common defects.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 100,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
        }
    }

    /// Set the nesting limit.
    pub fn with_max_nesting(mut self, depth: u32) -> Self {
        self.max_nesting = depth;
        self
    }

    /// Set the decoded stream size limit.
    pub fn with_max_decompressed_size(mut self, limit: usize) -> Self {
        self.max_decompressed_size = limit;
        self
    }

    /// Decoder registry honoring the size limit.
    pub fn decoders(&self) -> DecoderRegistry {
        DecoderRegistry::new().with_max_decompressed_size(self.max_decompressed_size)
    }
}
