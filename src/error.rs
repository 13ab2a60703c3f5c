//! Error types.
//!
//! Three kinds of failure reach callers: misuse of the editing API
//! (indices, ownership, duplicate field names), input the reader cannot make
//! sense of, and I/O. Malformed but recoverable structure inside a loaded
//! graph is not an error: it reads as Null or as a getter's default.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by reading, editing and saving.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File does not start with `%PDF-M.m`
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    /// Object record could not be parsed
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset of the record
        offset: usize,
        /// What went wrong
        reason: String,
    },

    /// `startxref` or the table it points to is unusable
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Input ended inside a token or object
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid input using a feature this crate does not handle
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Structurally invalid file
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// A filter stage rejected its input
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Compression or encryption failed while saving
    #[error("Stream encoding error: {0}")]
    Encode(String),

    /// Filter with no codec in the registry
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Collection index out of range
    #[error("Index {index} out of range for collection of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Collection length at the time of the call
        len: usize,
    },

    /// `attach` called on a wrapper that already belongs to a document
    #[error("Object is already owned by a document")]
    AlreadyOwned,

    /// A field with the same fully-qualified name is already registered
    #[error("Duplicate field name: {0}")]
    DuplicateFieldName(String),

    /// Arrays and dictionaries nested deeper than the reader allows
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_details() {
        let header = Error::InvalidHeader("GIF89a".to_string()).to_string();
        assert!(header.contains("GIF89a"));

        let parse = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        }
        .to_string();
        assert!(parse.contains("1234") && parse.contains("invalid token"));

        let range = Error::IndexOutOfRange { index: 7, len: 3 }.to_string();
        assert!(range.contains('7') && range.contains('3'));

        let duplicate = Error::DuplicateFieldName("form.name".to_string()).to_string();
        assert!(duplicate.contains("form.name"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
