//! PDF writing.
//!
//! [`PdfWriter`] produces a complete file from a document's catalog and
//! Info dictionary; [`ObjectSerializer`] writes single objects.

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub(crate) use object_serializer::needs_escape;
pub use pdf_writer::{PdfWriter, SaveOptions};
