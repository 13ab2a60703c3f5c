//! Cross-reference reconstruction for damaged files.
//!
//! When `startxref` or the table it points to is unusable, lenient reading
//! scans the whole file for `N G obj` headers. Later headers for the same
//! number win, as they would in an incremental update.

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef, PdfDictionary};
use crate::parser::{Parser, parse_indirect_at};
use crate::parser_config::ReaderOptions;
use crate::xref::{CrossRefTable, XRefEntry};

lazy_static! {
    /// "N G obj" headers
    static ref RE_OBJ_HEADER: Regex = Regex::new(r"(\d+)\s+(\d+)\s+obj\b").unwrap();

    /// "trailer <<"
    static ref RE_TRAILER: Regex = Regex::new(r"trailer\s*<<").unwrap();
}

/// Rebuild a table (with trailer) by scanning `data`.
pub fn reconstruct_xref(data: &[u8], options: &ReaderOptions) -> Result<CrossRefTable> {
    log::info!("Reconstructing cross-reference table by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    for capture in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(number), Some(generation)) =
            (capture.get(0), capture.get(1), capture.get(2))
        else {
            continue;
        };
        let parsed = (parse_u32(number.as_bytes()), parse_u32(generation.as_bytes()));
        let (Some(number), Some(generation)) = parsed else {
            continue;
        };
        // A header must start a line (or the file) to count.
        if whole.start() > 0 && !matches!(data[whole.start() - 1], b'\n' | b'\r' | b' ') {
            continue;
        }
        table.add_entry(
            number,
            XRefEntry::InUse {
                offset: whole.start(),
                generation: u16::try_from(generation).unwrap_or(u16::MAX),
            },
        );
    }

    if table.is_empty() {
        return Err(Error::InvalidPdf("no objects found while reconstructing xref".to_string()));
    }
    log::info!("Reconstructed {} objects", table.len());

    let trailer = match find_trailer(data, options) {
        Some(trailer) if trailer.contains_key("Root") => trailer,
        _ => minimal_trailer(data, &table, options)?,
    };
    table.set_trailer(trailer);
    Ok(table)
}

fn parse_u32(digits: &[u8]) -> Option<u32> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Last `trailer << ... >>` in the file.
fn find_trailer(data: &[u8], options: &ReaderOptions) -> Option<PdfDictionary> {
    let found = RE_TRAILER.find_iter(data).last()?;
    let start = found.start() + "trailer".len();
    let parser = Parser::new(options);
    match parser.object(&data[start..]) {
        Ok((_, Object::Dictionary(trailer))) => Some(trailer),
        _ => {
            log::warn!("Unreadable trailer dictionary at offset {}", found.start());
            None
        },
    }
}

/// Trailer naming the first object typed `Catalog`.
fn minimal_trailer(
    data: &[u8],
    table: &CrossRefTable,
    options: &ReaderOptions,
) -> Result<PdfDictionary> {
    let parser = Parser::new(options);
    let catalog = table.object_numbers().find_map(|number| {
        let offset = table.offset_of(number)?;
        let (reference, object) = parse_indirect_at(data, offset, &parser).ok()?;
        object
            .as_dict()
            .filter(|dict| dict.has_name("Type", "Catalog"))
            .map(|_| reference)
    });
    let root: ObjectRef =
        catalog.ok_or_else(|| Error::InvalidPdf("no catalog found in damaged file".to_string()))?;

    let trailer = PdfDictionary::new();
    trailer.insert("Root", root);
    trailer.insert("Size", table.object_numbers().max().unwrap_or(0) + 1);
    Ok(trailer)
}
