//! Cross-reference table parser.
//!
//! Maps object numbers to byte offsets. Classic `xref` sections are parsed
//! and `Prev` chains followed, with entries from newer sections taking
//! precedence. Cross-reference streams are not supported.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Object, PdfDictionary};
use crate::parser::Parser;
use crate::parser_config::ReaderOptions;

/// Longest `Prev` chain followed before giving up.
const MAX_PREV_CHAIN: usize = 100;

/// Largest subsection accepted.
const MAX_SUBSECTION_COUNT: i64 = 1_000_000;

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object stored at a byte offset
    InUse {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        generation: u16,
    },
    /// Free slot
    Free {
        /// Generation for the next use
        generation: u16,
    },
}

impl XRefEntry {
    /// True for entries that point at an object.
    pub fn is_in_use(&self) -> bool {
        matches!(self, XRefEntry::InUse { .. })
    }
}

/// Merged cross-reference data for a file.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Option<PdfDictionary>,
}

impl CrossRefTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: PdfDictionary) {
        self.trailer = Some(trailer);
    }

    /// Trailer dictionary of the newest section.
    pub fn trailer(&self) -> Option<&PdfDictionary> {
        self.trailer.as_ref()
    }

    /// Add or replace the entry for `number`.
    pub fn add_entry(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    /// Entry for `number`.
    pub fn get(&self, number: u32) -> Option<XRefEntry> {
        self.entries.get(&number).copied()
    }

    /// Byte offset of an in-use object.
    pub fn offset_of(&self, number: u32) -> Option<usize> {
        match self.get(number)? {
            XRefEntry::InUse { offset, .. } => Some(offset),
            XRefEntry::Free { .. } => None,
        }
    }

    /// Object numbers in ascending order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Add entries of an older section that this table does not have yet.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Offset named by the last `startxref` in the file.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let window = &data[data.len().saturating_sub(2048)..];
    let keyword = b"startxref";
    let pos = window
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;
    match token(&window[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => Ok(offset as usize),
        _ => Err(Error::InvalidXref),
    }
}

/// Parse the section at `offset` and every older section reachable through
/// `Prev`.
pub fn parse_xref(data: &[u8], offset: usize, options: &ReaderOptions) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut next = Some(offset);
    let mut merged: Option<CrossRefTable> = None;

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            log::warn!("Cross-reference Prev chain loops back to offset {}", offset);
            break;
        }
        if visited.len() > MAX_PREV_CHAIN {
            return Err(Error::InvalidPdf(format!(
                "xref Prev chain longer than {}",
                MAX_PREV_CHAIN
            )));
        }
        let section = parse_section(data, offset, options)?;
        next = section
            .trailer()
            .and_then(|t| t.get_integer("Prev"))
            .and_then(|prev| usize::try_from(prev).ok());
        log::debug!("Parsed xref section at {} ({} entries)", offset, section.len());
        match merged.as_mut() {
            Some(newer) => newer.merge_older(section),
            None => merged = Some(section),
        }
    }

    merged.ok_or(Error::InvalidXref)
}

/// One classic section: `xref`, subsections, `trailer << ... >>`.
fn parse_section(data: &[u8], offset: usize, options: &ReaderOptions) -> Result<CrossRefTable> {
    let input = data.get(offset..).ok_or(Error::InvalidXref)?;
    let mut rest = match token(input) {
        Ok((rest, Token::Keyword(b"xref"))) => rest,
        Ok((_, Token::Integer(_))) => {
            return Err(Error::Unsupported("cross-reference streams".to_string()));
        },
        _ => return Err(Error::InvalidXref),
    };

    let mut table = CrossRefTable::new();
    loop {
        match token(rest) {
            Ok((after, Token::Keyword(b"trailer"))) => {
                let parser = Parser::new(options);
                let (_, trailer) = parser.object(after).map_err(|_| Error::InvalidXref)?;
                let Object::Dictionary(trailer) = trailer else {
                    return Err(Error::InvalidXref);
                };
                if trailer.contains_key("XRefStm") {
                    log::warn!("Ignoring XRefStm in hybrid-reference file");
                }
                table.set_trailer(trailer);
                return Ok(table);
            },
            Ok((after, Token::Integer(start))) => {
                let (after, count) = match token(after) {
                    Ok((after, Token::Integer(count))) => (after, count),
                    _ => return Err(Error::InvalidXref),
                };
                if !(0..=MAX_SUBSECTION_COUNT).contains(&count) || start < 0 {
                    return Err(Error::InvalidPdf("xref subsection count exceeds limit".into()));
                }
                rest = parse_subsection(after, start as u32, count as u32, &mut table)?;
            },
            _ => return Err(Error::InvalidXref),
        }
    }
}

fn parse_subsection<'a>(
    mut input: &'a [u8],
    start: u32,
    count: u32,
    table: &mut CrossRefTable,
) -> Result<&'a [u8]> {
    for index in 0..count {
        let (rest, offset) = token(input).map_err(|_| Error::InvalidXref)?;
        let (rest, generation) = token(rest).map_err(|_| Error::InvalidXref)?;
        let (rest, kind) = token(rest).map_err(|_| Error::InvalidXref)?;
        let (Token::Integer(offset), Token::Integer(generation)) = (offset, generation) else {
            return Err(Error::InvalidXref);
        };
        let generation = u16::try_from(generation).unwrap_or(u16::MAX);
        let entry = match kind {
            Token::Keyword(b"n") if offset >= 0 => XRefEntry::InUse {
                offset: offset as usize,
                generation,
            },
            Token::Keyword(b"f") => XRefEntry::Free { generation },
            _ => {
                log::warn!("Invalid xref entry for object {}, treating as free", start + index);
                XRefEntry::Free { generation }
            },
        };
        table.add_entry(start + index, entry);
        input = rest;
    }
    Ok(input)
}
