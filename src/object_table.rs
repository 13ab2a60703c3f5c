//! Lazy object loading for a parsed file.
//!
//! [`ObjectTable`] owns the file bytes and the merged cross-reference
//! table. Objects are parsed the first time a reference to them is resolved
//! and cached by number, so every resolution of a number yields the same
//! node. Parsed composites remember the table as their source, which is how
//! reference slots deep inside the graph resolve on first access.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use bytes::Bytes;

use crate::object::{Object, ObjectRef, PdfDictionary, Resolve, attach_source};
use crate::parser::{Parser, parse_indirect_at};
use crate::parser_config::ReaderOptions;
use crate::xref::{CrossRefTable, XRefEntry};

/// Objects of one loaded file, parsed on demand.
pub struct ObjectTable {
    data: Bytes,
    xref: CrossRefTable,
    options: ReaderOptions,
    cache: RefCell<HashMap<u32, Object>>,
    loading: RefCell<HashSet<u32>>,
    this: Weak<ObjectTable>,
}

impl ObjectTable {
    /// Table over `data`, whose objects are located by `xref`.
    ///
    /// The trailer (if any) is attached to the table so its references
    /// resolve.
    pub fn new(data: Bytes, xref: CrossRefTable, options: ReaderOptions) -> Rc<Self> {
        let table = Rc::new_cyclic(|this| Self {
            data,
            xref,
            options,
            cache: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            this: this.clone(),
        });
        if let Some(trailer) = table.xref.trailer() {
            table.attach(&Object::from(trailer.clone()));
        }
        table
    }

    /// Trailer of the newest cross-reference section.
    pub fn trailer(&self) -> Option<&PdfDictionary> {
        self.xref.trailer()
    }

    /// Highest object number known to the cross-reference table.
    pub fn max_number(&self) -> u32 {
        self.xref.object_numbers().max().unwrap_or(0)
    }

    /// Number of objects parsed so far.
    pub fn loaded_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Options the table parses with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Make composites reachable from `root` resolve through this table.
    pub fn attach(&self, root: &Object) {
        let source: Weak<dyn Resolve> = self.this.clone();
        attach_source(root, &source);
    }

    /// Load (or fetch from cache) the object with `reference`'s number.
    ///
    /// Unknown numbers, free entries, generation mismatches and parse
    /// failures yield Null.
    pub fn load(&self, reference: ObjectRef) -> Object {
        // The cache is keyed by number, so the generation is checked first.
        let offset = match self.xref.get(reference.id) {
            Some(XRefEntry::InUse { offset, generation }) if generation == reference.gen => offset,
            Some(XRefEntry::InUse { generation, .. }) => {
                log::debug!("Reference {} does not match generation {}", reference, generation);
                return Object::Null;
            },
            _ => return Object::Null,
        };

        if let Some(cached) = self.cache.borrow().get(&reference.id) {
            return cached.clone();
        }

        if !self.loading.borrow_mut().insert(reference.id) {
            log::warn!("Object {} refers to itself while loading", reference);
            return Object::Null;
        }
        let parsed = self.parse_at(reference, offset);
        self.loading.borrow_mut().remove(&reference.id);

        if parsed.is_composite() {
            if let Some(header) = parsed.header() {
                header.assign_identity(reference);
            }
            self.attach(&parsed);
        }
        self.cache.borrow_mut().insert(reference.id, parsed.clone());
        parsed
    }

    fn parse_at(&self, reference: ObjectRef, offset: usize) -> Object {
        let parser = Parser::new(&self.options).with_lengths(self);
        match parse_indirect_at(&self.data, offset, &parser) {
            Ok((found, object)) if found == reference => object,
            Ok((found, object)) => {
                if self.options.strict {
                    log::warn!("Expected object {} at {}, found {}", reference, offset, found);
                    return Object::Null;
                }
                log::warn!("Object {} stored under header {}", reference, found);
                object
            },
            Err(e) => {
                log::warn!("Failed to parse object {} at offset {}: {}", reference, offset, e);
                Object::Null
            },
        }
    }
}

impl Resolve for ObjectTable {
    /// Follows chains (`1 0 obj 2 0 R endobj`) until a non-reference value
    /// is reached; a loop yields Null.
    fn resolve(&self, reference: ObjectRef) -> Object {
        let mut visited = HashSet::from([reference]);
        let mut current = self.load(reference);
        while let Object::Reference(next) = current {
            if !visited.insert(next) {
                log::warn!("Reference chain through {} loops", next);
                return Object::Null;
            }
            current = self.load(next);
        }
        current
    }
}

impl std::fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTable")
            .field("bytes", &self.data.len())
            .field("entries", &self.xref.len())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// File body with objects at known offsets; returns data and table.
    fn table(objects: &[(u32, &str)]) -> Rc<ObjectTable> {
        let mut data = b"%PDF-1.7\n".to_vec();
        let mut xref = CrossRefTable::new();
        for (number, body) in objects {
            xref.add_entry(
                *number,
                XRefEntry::InUse {
                    offset: data.len(),
                    generation: 0,
                },
            );
            data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
        }
        let trailer = PdfDictionary::new();
        trailer.insert("Root", ObjectRef::new(1, 0));
        xref.set_trailer(trailer);
        ObjectTable::new(Bytes::from(data), xref, ReaderOptions::default())
    }

    #[test]
    fn test_same_node_for_every_resolution() {
        let t = table(&[(1, "<< /Kid 2 0 R >>"), (2, "[1 2 3]")]);
        let a = t.resolve(ObjectRef::new(2, 0));
        let b = t.resolve(ObjectRef::new(2, 0));
        assert_eq!(a, b);
        assert_eq!(a.identity(), Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn test_nested_slots_resolve_through_source() {
        let t = table(&[(1, "<< /Kid 2 0 R >>"), (2, "<< /Back 1 0 R >>")]);
        let root = t.resolve(ObjectRef::new(1, 0));
        let kid = root.as_dict().unwrap().get_dict("Kid").unwrap();
        let back = kid.get_dict("Back").unwrap();
        assert!(back.ptr_eq(root.as_dict().unwrap()));
    }

    #[test]
    fn test_trailer_resolves() {
        let t = table(&[(1, "<< /Type /Catalog >>")]);
        let catalog = t.trailer().unwrap().get_dict("Root").unwrap();
        assert!(catalog.has_name("Type", "Catalog"));
    }

    #[test]
    fn test_unknown_and_dangling_are_null() {
        let t = table(&[(1, "<< /Missing 9 0 R >>")]);
        assert_eq!(t.resolve(ObjectRef::new(7, 0)), Object::Null);
        assert_eq!(t.resolve(ObjectRef::new(1, 3)), Object::Null);
        let root = t.resolve(ObjectRef::new(1, 0));
        assert_eq!(root.as_dict().unwrap().get("Missing"), Some(Object::Null));
    }

    #[test]
    fn test_wrong_generation_is_null_after_load() {
        let t = table(&[(1, "<< /A 2 5 R /B 2 0 R >>"), (2, "<< /Type /Thing >>")]);
        assert!(t.resolve(ObjectRef::new(2, 0)).as_dict().is_some());
        assert_eq!(t.resolve(ObjectRef::new(2, 5)), Object::Null);

        let root = t.resolve(ObjectRef::new(1, 0));
        let root = root.as_dict().unwrap();
        assert!(root.get_dict("B").is_some());
        assert_eq!(root.get("A"), Some(Object::Null));
    }

    #[test]
    fn test_reference_chains() {
        let t = table(&[(1, "2 0 R"), (2, "42"), (3, "4 0 R"), (4, "3 0 R")]);
        assert_eq!(t.resolve(ObjectRef::new(1, 0)), Object::Integer(42));
        assert_eq!(t.resolve(ObjectRef::new(3, 0)), Object::Null);
    }

    #[test]
    fn test_parse_error_yields_null() {
        let t = table(&[(1, "<< 1 2 >>")]);
        assert_eq!(t.resolve(ObjectRef::new(1, 0)), Object::Null);
    }

    #[test]
    fn test_indirect_stream_length() {
        let t = table(&[(1, "<< /Length 2 0 R >>\nstream\nabcd\nendstream"), (2, "4")]);
        let stream = t.resolve(ObjectRef::new(1, 0));
        assert_eq!(stream.as_stream().unwrap().data(), b"abcd");
    }
}
