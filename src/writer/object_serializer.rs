//! PDF object serialization.
//!
//! Turns in-memory objects into their on-disk syntax. Nested composites
//! are written either inline or as `N G R`, depending on the reference map
//! handed in by [`PdfWriter`](super::PdfWriter). Strings and stream data are
//! encrypted when an [`Encryptor`] is set and the object being written has
//! an identity.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::decoders::Compressor;
use crate::encryption::{DataKind, Encryptor};
use crate::error::Result;
use crate::object::{NodeKey, Object, ObjectRef, PdfArray, PdfDictionary, PdfStream, PdfString};

/// Serializer for PDF objects.
#[derive(Default, Clone, Copy)]
pub struct ObjectSerializer<'a> {
    /// Minimal whitespace
    compact: bool,
    /// Nodes written as indirect objects, with their identities
    references: Option<&'a HashMap<NodeKey, ObjectRef>>,
    encryptor: Option<&'a dyn Encryptor>,
    compressor: Option<&'a dyn Compressor>,
}

/// State of one top-level write.
struct Frame {
    /// Indirect object whose strings and streams are being written
    context: Option<ObjectRef>,
    /// Composites currently open on the inline path
    open: HashSet<NodeKey>,
}

impl<'a> ObjectSerializer<'a> {
    /// Serializer that writes every nested composite inline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with minimal whitespace.
    pub fn compact() -> Self {
        Self {
            compact: true,
            ..Self::default()
        }
    }

    /// Write the nodes in `references` as `N G R` wherever they are nested.
    pub fn with_references(mut self, references: &'a HashMap<NodeKey, ObjectRef>) -> Self {
        self.references = Some(references);
        self
    }

    /// Encrypt strings and stream data of indirect objects.
    pub fn with_encryptor(mut self, encryptor: &'a dyn Encryptor) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    /// Compress streams that carry no filter.
    pub fn with_compressor(mut self, compressor: &'a dyn Compressor) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut frame = Frame {
            context: None,
            open: HashSet::new(),
        };
        self.write_object(&mut buf, obj, &mut frame, true)?;
        Ok(buf)
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.serialize(obj)?).into_owned())
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, reference: ObjectRef, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", reference.id, reference.gen)?;
        let mut frame = Frame {
            context: Some(reference),
            open: HashSet::new(),
        };
        self.write_object(&mut buf, obj, &mut frame, true)?;
        write!(buf, "\nendobj\n")?;
        Ok(buf)
    }

    fn write_object<W: Write>(
        &self,
        w: &mut W,
        obj: &Object,
        frame: &mut Frame,
        top: bool,
    ) -> Result<()> {
        match obj {
            Object::Null => write!(w, "null")?,
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" })?,
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => write_real(w, *r)?,
            Object::String(s) => self.write_string(w, s, frame)?,
            Object::Name(n) => write_name(w, n)?,
            Object::Reference(r) => {
                if self.references.is_some() {
                    // Never resolved during collect, so the number means
                    // nothing in the output file.
                    log::debug!("Writing unresolved reference {} as null", r);
                    write!(w, "null")?;
                } else {
                    write!(w, "{} {} R", r.id, r.gen)?;
                }
            },
            Object::Array(_) | Object::Dictionary(_) | Object::Stream(_) => {
                self.write_composite(w, obj, frame, top)?;
            },
        }
        Ok(())
    }

    fn write_composite<W: Write>(
        &self,
        w: &mut W,
        obj: &Object,
        frame: &mut Frame,
        top: bool,
    ) -> Result<()> {
        let Some(key) = obj.node_key() else {
            return Ok(());
        };
        if !top {
            if let Some(reference) = self.references.and_then(|refs| refs.get(&key)) {
                write!(w, "{} {} R", reference.id, reference.gen)?;
                return Ok(());
            }
        }
        if !frame.open.insert(key) {
            log::warn!("Cycle through inline object; writing null");
            write!(w, "null")?;
            return Ok(());
        }
        match obj {
            Object::Array(arr) => self.write_array(w, arr, frame)?,
            Object::Dictionary(dict) => self.write_dictionary(w, dict, frame)?,
            Object::Stream(stream) => self.write_stream(w, stream, frame)?,
            _ => {},
        }
        frame.open.remove(&key);
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &PdfArray, frame: &mut Frame) -> Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.raw_values().iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj, frame, false)?;
        }
        write!(w, "]")?;
        Ok(())
    }

    fn write_dictionary<W: Write>(
        &self,
        w: &mut W,
        dict: &PdfDictionary,
        frame: &mut Frame,
    ) -> Result<()> {
        self.write_entries(w, dict.entries(), frame)
    }

    /// Entries in insertion order.
    fn write_entries<W: Write>(
        &self,
        w: &mut W,
        entries: Vec<(String, Object)>,
        frame: &mut Frame,
    ) -> Result<()> {
        write!(w, "<<")?;
        let empty = entries.is_empty();
        for (key, value) in entries {
            if self.compact {
                write!(w, " ")?;
            } else {
                write!(w, "\n  ")?;
            }
            write_name(w, &key)?;
            write!(w, " ")?;
            self.write_object(w, &value, frame, false)?;
        }
        if !empty {
            if self.compact {
                write!(w, " ")?;
            } else {
                writeln!(w)?;
            }
        }
        write!(w, ">>")?;
        Ok(())
    }

    /// Compression and encryption apply to a transient buffer; the stream
    /// node keeps its bytes and dictionary.
    fn write_stream<W: Write>(
        &self,
        w: &mut W,
        stream: &PdfStream,
        frame: &mut Frame,
    ) -> Result<()> {
        let mut data = stream.data();
        let mut filter = None;
        if let Some(compressor) = self.compressor {
            if stream.filters().is_empty() && !stream.is_dct_image() {
                data = compressor.compress(&data)?;
                filter = Some(compressor.filter_name().to_string());
            }
        }
        if let (Some(encryptor), Some(context)) = (self.encryptor, frame.context) {
            data = encryptor.encrypt(&data, context.id, context.gen, DataKind::Stream)?;
        }

        let mut entries = stream.dict().entries();
        set_entry(&mut entries, "Length", Object::from(data.len()));
        if let Some(name) = filter {
            // A `/Filter null` slot is replaced, never duplicated.
            set_entry(&mut entries, "Filter", Object::Name(name));
        }

        self.write_entries(w, entries, frame)?;
        write!(w, "\nstream\n")?;
        w.write_all(&data)?;
        write!(w, "\nendstream")?;
        Ok(())
    }

    fn write_string<W: Write>(&self, w: &mut W, s: &PdfString, frame: &Frame) -> Result<()> {
        if let (Some(encryptor), Some(context)) = (self.encryptor, frame.context) {
            let encrypted = encryptor.encrypt(&s.bytes, context.id, context.gen, DataKind::String)?;
            write_hex_string(w, &encrypted)?;
        } else if s.hex {
            write_hex_string(w, &s.bytes)?;
        } else {
            write_literal_string(w, &s.bytes)?;
        }
        Ok(())
    }
}

/// Replace `key`'s value in place, or append it.
fn set_entry(entries: &mut Vec<(String, Object)>, key: &str, value: Object) {
    match entries.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key.to_string(), value)),
    }
}

/// Write a real number with up to five decimals.
///
/// Integral values keep a trailing `.0` so they read back as reals.
fn write_real<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    if !value.is_finite() {
        return write!(w, "0");
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0');
    if trimmed.ends_with('.') {
        write!(w, "{}0", trimmed)
    } else {
        write!(w, "{}", trimmed)
    }
}

/// Literal `(...)` syntax. Control bytes other than CR/LF use octal escapes.
fn write_literal_string<W: Write>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    write!(w, "(")?;
    for &byte in data {
        match byte {
            b'(' => write!(w, "\\(")?,
            b')' => write!(w, "\\)")?,
            b'\\' => write!(w, "\\\\")?,
            b'\n' => write!(w, "\\n")?,
            b'\r' => write!(w, "\\r")?,
            0x00..=0x1F | 0x7F => write!(w, "\\{:03o}", byte)?,
            _ => w.write_all(&[byte])?,
        }
    }
    write!(w, ")")
}

fn write_hex_string<W: Write>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    write!(w, "<")?;
    for byte in data {
        write!(w, "{:02X}", byte)?;
    }
    write!(w, ">")
}

/// True for bytes that must be written as `#xx` inside a name.
pub(crate) fn needs_escape(byte: u8) -> bool {
    !(b'!'..=b'~').contains(&byte) || b"#()<>[]{}/%".contains(&byte)
}

/// Write a PDF name with `#xx` escapes.
fn write_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    write!(w, "/")?;
    for &byte in name.as_bytes() {
        if needs_escape(byte) {
            write!(w, "#{:02X}", byte)?;
        } else {
            w.write_all(&[byte])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::FlateCompressor;

    fn text(obj: &Object) -> String {
        ObjectSerializer::compact().serialize_to_string(obj).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(text(&Object::Null), "null");
        assert_eq!(text(&Object::Boolean(true)), "true");
        assert_eq!(text(&Object::Integer(-42)), "-42");
        assert_eq!(text(&Object::Real(0.5)), "0.5");
        assert_eq!(text(&Object::Real(3.0)), "3.0");
        assert_eq!(text(&Object::Real(f64::NAN)), "0");
        assert_eq!(text(&Object::Reference(ObjectRef::new(5, 0))), "5 0 R");
    }

    #[test]
    fn test_serialize_name_escapes() {
        assert_eq!(text(&Object::name("Type")), "/Type");
        assert_eq!(text(&Object::name("A B")), "/A#20B");
        assert_eq!(text(&Object::name("x#y")), "/x#23y");
        assert_eq!(text(&Object::name("a/b(c)")), "/a#2Fb#28c#29");
    }

    #[test]
    fn test_serialize_strings() {
        assert_eq!(text(&Object::string("a(b)c\\")), "(a\\(b\\)c\\\\)");
        assert_eq!(text(&Object::string("l1\nl2\r")), "(l1\\nl2\\r)");
        assert_eq!(text(&Object::string(vec![0x01])), "(\\001)");
        assert_eq!(text(&Object::hex_string(vec![0xAB, 0x01])), "<AB01>");
    }

    #[test]
    fn test_dictionary_keeps_insertion_order() {
        let dict = PdfDictionary::new();
        dict.insert("Zeta", 1);
        dict.insert("Alpha", 2);
        assert_eq!(text(&dict.into()), "<< /Zeta 1 /Alpha 2 >>");
    }

    #[test]
    fn test_inline_cycle_writes_null() {
        let a = PdfDictionary::new();
        let b = PdfDictionary::new();
        a.insert("B", b.clone());
        b.insert("A", a.clone());
        assert_eq!(text(&a.into()), "<< /B << /A null >> >>");
    }

    #[test]
    fn test_referenced_nodes_written_as_refs() {
        let inner = PdfArray::new();
        inner.push(1);
        let outer = PdfDictionary::new();
        outer.insert("Inner", inner.clone());
        let mut refs = HashMap::new();
        refs.insert(inner.key(), ObjectRef::new(7, 0));
        let s = ObjectSerializer::compact().with_references(&refs);
        assert_eq!(s.serialize_to_string(&outer.into()).unwrap(), "<< /Inner 7 0 R >>");
        // At the top level the node itself is written.
        assert_eq!(s.serialize_to_string(&inner.into()).unwrap(), "[1]");
    }

    #[test]
    fn test_stream_compression_is_transient() {
        let stream = PdfStream::from_bytes(b"BT /F1 12 Tf ET".repeat(20));
        let compressor = FlateCompressor::default();
        let s = ObjectSerializer::compact().with_compressor(&compressor);
        let out = s.serialize_to_string(&stream.clone().into()).unwrap();
        assert!(out.contains("/Filter /FlateDecode"));
        assert!(stream.filters().is_empty());
        assert_eq!(stream.data(), b"BT /F1 12 Tf ET".repeat(20));
    }

    #[test]
    fn test_null_filter_slot_is_replaced() {
        let stream = PdfStream::from_bytes(b"q 1 0 0 1 0 0 cm Q".repeat(10));
        stream.dict().insert("Filter", Object::Null);
        let compressor = FlateCompressor::default();
        let s = ObjectSerializer::compact().with_compressor(&compressor);
        let out = s.serialize_to_string(&stream.into()).unwrap();
        assert_eq!(out.matches("/Filter").count(), 1);
        assert_eq!(out.matches("/Length").count(), 1);
        assert!(out.contains("/Filter /FlateDecode"));
    }

    #[test]
    fn test_stream_length_from_final_bytes() {
        struct Doubler;
        impl Encryptor for Doubler {
            fn encrypt(&self, data: &[u8], _: u32, _: u16, _: DataKind) -> Result<Vec<u8>> {
                Ok(data.iter().flat_map(|b| [*b, *b]).collect())
            }
        }
        let stream = PdfStream::from_bytes(b"abc".to_vec());
        stream.dict().insert("Length", 3);
        let s = ObjectSerializer::compact().with_encryptor(&Doubler);
        let out = s.serialize_indirect(ObjectRef::new(4, 0), &stream.into()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("/Length 6"));
        assert!(out.contains("aabbcc"));
    }
}
