//! Whole-file writer.
//!
//! One save pass collects everything reachable from the catalog (plus the
//! Info and Encrypt dictionaries), decides which nodes become indirect
//! objects, and writes header, objects, cross-reference table and trailer.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use md5::{Digest, Md5};
use uuid::Uuid;

use super::ObjectSerializer;
use crate::decoders::FlateCompressor;
use crate::encryption::EncryptionSettings;
use crate::error::{Error, Result};
use crate::object::{NodeKey, Object, ObjectRef, PdfArray, PdfDictionary, PdfString};
use crate::reference_table::{IdentityAllocator, ReferenceEntry, ReferenceTable};

/// Options for one save.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// PDF version written in the header (e.g. "1.7")
    pub version: String,
    /// Flate-compress streams that carry no filter
    pub compress: bool,
    /// Write every nested composite as an indirect object
    pub write_inheritable_objects: bool,
    /// First element of the trailer `ID` (generated when absent)
    pub file_id: Option<Vec<u8>>,
    /// Encrypt strings and streams
    pub encryption: Option<EncryptionSettings>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            version: "1.7".to_string(),
            compress: true,
            write_inheritable_objects: false,
            file_id: None,
            encryption: None,
        }
    }
}

impl SaveOptions {
    /// Set the header version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Write all nested composites as `N G R`.
    pub fn with_inheritable_objects(mut self, enabled: bool) -> Self {
        self.write_inheritable_objects = enabled;
        self
    }

    /// Use `id` as the permanent file identifier.
    pub fn with_file_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.file_id = Some(id.into());
        self
    }

    /// Encrypt the output.
    pub fn with_encryption(mut self, encryption: EncryptionSettings) -> Self {
        self.encryption = Some(encryption);
        self
    }
}

/// Writes a complete PDF file from a document's roots.
#[derive(Debug)]
pub struct PdfWriter<'a> {
    options: &'a SaveOptions,
}

impl<'a> PdfWriter<'a> {
    /// Writer for one save pass.
    pub fn new(options: &'a SaveOptions) -> Self {
        Self { options }
    }

    /// Serialize the graph reachable from `catalog` and `info` to bytes.
    ///
    /// Nodes without an identity get one from `allocator`, and keep it.
    pub fn to_bytes(
        &self,
        catalog: &PdfDictionary,
        info: Option<&PdfDictionary>,
        allocator: &mut IdentityAllocator,
    ) -> Result<Vec<u8>> {
        let mut roots = vec![Object::from(catalog.clone())];
        if let Some(info) = info {
            roots.push(info.clone().into());
        }
        let encryption = self.options.encryption.as_ref();
        if let Some(settings) = encryption {
            roots.push(settings.dictionary.clone().into());
        }
        let table = ReferenceTable::collect(&roots, allocator)?;

        let indirect: Vec<&ReferenceEntry> = table
            .entries()
            .iter()
            .filter(|entry| self.is_indirect(entry))
            .collect();
        let references: HashMap<NodeKey, ObjectRef> = indirect
            .iter()
            .filter_map(|entry| entry.object.node_key().map(|key| (key, entry.reference)))
            .collect();

        let compressor = FlateCompressor::default();
        let mut plain = ObjectSerializer::new().with_references(&references);
        if self.options.compress {
            plain = plain.with_compressor(&compressor);
        }
        let serializer = match encryption {
            Some(settings) => plain.with_encryptor(settings.encryptor.as_ref()),
            None => plain,
        };
        let encrypt_key = encryption.map(|settings| settings.dictionary.key());

        let mut output = Vec::new();
        writeln!(output, "%PDF-{}", self.options.version)?;
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut ordered = indirect;
        ordered.sort_by_key(|entry| entry.reference.id);
        let mut offsets: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
        for entry in ordered {
            offsets.insert(entry.reference.id, (output.len(), entry.reference.gen));
            let clear = encrypt_key.is_some() && entry.object.node_key() == encrypt_key;
            let body = if clear {
                plain.serialize_indirect(entry.reference, &entry.object)?
            } else {
                serializer.serialize_indirect(entry.reference, &entry.object)?
            };
            output.extend_from_slice(&body);
        }

        let size = table
            .max_number()
            .checked_add(1)
            .ok_or_else(|| Error::InvalidPdf("object numbers exhausted".to_string()))?;
        let xref_offset = output.len();
        write_xref(&mut output, size, &offsets)?;

        let trailer = PdfDictionary::new();
        trailer.insert("Size", size);
        if let Some(entry) = table.entry_for(&roots[0]) {
            trailer.insert("Root", entry.reference);
        }
        if let Some(info) = info {
            if let Some(entry) = table.entry_for(&Object::from(info.clone())) {
                trailer.insert("Info", entry.reference);
            }
        }
        if let Some(settings) = encryption {
            if let Some(entry) = table.entry_for(&Object::from(settings.dictionary.clone())) {
                trailer.insert("Encrypt", entry.reference);
            }
        }
        let permanent = self.options.file_id.clone().unwrap_or_else(fresh_file_id);
        let ids: PdfArray = [permanent, fresh_file_id()]
            .into_iter()
            .map(|id| Object::String(PdfString::hex(id)))
            .collect();
        trailer.insert("ID", ids);

        writeln!(output, "trailer")?;
        output.extend_from_slice(&ObjectSerializer::new().serialize(&trailer.into())?);
        write!(output, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!(
            "Wrote {} indirect objects ({} collected), {} bytes",
            offsets.len(),
            table.len(),
            output.len()
        );
        Ok(output)
    }

    /// Serialize and write to `out`.
    pub fn write<W: Write>(
        &self,
        out: &mut W,
        catalog: &PdfDictionary,
        info: Option<&PdfDictionary>,
        allocator: &mut IdentityAllocator,
    ) -> Result<()> {
        let bytes = self.to_bytes(catalog, info, allocator)?;
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }

    fn is_indirect(&self, entry: &ReferenceEntry) -> bool {
        self.options.write_inheritable_objects
            || entry.root
            || matches!(entry.object, Object::Stream(_))
            || entry.incoming > 1
    }
}

/// Classic table in one subsection. Numbers without an object form the
/// free list, linked from entry 0.
fn write_xref(
    output: &mut Vec<u8>,
    size: u32,
    offsets: &BTreeMap<u32, (usize, u16)>,
) -> Result<()> {
    let free: Vec<u32> = (1..size).filter(|n| !offsets.contains_key(n)).collect();
    let next_free = |after: u32| free.iter().copied().find(|&n| n > after).unwrap_or(0);

    writeln!(output, "xref")?;
    writeln!(output, "0 {}", size)?;
    writeln!(output, "{:010} 65535 f ", next_free(0))?;
    for number in 1..size {
        match offsets.get(&number) {
            Some((offset, gen)) => writeln!(output, "{:010} {:05} n ", offset, gen)?,
            None => writeln!(output, "{:010} 00000 f ", next_free(number))?,
        }
    }
    Ok(())
}

/// MD5 of a random UUID.
fn fresh_file_id() -> Vec<u8> {
    Md5::digest(Uuid::new_v4().as_bytes()).to_vec()
}
