//! Document session.
//!
//! A [`Document`] ties one object graph to its session: the owner handed to
//! every wrapper, the lazy object table of the file it was read from, the
//! identity allocator used by saves, and the collections hosted on the
//! catalog.
//!
//! # Example
//!
//! ```
//! use pdf_graft::document::Document;
//! use pdf_graft::pages::Page;
//! use pdf_graft::writer::SaveOptions;
//!
//! let doc = Document::new();
//! doc.pages().push(&Page::new([0.0, 0.0, 612.0, 792.0]))?;
//! let bytes = doc.to_bytes(&SaveOptions::default())?;
//!
//! let reread = Document::load(bytes)?;
//! assert_eq!(reread.pages().len(), 1);
//! # Ok::<(), pdf_graft::error::Error>(())
//! ```

use std::cell::{OnceCell, RefCell};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use bytes::Bytes;

use crate::decoders::DecoderRegistry;
use crate::error::{Error, Result};
use crate::fields::{Field, FieldCollection, FieldHost};
use crate::object::{Object, ObjectRef, PdfArray, PdfDictionary, Resolve, sever_graph};
use crate::object_table::ObjectTable;
use crate::outline::OutlineCollection;
use crate::ownership::WrapperCore;
use crate::page_labels::PageLabelCollection;
use crate::pages::PageCollection;
use crate::parser_config::ReaderOptions;
use crate::reference_table::IdentityAllocator;
use crate::session::{Owner, Session};
use crate::writer::{PdfWriter, SaveOptions};
use crate::xref::{CrossRefTable, find_xref_offset, parse_xref};
use crate::xref_reconstruction::reconstruct_xref;

/// How far into the file a lenient reader looks for `%PDF-`.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// An editable PDF document.
///
/// Dropping the document breaks the reference cycles of its graph: nodes
/// still held elsewhere are left empty. Use `clone_to` to keep a wrapper
/// alive in another document.
pub struct Document {
    session: Rc<Session>,
    owner: Owner,
    objects: Option<Rc<ObjectTable>>,
    trailer: PdfDictionary,
    catalog: PdfDictionary,
    info: RefCell<Option<PdfDictionary>>,
    version: String,
    options: ReaderOptions,
    allocator: RefCell<IdentityAllocator>,
    pages: OnceCell<PageCollection>,
    outlines: OnceCell<OutlineCollection>,
    fields: OnceCell<FieldCollection>,
    page_labels: OnceCell<PageLabelCollection>,
}

impl Document {
    /// Empty document: a catalog with an empty page tree.
    pub fn new() -> Self {
        let pages = PdfDictionary::with_type("Pages")
            .with("Kids", PdfArray::new())
            .with("Count", 0);
        let catalog = PdfDictionary::with_type("Catalog").with("Pages", pages);
        Self::assemble(
            None,
            PdfDictionary::new(),
            catalog,
            None,
            "1.7".to_string(),
            ReaderOptions::default(),
            IdentityAllocator::starting_at(1),
        )
    }

    /// Read a document from memory with lenient options.
    pub fn load(data: impl Into<Bytes>) -> Result<Self> {
        Self::load_with_options(data, ReaderOptions::default())
    }

    /// Read a document from a file with lenient options.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pdf_graft::document::Document;
    ///
    /// let doc = Document::open("sample.pdf")?;
    /// println!("{} pages", doc.pages().len());
    /// # Ok::<(), pdf_graft::error::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        log::debug!("Read {} bytes from {}", data.len(), path.as_ref().display());
        Self::load(data)
    }

    /// Read a document from memory.
    ///
    /// Objects are parsed lazily, the first time something reaches them.
    /// A lenient reader rebuilds a broken cross-reference table by scanning
    /// the file; a strict one reports the original error.
    pub fn load_with_options(data: impl Into<Bytes>, options: ReaderOptions) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data, &options)?;

        let xref = match read_xref(&data, &options) {
            Ok(xref) => xref,
            Err(e @ Error::Unsupported(_)) => return Err(e),
            Err(e) if options.strict => return Err(e),
            Err(e) => {
                log::warn!("Regular xref parsing failed: {}, attempting reconstruction", e);
                match reconstruct_xref(&data, &options) {
                    Ok(xref) => xref,
                    Err(recon_err) => {
                        log::error!("XRef reconstruction also failed: {}", recon_err);
                        return Err(e);
                    },
                }
            },
        };

        let trailer = xref.trailer().cloned().ok_or(Error::InvalidXref)?;
        if trailer.contains_key("Encrypt") {
            return Err(Error::Unsupported("encrypted documents".to_string()));
        }

        let objects = ObjectTable::new(data, xref, options);
        let catalog = trailer
            .get_dict("Root")
            .ok_or_else(|| Error::InvalidPdf("trailer has no catalog".to_string()))?;
        let info = trailer.get_dict("Info");

        // New numbers follow the highest one the xref actually lists; a
        // damaged Size must not push them to the end of the number space.
        let first = objects.max_number().saturating_add(1);
        if let Some(size) = trailer.get_integer("Size").filter(|&s| s != i64::from(first)) {
            log::warn!("Trailer Size {} disagrees with cross-reference table ({})", size, first);
        }
        log::info!("Loaded PDF {} (next object number {})", version, first);

        Ok(Self::assemble(
            Some(objects),
            trailer,
            catalog,
            info,
            version,
            options,
            IdentityAllocator::starting_at(first),
        ))
    }

    fn assemble(
        objects: Option<Rc<ObjectTable>>,
        trailer: PdfDictionary,
        catalog: PdfDictionary,
        info: Option<PdfDictionary>,
        version: String,
        options: ReaderOptions,
        allocator: IdentityAllocator,
    ) -> Self {
        let session = Session::new();
        let owner = Owner::for_session(&session);
        Self {
            session,
            owner,
            objects,
            trailer,
            catalog,
            info: RefCell::new(info),
            version,
            options,
            allocator: RefCell::new(allocator),
            pages: OnceCell::new(),
            outlines: OnceCell::new(),
            fields: OnceCell::new(),
            page_labels: OnceCell::new(),
        }
    }

    /// Owner of every wrapper that belongs to this document.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Document catalog.
    pub fn catalog(&self) -> &PdfDictionary {
        &self.catalog
    }

    /// Trailer of the file the document was read from (empty for new
    /// documents).
    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    /// Document information dictionary, if any.
    pub fn info(&self) -> Option<PdfDictionary> {
        self.info.borrow().clone()
    }

    /// Information dictionary, created on first use.
    pub fn info_or_insert(&self) -> PdfDictionary {
        self.info
            .borrow_mut()
            .get_or_insert_with(PdfDictionary::new)
            .clone()
    }

    /// Version from the file header, e.g. "1.7".
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Options the document was read with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Decoders honoring the document's size limit.
    pub fn decoders(&self) -> DecoderRegistry {
        self.options.decoders()
    }

    /// Object with number `reference` in the source file.
    ///
    /// Null for new documents, unknown numbers and unreadable objects.
    pub fn resolve(&self, reference: ObjectRef) -> Object {
        match &self.objects {
            Some(objects) => objects.resolve(reference),
            None => Object::Null,
        }
    }

    /// Pages in document order.
    pub fn pages(&self) -> PageCollection {
        self.pages
            .get_or_init(|| {
                let root = self.catalog.get_or_insert_dict("Pages");
                if !root.contains_key("Type") {
                    root.insert("Type", Object::name("Pages"));
                }
                PageCollection::load(self.host(root))
            })
            .clone()
    }

    /// Top-level outline items.
    pub fn outlines(&self) -> OutlineCollection {
        self.outlines
            .get_or_init(|| {
                let root = self.catalog.get_or_insert_dict("Outlines");
                OutlineCollection::root(self.host(root))
            })
            .clone()
    }

    /// Top-level form fields.
    ///
    /// Fields read from the file are registered under their fully-qualified
    /// names the first time this is called.
    pub fn fields(&self) -> FieldCollection {
        self.fields
            .get_or_init(|| {
                let form = self.catalog.get_or_insert_dict("AcroForm");
                if !form.contains_key("Fields") {
                    form.insert("Fields", PdfArray::new());
                }
                let fields = FieldCollection::load(self.host(form), FieldHost::Form);
                fields.register_loaded();
                fields
            })
            .clone()
    }

    /// Field registered under the fully-qualified `name`.
    pub fn field(&self, name: &str) -> Option<Field> {
        self.fields();
        self.session.field(name)
    }

    /// Fully-qualified names of every registered field.
    pub fn field_names(&self) -> Vec<String> {
        self.fields();
        self.session.field_names()
    }

    /// Page label ranges.
    pub fn page_labels(&self) -> PageLabelCollection {
        self.page_labels
            .get_or_init(|| {
                let tree = self.catalog.get_or_insert_dict("PageLabels");
                PageLabelCollection::load(self.host(tree))
            })
            .clone()
    }

    fn host(&self, dict: PdfDictionary) -> Rc<WrapperCore> {
        WrapperCore::new(dict, Some(self.owner.clone()))
    }

    /// Serialize the whole document.
    ///
    /// Objects read from the file keep their numbers; new objects get the
    /// next free ones and keep them for later saves.
    pub fn to_bytes(&self, options: &SaveOptions) -> Result<Vec<u8>> {
        let info = self.info();
        let inherited = self.inherited_file_id(options);
        let options = inherited.as_ref().unwrap_or(options);
        let mut allocator = self.allocator.borrow_mut();
        PdfWriter::new(options).to_bytes(&self.catalog, info.as_ref(), &mut allocator)
    }

    /// Serialize the document into `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, options: &SaveOptions) -> Result<()> {
        let bytes = self.to_bytes(options)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Save the document to `path`.
    pub fn save(&self, path: impl AsRef<Path>, options: &SaveOptions) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer, options)?;
        log::info!("Saved document to {}", path.as_ref().display());
        Ok(())
    }

    /// Options carrying the source file's permanent ID when none was given.
    fn inherited_file_id(&self, options: &SaveOptions) -> Option<SaveOptions> {
        if options.file_id.is_some() {
            return None;
        }
        let id = self.trailer.get_array("ID")?.get(0)?;
        let id = id.as_string()?.bytes.clone();
        Some(options.clone().with_file_id(id))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        let mut roots = vec![Object::from(self.catalog.clone()), self.trailer.clone().into()];
        if let Some(info) = self.info.borrow_mut().take() {
            roots.push(info.into());
        }
        sever_graph(&roots);
        self.session.clear();
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("owner", &self.owner)
            .field("objects", &self.objects)
            .finish()
    }
}

/// Newest cross-reference data reachable from `startxref`.
fn read_xref(data: &[u8], options: &ReaderOptions) -> Result<CrossRefTable> {
    let offset = find_xref_offset(data)?;
    let xref = parse_xref(data, offset, options)?;
    if xref.is_empty() {
        return Err(Error::InvalidXref);
    }
    Ok(xref)
}

/// Parse the `%PDF-M.m` header and return the version.
///
/// A strict reader wants the header at the very start of the file; a
/// lenient one accepts leading junk within the first kilobyte.
///
/// ```rust
/// use pdf_graft::document::parse_header;
/// use pdf_graft::parser_config::ReaderOptions;
///
/// let version = parse_header(b"%PDF-1.7\n", &ReaderOptions::default()).unwrap();
/// assert_eq!(version, "1.7");
/// ```
pub fn parse_header(data: &[u8], options: &ReaderOptions) -> Result<String> {
    let magic = b"%PDF-";
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let start = if options.strict {
        data.starts_with(magic).then_some(0)
    } else {
        window.windows(magic.len()).position(|w| w == magic)
    };
    let Some(start) = start else {
        let found = String::from_utf8_lossy(&data[..data.len().min(magic.len())]).into_owned();
        return Err(Error::InvalidHeader(found));
    };
    if start > 0 {
        log::warn!("Found PDF header at offset {} instead of 0", start);
    }

    let version = data.get(start + magic.len()..start + magic.len() + 3).ok_or_else(|| {
        Error::InvalidHeader("File too short to contain PDF header".to_string())
    })?;
    let (major, dot, minor) = (version[0], version[1], version[2]);
    if dot != b'.' || !major.is_ascii_digit() || !minor.is_ascii_digit() {
        return Err(Error::InvalidHeader(format!(
            "Invalid version: {}",
            String::from_utf8_lossy(version)
        )));
    }
    if major > b'2' || (major == b'0' && minor == b'0') {
        return Err(Error::InvalidHeader(format!(
            "Unsupported version {}.{}",
            major as char, minor as char
        )));
    }
    Ok(format!("{}.{}", major as char, minor as char))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::Outline;
    use crate::ownership::Owned;
    use crate::pages::Page;

    const LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

    /// Two pages, one outline item and one named field, saved to bytes.
    fn sample() -> Vec<u8> {
        let doc = Document::new();
        doc.pages().push(&Page::new(LETTER)).unwrap();
        doc.pages().push(&Page::new([0.0, 0.0, 100.0, 100.0])).unwrap();
        doc.outlines().push(&Outline::new("Intro")).unwrap();
        doc.fields().push(&Field::text("name")).unwrap();
        doc.info_or_insert().insert("Title", Object::text("Sample"));
        doc.to_bytes(&SaveOptions::default().with_compress(false)).unwrap()
    }

    #[test]
    fn test_parse_header() {
        let strict = ReaderOptions::strict();
        assert_eq!(parse_header(b"%PDF-1.4\n", &strict).unwrap(), "1.4");
        assert_eq!(parse_header(b"%PDF-2.0\n", &strict).unwrap(), "2.0");
        assert!(matches!(parse_header(b"GIF89a", &strict), Err(Error::InvalidHeader(_))));
        assert!(parse_header(b"%PDF-", &strict).is_err());
        assert!(parse_header(b"%PDF-x.y", &strict).is_err());
        assert!(parse_header(b"%PDF-3.0", &strict).is_err());
    }

    #[test]
    fn test_header_after_junk() {
        let data = b"junk\n%PDF-1.5\n";
        assert_eq!(parse_header(data, &ReaderOptions::lenient()).unwrap(), "1.5");
        assert!(parse_header(data, &ReaderOptions::strict()).is_err());
    }

    #[test]
    fn test_new_document() {
        let doc = Document::new();
        assert!(doc.catalog().has_name("Type", "Catalog"));
        assert!(doc.pages().is_empty());
        assert!(doc.info().is_none());
        assert_eq!(doc.version(), "1.7");
        assert_eq!(doc.resolve(ObjectRef::new(1, 0)), Object::Null);
    }

    #[test]
    fn test_save_and_reload() {
        let doc = Document::load(sample()).unwrap();
        assert_eq!(doc.version(), "1.7");
        assert_eq!(doc.pages().len(), 2);
        assert_eq!(doc.pages().get(1).unwrap().media_box(), [0.0, 0.0, 100.0, 100.0]);
        assert_eq!(doc.outlines().get(0).unwrap().title(), "Intro");
        assert!(doc.field("name").is_some());
        assert_eq!(doc.info().unwrap().get_text("Title"), Some("Sample".to_string()));
    }

    #[test]
    fn test_wrappers_belong_to_document() {
        let doc = Document::load(sample()).unwrap();
        let page = doc.pages().get(0).unwrap();
        assert_eq!(page.current_owner(), Some(doc.owner().clone()));
    }

    #[test]
    fn test_loaded_numbers_are_kept() {
        let first = Document::load(sample()).unwrap();
        let catalog_ref = first.catalog().identity().unwrap();
        let bytes = first.to_bytes(&SaveOptions::default()).unwrap();
        let second = Document::load(bytes).unwrap();
        assert_eq!(second.catalog().identity(), Some(catalog_ref));
    }

    #[test]
    fn test_file_id_is_kept() {
        let first = Document::load(sample()).unwrap();
        let id = first.trailer().get_array("ID").unwrap().get(0).unwrap();
        let second = Document::load(first.to_bytes(&SaveOptions::default()).unwrap()).unwrap();
        assert_eq!(second.trailer().get_array("ID").unwrap().get(0), Some(id));
    }

    #[test]
    fn test_resolve_by_number() {
        let doc = Document::load(sample()).unwrap();
        let catalog_ref = doc.catalog().identity().unwrap();
        let resolved = doc.resolve(catalog_ref);
        assert!(resolved.as_dict().unwrap().ptr_eq(doc.catalog()));
        assert_eq!(doc.resolve(ObjectRef::new(9999, 0)), Object::Null);
    }

    #[test]
    fn test_broken_xref_is_reconstructed() {
        let mut data = sample();
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        data.extend_from_slice(b"startxref\n999999\n%%EOF\n");

        let doc = Document::load(data.clone()).unwrap();
        assert_eq!(doc.pages().len(), 2);
        assert!(Document::load_with_options(data, ReaderOptions::strict()).is_err());
    }

    #[test]
    fn test_encrypted_input_unsupported() {
        let data = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
            xref\n0 2\n0000000000 65535 f \n0000000009 00000 n \n\
            trailer\n<< /Size 2 /Root 1 0 R /Encrypt << /Filter /Standard >> >>\n\
            startxref\n45\n%%EOF\n";
        assert!(matches!(Document::load(data.to_vec()), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_huge_trailer_size_does_not_exhaust_numbers() {
        let mut data = b"%PDF-1.7\n".to_vec();
        let catalog_at = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let pages_at = data.len();
        data.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        let xref_at = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n\
                 trailer\n<< /Size 4294967295 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                catalog_at, pages_at, xref_at
            )
            .as_bytes(),
        );

        let doc = Document::load(data).unwrap();
        let shared = PdfDictionary::new().with("Note", 1);
        doc.catalog().insert("Extra", shared.clone());
        doc.catalog().insert("Again", shared);
        doc.pages().push(&Page::new(LETTER)).unwrap();
        let bytes = doc.to_bytes(&SaveOptions::default()).unwrap();

        let reread = Document::load(bytes).unwrap();
        assert_eq!(reread.pages().len(), 1);
        let extra = reread.catalog().get_dict("Extra").unwrap();
        assert_eq!(extra.identity(), Some(ObjectRef::new(3, 0)));
    }

    #[test]
    fn test_not_a_pdf() {
        assert!(matches!(Document::load(b"hello".to_vec()), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        let doc = Document::new();
        doc.pages().push(&Page::new(LETTER)).unwrap();
        doc.save(&path, &SaveOptions::default()).unwrap();

        let reread = Document::open(&path).unwrap();
        assert_eq!(reread.pages().len(), 1);
    }

    #[test]
    fn test_copy_survives_source_drop() {
        let target = Document::new();
        let copy = {
            let source = Document::load(sample()).unwrap();
            let page = source.pages().get(0).unwrap();
            page.clone_to(target.owner())
        };
        target.pages().push(&copy).unwrap();
        assert_eq!(target.pages().get(0).unwrap().media_box(), LETTER);
    }
}
