//! Pages and the page tree (ISO 32000-1:2008, Section 7.7.3).
//!
//! The page tree is flattened the first time it is accessed: every page
//! becomes a direct kid of the root `Pages` node, after the attributes it
//! inherited from intermediate nodes (`MediaBox`, `CropBox`, `Resources`,
//! `Rotate`) have been copied onto it.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::actions::TriggerActions;
use crate::annotations::AnnotationCollection;
use crate::error::{Error, Result};
use crate::object::{rect_object, NodeKey, Object, PdfArray, PdfDictionary, PdfStream};
use crate::ownership::{
    inherited, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore, WrapperList,
};
use crate::session::{remember_wrapper, wrapper_for, Owner};

/// Attributes a page inherits from its ancestors.
const INHERITABLE_KEYS: &[&str] = &["MediaBox", "CropBox", "Resources", "Rotate"];

/// Page keys kept by a copy.
const PAGE_KEYS: &[&str] = &[
    "Type", "MediaBox", "CropBox", "BleedBox", "TrimBox", "ArtBox", "BoxColorInfo", "Rotate",
    "UserUnit", "Resources", "Contents", "Group", "Thumb", "Dur", "Trans", "Tabs", "Metadata",
];

/// US Letter, the box used when a page has none.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A page dictionary.
#[derive(Clone)]
pub struct Page(Rc<PageInner>);

struct PageInner {
    core: Rc<WrapperCore>,
    annotations: OnceCell<AnnotationCollection>,
    triggers: OnceCell<TriggerActions>,
}

impl Page {
    /// New unowned page with the given media box and empty resources.
    pub fn new(media_box: [f64; 4]) -> Self {
        let dict = PdfDictionary::with_type("Page")
            .with("MediaBox", rect_object(media_box))
            .with("Resources", PdfDictionary::new());
        Self::from_core(WrapperCore::new(dict, None))
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        Page(Rc::new(PageInner {
            core,
            annotations: OnceCell::new(),
            triggers: OnceCell::new(),
        }))
    }

    pub(crate) fn wrap(dict: PdfDictionary, owner: Option<Owner>) -> Self {
        wrapper_for(&dict, owner.as_ref(), || {
            Self::from_core(WrapperCore::new(dict.clone(), owner.clone()))
        })
    }

    fn dict(&self) -> &PdfDictionary {
        self.0.core.dict()
    }

    fn key(&self) -> NodeKey {
        self.dict().key()
    }

    fn inherited_rect(&self, key: &str) -> Option<[f64; 4]> {
        let value = inherited(self.dict(), key)?;
        value.as_array()?.to_numbers().try_into().ok()
    }

    /// Media box, inherited; US Letter when no ancestor has one.
    pub fn media_box(&self) -> [f64; 4] {
        self.inherited_rect("MediaBox").unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Set the media box.
    pub fn set_media_box(&self, rect: [f64; 4]) {
        self.dict().insert("MediaBox", rect_object(rect));
    }

    /// Crop box, inherited; the media box when absent.
    pub fn crop_box(&self) -> [f64; 4] {
        self.inherited_rect("CropBox").unwrap_or_else(|| self.media_box())
    }

    /// Set the crop box.
    pub fn set_crop_box(&self, rect: [f64; 4]) {
        self.dict().insert("CropBox", rect_object(rect));
    }

    /// Rotation in degrees, inherited and normalized to 0, 90, 180 or 270.
    pub fn rotate(&self) -> i64 {
        inherited(self.dict(), "Rotate")
            .and_then(|r| r.as_integer())
            .unwrap_or(0)
            .rem_euclid(360)
    }

    /// Set the rotation. Must be a multiple of 90.
    pub fn set_rotate(&self, degrees: i64) -> Result<()> {
        if degrees % 90 != 0 {
            return Err(Error::InvalidPdf(format!(
                "Page rotation must be a multiple of 90, got {}",
                degrees
            )));
        }
        self.dict().insert("Rotate", degrees.rem_euclid(360));
        Ok(())
    }

    /// Resource dictionary, inherited. A page without one gets an empty
    /// dictionary of its own.
    pub fn resources(&self) -> PdfDictionary {
        match inherited(self.dict(), "Resources") {
            Some(Object::Dictionary(res)) => res,
            _ => self.dict().get_or_insert_dict("Resources"),
        }
    }

    /// Content streams in drawing order.
    pub fn contents(&self) -> Vec<PdfStream> {
        match self.dict().get("Contents") {
            Some(Object::Stream(s)) => vec![s],
            Some(Object::Array(arr)) => arr
                .to_vec()
                .into_iter()
                .filter_map(|o| match o {
                    Object::Stream(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Replace the contents with a single unfiltered stream.
    pub fn set_contents(&self, data: impl Into<Vec<u8>>) -> PdfStream {
        let stream = PdfStream::from_bytes(data);
        self.dict().insert("Contents", stream.clone());
        stream
    }

    /// Append a content stream, drawn after the existing ones.
    pub fn append_contents(&self, data: impl Into<Vec<u8>>) -> PdfStream {
        let stream = PdfStream::from_bytes(data);
        let streams: PdfArray = self
            .contents()
            .into_iter()
            .map(Object::from)
            .chain(std::iter::once(Object::from(stream.clone())))
            .collect();
        self.dict().insert("Contents", streams);
        stream
    }

    /// Annotations on the page.
    pub fn annotations(&self) -> AnnotationCollection {
        self.0
            .annotations
            .get_or_init(|| AnnotationCollection::load(self.0.core.clone()))
            .clone()
    }

    /// Page additional actions (`AA`, triggers `O` and `C`).
    pub fn triggers(&self) -> TriggerActions {
        self.0
            .triggers
            .get_or_init(|| TriggerActions::load(self.0.core.clone()))
            .clone()
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &Page) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Copy inherited attributes onto the page itself.
    fn materialize_inherited(&self) {
        for key in INHERITABLE_KEYS {
            if self.dict().get(key).is_some_and(|v| !v.is_null()) {
                continue;
            }
            if let Some(value) = inherited(self.dict(), key) {
                self.dict().insert(*key, value);
            }
        }
    }
}

impl Transfer for Page {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        let annotations = self.annotations();
        let triggers = self.triggers();
        self.0.core.claim(owner)?;
        pass.mark_attached(self.key());
        remember_wrapper(owner, self.dict(), self);
        triggers.adopt(owner, pass);
        annotations.adopt(owner, pass);
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let src = self.dict();
        let core = WrapperCore::new(PdfDictionary::new(), Some(owner.clone()));
        let copy = Page::from_core(core.clone());
        pass.remember_copy(src.key(), &copy);
        let dst = core.dict();

        pass.copier.copy_keys(src, dst, PAGE_KEYS);
        for key in INHERITABLE_KEYS {
            if dst.contains_key(key) {
                continue;
            }
            if let Some(value) = inherited(src, key) {
                let copied = pass.copier.copy(&value);
                dst.insert(*key, copied);
            }
        }

        let triggers = self.triggers().transfer_to(core.clone(), owner, pass);
        let _ = copy.0.triggers.set(triggers);
        let annotations = self.annotations().transfer_to(core.clone(), owner, pass);
        let _ = copy.0.annotations.set(annotations);
        remember_wrapper(owner, dst, &copy);
        copy
    }
}

owned_via_transfer!(Page);

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("media_box", &self.media_box())
            .field("rotate", &self.rotate())
            .field("owner", &self.current_owner())
            .finish()
    }
}

/// The document's pages, in order.
///
/// Backed by a flat page tree: the root's `Kids` holds every page, each
/// page's `Parent` is the root and the root's `Count` is the page count.
#[derive(Clone)]
pub struct PageCollection(Rc<WrapperList<Page>>);

impl PageCollection {
    /// Pages under `root`, flattening nested `Pages` nodes.
    pub(crate) fn load(root: Rc<WrapperCore>) -> Self {
        let owner = root.owner();
        let mut pages = Vec::new();
        let mut seen = HashSet::from([root.dict().key()]);
        let mut stack: Vec<Object> = root.dict().get_array_or_empty("Kids").to_vec();
        stack.reverse();
        while let Some(node) = stack.pop() {
            let Object::Dictionary(dict) = node else { continue };
            if !seen.insert(dict.key()) {
                log::warn!("Page tree node visited twice, skipping");
                continue;
            }
            if dict.has_name("Type", "Pages") || dict.contains_key("Kids") {
                let mut kids = dict.get_array_or_empty("Kids").to_vec();
                kids.reverse();
                stack.extend(kids);
                continue;
            }
            let page = Page::wrap(dict, owner.clone());
            page.materialize_inherited();
            pages.push(page);
        }
        log::debug!("Loaded {} pages", pages.len());
        let collection = PageCollection(Rc::new(WrapperList::new(root, pages)));
        collection.write();
        collection
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no pages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Page at `index`.
    pub fn get(&self, index: usize) -> Option<Page> {
        self.0.get(index)
    }

    /// All pages in order.
    pub fn to_vec(&self) -> Vec<Page> {
        self.0.to_vec()
    }

    /// Position of `page`.
    pub fn index_of(&self, page: &Page) -> Option<usize> {
        self.0.position(page)
    }

    /// Append a page; returns the page actually stored.
    pub fn push(&self, page: &Page) -> Result<Page> {
        self.insert(self.len(), page)
    }

    /// Insert a page before `index`; returns the page actually stored.
    pub fn insert(&self, index: usize, page: &Page) -> Result<Page> {
        let stored = self.0.insert(index, page)?;
        self.write();
        Ok(stored)
    }

    /// Remove the page at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Page> {
        let removed = self.0.remove_at(index)?;
        removed.dict().remove("Parent");
        self.write();
        Ok(removed)
    }

    fn write(&self) {
        let root = self.0.host().dict();
        let pages = self.0.to_vec();
        for page in &pages {
            page.dict().insert("Parent", root.clone());
        }
        let kids: PdfArray = pages.iter().map(|p| Object::from(p.underlying())).collect();
        root.insert("Kids", kids);
        root.insert("Count", pages.len());
    }
}
