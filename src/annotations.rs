//! Page annotations (ISO 32000-1:2008, Section 12.5).
//!
//! An [`Annotation`] wraps one annotation dictionary. Its popup, its
//! activation action (`A`) and its additional actions (`AA`) are owned
//! children and follow it through attach and copy. The page's `Annots`
//! array is managed by an [`AnnotationCollection`], which also keeps the
//! `P`, `Popup` and `Parent` links consistent and stores each popup right
//! after its parent.

use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::actions::{Action, TriggerActions};
use crate::error::Result;
use crate::object::{rect_object, Object, PdfArray, PdfDictionary};
use crate::ownership::{
    admit, copy_destination, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore,
    WrapperList,
};
use crate::session::{remember_wrapper, wrapper_for, Owner};

/// Annotation subtype per PDF spec Table 169.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationSubtype {
    /// Text annotation (sticky note)
    Text,
    /// Link annotation
    Link,
    /// Free text annotation
    FreeText,
    /// Line annotation
    Line,
    /// Square annotation
    Square,
    /// Circle annotation
    Circle,
    /// Polygon annotation
    Polygon,
    /// Polyline annotation
    PolyLine,
    /// Highlight annotation
    Highlight,
    /// Underline annotation
    Underline,
    /// Squiggly underline annotation
    Squiggly,
    /// Strikeout annotation
    StrikeOut,
    /// Rubber stamp annotation
    Stamp,
    /// Caret annotation
    Caret,
    /// Ink annotation
    Ink,
    /// Popup annotation
    Popup,
    /// File attachment annotation
    FileAttachment,
    /// Sound annotation
    Sound,
    /// Widget annotation (form field)
    Widget,
    /// Any other subtype; only the common keys are copied
    Other,
}

impl AnnotationSubtype {
    /// Get the PDF name for this annotation subtype.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Link => "Link",
            Self::FreeText => "FreeText",
            Self::Line => "Line",
            Self::Square => "Square",
            Self::Circle => "Circle",
            Self::Polygon => "Polygon",
            Self::PolyLine => "PolyLine",
            Self::Highlight => "Highlight",
            Self::Underline => "Underline",
            Self::Squiggly => "Squiggly",
            Self::StrikeOut => "StrikeOut",
            Self::Stamp => "Stamp",
            Self::Caret => "Caret",
            Self::Ink => "Ink",
            Self::Popup => "Popup",
            Self::FileAttachment => "FileAttachment",
            Self::Sound => "Sound",
            Self::Widget => "Widget",
            Self::Other => "Other",
        }
    }

    /// Parse from PDF name.
    pub fn from_pdf_name(name: &str) -> Self {
        match name {
            "Text" => Self::Text,
            "Link" => Self::Link,
            "FreeText" => Self::FreeText,
            "Line" => Self::Line,
            "Square" => Self::Square,
            "Circle" => Self::Circle,
            "Polygon" => Self::Polygon,
            "PolyLine" => Self::PolyLine,
            "Highlight" => Self::Highlight,
            "Underline" => Self::Underline,
            "Squiggly" => Self::Squiggly,
            "StrikeOut" => Self::StrikeOut,
            "Stamp" => Self::Stamp,
            "Caret" => Self::Caret,
            "Ink" => Self::Ink,
            "Popup" => Self::Popup,
            "FileAttachment" => Self::FileAttachment,
            "Sound" => Self::Sound,
            "Widget" => Self::Widget,
            _ => Self::Other,
        }
    }

    /// Subtype-specific keys kept by a copy.
    fn copied_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Text => &["Open", "Name", "State", "StateModel"],
            Self::Link => &["H", "QuadPoints", "BS"],
            Self::FreeText => &["DA", "Q", "DS", "CL", "BE", "RD", "BS", "LE"],
            Self::Line => &["L", "BS", "LE", "IC", "LL", "LLE", "Cap", "LLO", "CP", "Measure", "CO"],
            Self::Square | Self::Circle => &["BS", "IC", "BE", "RD"],
            Self::Polygon | Self::PolyLine => &["Vertices", "LE", "BS", "IC", "BE", "Measure"],
            Self::Highlight | Self::Underline | Self::Squiggly | Self::StrikeOut => &["QuadPoints"],
            Self::Caret => &["RD", "Sy"],
            Self::Ink => &["InkList", "BS"],
            Self::Popup => &["Open"],
            Self::FileAttachment => &["FS", "Name"],
            Self::Sound => &["Sound", "Name"],
            Self::Stamp => &["Name"],
            Self::Widget => &["H", "MK", "BS"],
            Self::Other => &[],
        }
    }
}

/// Keys every annotation copy keeps.
const COMMON_KEYS: &[&str] = &[
    "Type", "Subtype", "Rect", "Contents", "NM", "M", "F", "AP", "AS", "Border", "C", "OC", "T",
    "CA", "RC", "CreationDate", "Subj", "RT", "IT",
];

/// An annotation dictionary.
#[derive(Clone)]
pub struct Annotation(Rc<AnnotationInner>);

struct AnnotationInner {
    core: Rc<WrapperCore>,
    popup: RefCell<Option<Annotation>>,
    action: RefCell<Option<Action>>,
    triggers: OnceCell<TriggerActions>,
    container: RefCell<Weak<AnnotationList>>,
}

impl Annotation {
    /// New unowned annotation.
    pub fn new(subtype: AnnotationSubtype, rect: [f64; 4]) -> Self {
        let dict = PdfDictionary::with_type("Annot")
            .with("Subtype", Object::name(subtype.pdf_name()))
            .with("Rect", rect_object(rect));
        Self::from_core(WrapperCore::new(dict, None))
    }

    /// Text (sticky note) annotation.
    pub fn text(rect: [f64; 4], contents: &str) -> Self {
        let annot = Self::new(AnnotationSubtype::Text, rect);
        annot.set_contents(contents);
        annot
    }

    /// Link annotation with no target yet.
    pub fn link(rect: [f64; 4]) -> Self {
        Self::new(AnnotationSubtype::Link, rect)
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        let owner = core.owner();
        let dict = core.dict().clone();
        let popup = match dict.get("Popup") {
            Some(Object::Dictionary(d))
                if d.has_name("Subtype", "Popup") && !dict.has_name("Subtype", "Popup") =>
            {
                Some(Annotation::wrap(d, owner.clone()))
            },
            _ => None,
        };
        let action = dict.get_dict("A").map(|d| Action::wrap(d, owner));
        Annotation(Rc::new(AnnotationInner {
            core,
            popup: RefCell::new(popup),
            action: RefCell::new(action),
            triggers: OnceCell::new(),
            container: RefCell::new(Weak::new()),
        }))
    }

    /// Wrapper for an existing annotation dictionary.
    pub(crate) fn wrap(dict: PdfDictionary, owner: Option<Owner>) -> Self {
        wrapper_for(&dict, owner.as_ref(), || {
            Self::from_core(WrapperCore::new(dict.clone(), owner.clone()))
        })
    }

    fn dict(&self) -> &PdfDictionary {
        self.0.core.dict()
    }

    /// Annotation subtype.
    pub fn subtype(&self) -> AnnotationSubtype {
        self.dict()
            .get_name("Subtype")
            .map(|n| AnnotationSubtype::from_pdf_name(&n))
            .unwrap_or(AnnotationSubtype::Other)
    }

    /// Rectangle `[llx lly urx ury]`.
    pub fn rect(&self) -> Option<[f64; 4]> {
        let numbers = self.dict().get_array("Rect")?.to_numbers();
        numbers.try_into().ok()
    }

    /// Set the rectangle.
    pub fn set_rect(&self, rect: [f64; 4]) {
        self.dict().insert("Rect", rect_object(rect));
    }

    /// Text contents.
    pub fn contents(&self) -> Option<String> {
        self.dict().get_text("Contents")
    }

    /// Set the text contents.
    pub fn set_contents(&self, contents: &str) {
        self.dict().insert("Contents", Object::text(contents));
    }

    /// Annotation flags (`F`).
    pub fn flags(&self) -> u32 {
        self.dict().get_integer_or("F", 0) as u32
    }

    /// Set the annotation flags.
    pub fn set_flags(&self, flags: u32) {
        self.dict().insert("F", flags);
    }

    /// Link destination (`Dest`).
    pub fn destination(&self) -> Option<Object> {
        self.dict().get("Dest")
    }

    /// Set the link destination.
    pub fn set_destination(&self, destination: impl Into<Object>) {
        self.dict().insert("Dest", destination);
    }

    /// The popup that displays this annotation's text.
    pub fn popup(&self) -> Option<Annotation> {
        self.0.popup.borrow().clone()
    }

    /// Set or clear the popup. Returns the popup actually stored.
    ///
    /// The `Popup`/`Parent` links are written by the page's collection.
    pub fn set_popup(&self, popup: Option<&Annotation>) -> Option<Annotation> {
        let stored = popup.map(|p| admit(&self.0.core, p));
        let previous = self.0.popup.replace(stored.clone());
        let container = self.0.container.borrow().upgrade();
        if let Some(list) = container {
            let replaced = previous.filter(|old| !stored.as_ref().is_some_and(|s| s.ptr_eq(old)));
            if let Some(old) = replaced {
                list.release(&old);
            }
            list.write();
        }
        stored
    }

    /// Activation action (`A`).
    pub fn action(&self) -> Option<Action> {
        self.0.action.borrow().clone()
    }

    /// Set or clear the activation action. Returns the action actually stored.
    pub fn set_action(&self, action: Option<&Action>) -> Option<Action> {
        let stored = action.map(|a| admit(&self.0.core, a));
        match &stored {
            Some(a) => self.dict().insert("A", a.underlying()),
            None => self.dict().remove("A"),
        };
        *self.0.action.borrow_mut() = stored.clone();
        stored
    }

    /// Additional actions (`AA`).
    pub fn triggers(&self) -> TriggerActions {
        self.0
            .triggers
            .get_or_init(|| TriggerActions::load(self.0.core.clone()))
            .clone()
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &Annotation) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn relink_container(&self) {
        let container = self.0.container.borrow().upgrade();
        if let Some(list) = container {
            list.write();
        }
    }
}

impl Transfer for Annotation {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        let triggers = self.triggers();
        self.0.core.claim(owner)?;
        pass.mark_attached(self.dict().key());
        remember_wrapper(owner, self.dict(), self);

        let popup = self.popup().map(|p| p.clone_in(owner, pass));
        *self.0.popup.borrow_mut() = popup;
        let action = self.action().map(|a| a.clone_in(owner, pass));
        if let Some(a) = &action {
            self.dict().insert("A", a.underlying());
        }
        *self.0.action.borrow_mut() = action;
        triggers.adopt(owner, pass);
        self.relink_container();
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let src = self.dict();
        let core = WrapperCore::new(PdfDictionary::new(), Some(owner.clone()));
        let copy = Annotation(Rc::new(AnnotationInner {
            core: core.clone(),
            popup: RefCell::new(None),
            action: RefCell::new(None),
            triggers: OnceCell::new(),
            container: RefCell::new(Weak::new()),
        }));
        pass.remember_copy(src.key(), &copy);
        let dst = core.dict();

        pass.copier.copy_keys(src, dst, COMMON_KEYS);
        pass.copier.copy_keys(src, dst, self.subtype().copied_keys());
        if self.subtype() == AnnotationSubtype::Link {
            let same_owner = self.current_owner().as_ref() == Some(owner);
            if let Some(dest) = src.get("Dest") {
                if let Some(copied) = copy_destination(&dest, same_owner, &mut pass.copier) {
                    dst.insert("Dest", copied);
                }
            }
        }

        *copy.0.popup.borrow_mut() = self.popup().map(|p| p.clone_in(owner, pass));
        if let Some(action) = self.action().map(|a| a.clone_in(owner, pass)) {
            dst.insert("A", action.underlying());
            *copy.0.action.borrow_mut() = Some(action);
        }
        let triggers = self.triggers().transfer_to(core.clone(), owner, pass);
        let _ = copy.0.triggers.set(triggers);
        remember_wrapper(owner, dst, &copy);
        copy
    }
}

owned_via_transfer!(Annotation);

impl std::fmt::Debug for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotation")
            .field("subtype", &self.subtype())
            .field("rect", &self.rect())
            .field("owner", &self.current_owner())
            .finish()
    }
}

struct AnnotationList {
    list: WrapperList<Annotation>,
}

impl AnnotationList {
    /// Unlink a popup that no longer belongs to any annotation here.
    fn release(&self, popup: &Annotation) {
        popup.dict().remove("Parent");
        popup.dict().remove("P");
    }

    /// Rewrite `Annots` and the `P`/`Popup`/`Parent` links.
    fn write(&self) {
        let page = self.list.host().dict();
        let annots = PdfArray::new();
        for item in self.list.to_vec() {
            item.dict().insert("P", page.clone());
            annots.push(item.underlying());
            match item.popup() {
                Some(popup) => {
                    item.dict().insert("Popup", popup.underlying());
                    popup.dict().insert("Parent", item.underlying());
                    popup.dict().insert("P", page.clone());
                    annots.push(popup.underlying());
                },
                None => {
                    item.dict().remove("Popup");
                },
            }
        }
        if annots.is_empty() {
            page.remove("Annots");
        } else {
            page.insert("Annots", annots);
        }
    }
}

/// The annotations of one page.
///
/// Popups are reached through their parent annotation and are not items
/// of the collection themselves.
#[derive(Clone)]
pub struct AnnotationCollection(Rc<AnnotationList>);

impl AnnotationCollection {
    pub(crate) fn load(page: Rc<WrapperCore>) -> Self {
        let owner = page.owner();
        let dicts: Vec<PdfDictionary> = page
            .dict()
            .get_array_or_empty("Annots")
            .to_vec()
            .into_iter()
            .filter_map(|obj| match obj {
                Object::Dictionary(d) => Some(d),
                _ => None,
            })
            .collect();
        let listed: HashSet<_> = dicts.iter().map(|d| d.key()).collect();
        let items: Vec<Annotation> = dicts
            .into_iter()
            .filter(|d| {
                let is_child_popup = d.has_name("Subtype", "Popup")
                    && d.get_dict("Parent").is_some_and(|p| listed.contains(&p.key()));
                !is_child_popup
            })
            .map(|d| Annotation::wrap(d, owner.clone()))
            .collect();
        Self::with_items(page, items)
    }

    fn with_items(page: Rc<WrapperCore>, items: Vec<Annotation>) -> Self {
        let collection = AnnotationCollection(Rc::new(AnnotationList {
            list: WrapperList::new(page, items),
        }));
        collection.claim_items();
        collection
    }

    fn claim_items(&self) {
        for item in self.0.list.to_vec() {
            *item.0.container.borrow_mut() = Rc::downgrade(&self.0);
        }
    }

    /// Number of annotations (popups not counted).
    pub fn len(&self) -> usize {
        self.0.list.len()
    }

    /// True if the page has no annotations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Annotation at `index`.
    pub fn get(&self, index: usize) -> Option<Annotation> {
        self.0.list.get(index)
    }

    /// All annotations in order.
    pub fn to_vec(&self) -> Vec<Annotation> {
        self.0.list.to_vec()
    }

    /// Append an annotation; returns the annotation actually stored.
    pub fn push(&self, annotation: &Annotation) -> Result<Annotation> {
        self.insert(self.len(), annotation)
    }

    /// Insert an annotation before `index`; returns the annotation actually stored.
    pub fn insert(&self, index: usize, annotation: &Annotation) -> Result<Annotation> {
        let stored = self.0.list.insert(index, annotation)?;
        *stored.0.container.borrow_mut() = Rc::downgrade(&self.0);
        self.0.write();
        Ok(stored)
    }

    /// Remove the annotation at `index` (with its popup).
    pub fn remove_at(&self, index: usize) -> Result<Annotation> {
        let removed = self.0.list.remove_at(index)?;
        *removed.0.container.borrow_mut() = Weak::new();
        removed.dict().remove("P");
        if let Some(popup) = removed.popup() {
            popup.dict().remove("P");
        }
        self.0.write();
        Ok(removed)
    }

    /// Position of `annotation` in the collection.
    pub fn index_of(&self, annotation: &Annotation) -> Option<usize> {
        self.0.list.position(annotation)
    }

    pub(crate) fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        self.0.list.adopt(owner, pass);
        self.claim_items();
        self.0.write();
    }

    /// Annotations for a copy of the page, hosted on `page`.
    pub(crate) fn transfer_to(
        &self,
        page: Rc<WrapperCore>,
        owner: &Owner,
        pass: &mut TransferPass,
    ) -> AnnotationCollection {
        let items = self.0.list.transfer_items(owner, pass);
        let copy = Self::with_items(page, items);
        copy.0.write();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn page_core() -> Rc<WrapperCore> {
        WrapperCore::new(PdfDictionary::with_type("Page"), None)
    }

    #[test]
    fn test_subtype_names() {
        assert_eq!(AnnotationSubtype::from_pdf_name("Ink"), AnnotationSubtype::Ink);
        assert_eq!(AnnotationSubtype::from_pdf_name("3D"), AnnotationSubtype::Other);
        assert_eq!(AnnotationSubtype::Highlight.pdf_name(), "Highlight");
    }

    #[test]
    fn test_collection_links_page_and_popup() {
        let page = page_core();
        let annots = AnnotationCollection::load(page.clone());
        let note = Annotation::text([0.0, 0.0, 20.0, 20.0], "hello");
        let popup = Annotation::new(AnnotationSubtype::Popup, [20.0, 20.0, 120.0, 80.0]);
        note.set_popup(Some(&popup));
        let stored = annots.push(&note).unwrap();
        assert!(stored.ptr_eq(&note));

        let arr = page.dict().get_array("Annots").unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get_dict(0).unwrap(), note.underlying());
        assert_eq!(arr.get_dict(1).unwrap(), popup.underlying());
        assert_eq!(note.underlying().get_dict("P").unwrap(), *page.dict());
        assert_eq!(note.underlying().get_dict("Popup").unwrap(), popup.underlying());
        assert_eq!(popup.underlying().get_dict("Parent").unwrap(), note.underlying());
        assert_eq!(annots.len(), 1);
    }

    #[test]
    fn test_load_skips_child_popups() {
        let page = PdfDictionary::with_type("Page");
        let parent = PdfDictionary::with_type("Annot").with("Subtype", Object::name("Text"));
        let popup = PdfDictionary::with_type("Annot")
            .with("Subtype", Object::name("Popup"))
            .with("Parent", parent.clone());
        parent.insert("Popup", popup.clone());
        page.insert(
            "Annots",
            PdfArray::from_vec(vec![Object::from(parent.clone()), Object::from(popup.clone())]),
        );
        let annots = AnnotationCollection::load(WrapperCore::new(page, None));
        assert_eq!(annots.len(), 1);
        let loaded = annots.get(0).unwrap();
        assert_eq!(loaded.popup().unwrap().underlying(), popup);
    }

    #[test]
    fn test_set_popup_after_insert_relinks() {
        let page = page_core();
        let annots = AnnotationCollection::load(page.clone());
        let note = annots.push(&Annotation::text([0.0; 4], "x")).unwrap();
        note.set_popup(Some(&Annotation::new(AnnotationSubtype::Popup, [0.0; 4])));
        assert_eq!(page.dict().get_array("Annots").unwrap().len(), 2);
        note.set_popup(None);
        assert_eq!(page.dict().get_array("Annots").unwrap().len(), 1);
        assert!(!note.underlying().contains_key("Popup"));
    }

    #[test]
    fn test_copy_filters_keys_and_copies_children() {
        let owner_a = Owner::detached();
        let owner_b = Owner::detached();
        let note = Annotation::text([0.0, 0.0, 10.0, 10.0], "note");
        note.underlying().insert("StructParent", 4);
        note.underlying().insert("Open", true);
        note.underlying().insert(
            "AP",
            PdfDictionary::new().with("N", crate::object::PdfStream::from_bytes(b"q Q".to_vec())),
        );
        note.set_action(Some(&Action::uri("https://example.com")));
        note.attach(&owner_a).unwrap();

        let copy = note.clone_to(&owner_b);
        assert!(!copy.ptr_eq(&note));
        let dict = copy.underlying();
        assert!(!dict.contains_key("StructParent"));
        assert_eq!(dict.get_bool("Open"), Some(true));
        assert_ne!(dict.get_dict("AP").unwrap(), note.underlying().get_dict("AP").unwrap());
        let action = copy.action().unwrap();
        assert_eq!(action.current_owner(), Some(owner_b));
        assert!(!action.ptr_eq(&note.action().unwrap()));
        assert_eq!(dict.get_dict("A").unwrap(), action.underlying());
    }

    #[test]
    fn test_out_of_range_insert() {
        let annots = AnnotationCollection::load(page_core());
        let result = annots.insert(3, &Annotation::link([0.0; 4]));
        assert!(matches!(result, Err(Error::IndexOutOfRange { index: 3, len: 0 })));
        assert!(annots.is_empty());
    }

    #[test]
    fn test_remove_clears_page_link() {
        let page = page_core();
        let annots = AnnotationCollection::load(page.clone());
        let link = annots.push(&Annotation::link([0.0; 4])).unwrap();
        let removed = annots.remove_at(0).unwrap();
        assert!(removed.ptr_eq(&link));
        assert!(!link.underlying().contains_key("P"));
        assert!(!page.dict().contains_key("Annots"));
    }
}
