//! Document outline (bookmarks), ISO 32000-1:2008 Section 12.3.3.
//!
//! Outline items form a tree threaded through `First`/`Last` on the
//! parent and `Prev`/`Next` between siblings. Items never write those
//! links themselves: an [`OutlineCollection`] (the outline root or an
//! item's kids) owns them and recomputes the `Count` visibility counter
//! on every ancestor after each structural change.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::actions::Action;
use crate::error::Result;
use crate::object::{NodeKey, Object, PdfDictionary};
use crate::ownership::{
    admit, copy_destination, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore,
    WrapperList,
};
use crate::session::{remember_wrapper, wrapper_for, Owner};

/// Outline item text style (the `F` entry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutlineStyle {
    /// Display in italic
    pub italic: bool,
    /// Display in bold
    pub bold: bool,
}

impl OutlineStyle {
    /// Create a new default style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bold style.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Set italic style.
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    /// Get the flags value for this style (PDF spec Section 12.3.3).
    pub fn flags(&self) -> i64 {
        let mut flags = 0i64;
        if self.italic {
            flags |= 1;
        }
        if self.bold {
            flags |= 2;
        }
        flags
    }

    fn from_flags(flags: i64) -> Self {
        Self {
            italic: flags & 1 != 0,
            bold: flags & 2 != 0,
        }
    }
}

/// A single outline item (bookmark).
#[derive(Clone)]
pub struct Outline(Rc<OutlineInner>);

struct OutlineInner {
    core: Rc<WrapperCore>,
    expanded: Cell<bool>,
    kids: OnceCell<OutlineCollection>,
    action: RefCell<Option<Action>>,
    container: RefCell<Weak<OutlineList>>,
}

impl Outline {
    /// New unowned item with the given title.
    pub fn new(title: &str) -> Self {
        let dict = PdfDictionary::new().with("Title", Object::text(title));
        Self::from_core(WrapperCore::new(dict, None))
    }

    /// New unowned item pointing at `destination`.
    pub fn with_destination(title: &str, destination: impl Into<Object>) -> Self {
        let item = Self::new(title);
        item.set_destination(Some(destination.into()));
        item
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        let dict = core.dict().clone();
        // An item is collapsed only when it says so with a negative count.
        let expanded = dict.get_integer("Count").map_or(true, |count| count >= 0);
        let action = dict.get_dict("A").map(|a| Action::wrap(a, core.owner()));
        Outline(Rc::new(OutlineInner {
            core,
            expanded: Cell::new(expanded),
            kids: OnceCell::new(),
            action: RefCell::new(action),
            container: RefCell::new(Weak::new()),
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

    /// Item title.
    pub fn title(&self) -> String {
        self.dict().get_text("Title").unwrap_or_default()
    }

    /// Set the item title.
    pub fn set_title(&self, title: &str) {
        self.dict().insert("Title", Object::text(title));
    }

    /// Destination (`Dest`): a name, a string or an explicit array.
    pub fn destination(&self) -> Option<Object> {
        self.dict().get("Dest").filter(|d| !d.is_null())
    }

    /// Set or clear the destination.
    pub fn set_destination(&self, destination: Option<Object>) {
        match destination {
            Some(dest) => self.dict().insert("Dest", dest),
            None => self.dict().remove("Dest"),
        };
    }

    /// Activation action (`A`).
    pub fn action(&self) -> Option<Action> {
        self.0.action.borrow().clone()
    }

    /// Set or clear the action. Returns the action actually stored.
    pub fn set_action(&self, action: Option<&Action>) -> Option<Action> {
        let stored = action.map(|a| admit(&self.0.core, a));
        match &stored {
            Some(a) => self.dict().insert("A", a.underlying()),
            None => self.dict().remove("A"),
        };
        *self.0.action.borrow_mut() = stored.clone();
        stored
    }

    /// Text style.
    pub fn style(&self) -> OutlineStyle {
        OutlineStyle::from_flags(self.dict().get_integer_or("F", 0))
    }

    /// Set the text style. A plain style removes `F`.
    pub fn set_style(&self, style: OutlineStyle) {
        match style.flags() {
            0 => self.dict().remove("F"),
            flags => self.dict().insert("F", flags),
        };
    }

    /// Text color (`C`) as RGB components.
    pub fn color(&self) -> Option<[f64; 3]> {
        self.dict().get_array("C")?.to_numbers().try_into().ok()
    }

    /// Set the text color.
    pub fn set_color(&self, rgb: [f64; 3]) {
        let components: Vec<Object> = rgb.iter().map(|c| Object::Real(*c)).collect();
        self.dict().insert("C", components);
    }

    /// True when the item shows its kids.
    pub fn is_expanded(&self) -> bool {
        self.0.expanded.get()
    }

    /// Expand or collapse the item.
    pub fn set_expanded(&self, expanded: bool) {
        if self.0.expanded.replace(expanded) != expanded {
            self.kids().0.refresh_counts();
        }
    }

    /// Child items.
    pub fn kids(&self) -> OutlineCollection {
        self.0
            .kids
            .get_or_init(|| OutlineCollection::load(self.0.core.clone(), Rc::downgrade(&self.0)))
            .clone()
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &Outline) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Transfer for Outline {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        let kids = self.kids();
        self.0.core.claim(owner)?;
        pass.mark_attached(self.key());
        remember_wrapper(owner, self.dict(), self);

        let action = self.action().map(|a| a.clone_in(owner, pass));
        if let Some(a) = &action {
            self.dict().insert("A", a.underlying());
        }
        *self.0.action.borrow_mut() = action;
        kids.adopt(owner, pass);
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let src = self.dict();
        let core = WrapperCore::new(PdfDictionary::new(), Some(owner.clone()));
        let copy = Outline(Rc::new(OutlineInner {
            core: core.clone(),
            expanded: Cell::new(self.is_expanded()),
            kids: OnceCell::new(),
            action: RefCell::new(None),
            container: RefCell::new(Weak::new()),
        }));
        pass.remember_copy(src.key(), &copy);
        let dst = core.dict();

        pass.copier.copy_keys(src, dst, &["Title", "C", "F"]);
        let same_owner = self.current_owner().as_ref() == Some(owner);
        if let Some(dest) = self.destination() {
            if let Some(copied) = copy_destination(&dest, same_owner, &mut pass.copier) {
                dst.insert("Dest", copied);
            }
        }
        if let Some(action) = self.action().map(|a| a.clone_in(owner, pass)) {
            dst.insert("A", action.underlying());
            *copy.0.action.borrow_mut() = Some(action);
        }

        let items = self.kids().0.list.transfer_items(owner, pass);
        let kids = OutlineCollection::with_items(core.clone(), Rc::downgrade(&copy.0), items);
        kids.0.write();
        let _ = copy.0.kids.set(kids);
        remember_wrapper(owner, dst, &copy);
        copy
    }
}

owned_via_transfer!(Outline);

impl std::fmt::Debug for Outline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outline")
            .field("title", &self.title())
            .field("expanded", &self.is_expanded())
            .field("owner", &self.current_owner())
            .finish()
    }
}

struct OutlineList {
    list: WrapperList<Outline>,
    /// The item whose kids these are; empty for the outline root.
    item: Weak<OutlineInner>,
}

impl OutlineList {
    /// Rewrite the sibling and parent links, then every affected `Count`.
    fn write(self: &Rc<Self>) {
        let host = self.list.host().dict();
        let items = self.list.to_vec();
        for (i, item) in items.iter().enumerate() {
            let dict = item.dict();
            dict.insert("Parent", host.clone());
            match i.checked_sub(1).and_then(|p| items.get(p)) {
                Some(prev) => dict.insert("Prev", prev.underlying()),
                None => dict.remove("Prev"),
            };
            match items.get(i + 1) {
                Some(next) => dict.insert("Next", next.underlying()),
                None => dict.remove("Next"),
            };
            *item.0.container.borrow_mut() = Rc::downgrade(self);
        }
        match (items.first(), items.last()) {
            (Some(first), Some(last)) => {
                host.insert("First", first.underlying());
                host.insert("Last", last.underlying());
            },
            _ => {
                host.remove("First");
                host.remove("Last");
            },
        }
        self.refresh_counts();
    }

    /// Recompute `Count` on this list's host and every ancestor.
    fn refresh_counts(self: &Rc<Self>) {
        let mut seen = HashSet::new();
        let mut current = Some(self.clone());
        while let Some(list) = current {
            if !seen.insert(list.list.host().dict().key()) {
                log::warn!("Outline tree loops back on itself, stopping count refresh");
                break;
            }
            list.write_count();
            current = list
                .item
                .upgrade()
                .and_then(|item| item.container.borrow().upgrade());
        }
    }

    fn write_count(&self) {
        let host = self.list.host().dict();
        if self.list.len() == 0 {
            host.remove("Count");
            return;
        }
        let mut seen = HashSet::from([host.key()]);
        let visible = self.visible(&mut seen);
        let collapsed = self.item.upgrade().is_some_and(|item| !item.expanded.get());
        host.insert("Count", if collapsed { -visible } else { visible });
    }

    /// Items that are shown when the host is expanded.
    fn visible(&self, seen: &mut HashSet<NodeKey>) -> i64 {
        let mut count = 0;
        for kid in self.list.to_vec() {
            count += 1;
            if kid.is_expanded() && seen.insert(kid.key()) {
                count += kid.kids().0.visible(seen);
            }
        }
        count
    }
}

/// The outline root's items or an item's kids.
#[derive(Clone)]
pub struct OutlineCollection(Rc<OutlineList>);

impl OutlineCollection {
    /// Items hosted on `host`. `item` is the outline item that owns the
    /// host, or an empty `Weak` for the outline root.
    fn load(host: Rc<WrapperCore>, item: Weak<OutlineInner>) -> Self {
        let owner = host.owner();
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut cursor = host.dict().get_dict("First");
        while let Some(dict) = cursor {
            if !seen.insert(dict.key()) {
                log::warn!("Outline sibling chain loops back on itself, truncating");
                break;
            }
            cursor = dict.get_dict("Next");
            items.push(Outline::wrap(dict, owner.clone()));
        }
        Self::with_items(host, item, items)
    }

    pub(crate) fn root(host: Rc<WrapperCore>) -> Self {
        Self::load(host, Weak::new())
    }

    fn with_items(host: Rc<WrapperCore>, item: Weak<OutlineInner>, items: Vec<Outline>) -> Self {
        let list = Rc::new(OutlineList {
            list: WrapperList::new(host, items),
            item,
        });
        for kid in list.list.to_vec() {
            *kid.0.container.borrow_mut() = Rc::downgrade(&list);
        }
        OutlineCollection(list)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.list.len()
    }

    /// True if there are no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `index`.
    pub fn get(&self, index: usize) -> Option<Outline> {
        self.0.list.get(index)
    }

    /// All items in order.
    pub fn to_vec(&self) -> Vec<Outline> {
        self.0.list.to_vec()
    }

    /// Position of `item`.
    pub fn index_of(&self, item: &Outline) -> Option<usize> {
        self.0.list.position(item)
    }

    /// Append an item; returns the item actually stored.
    pub fn push(&self, item: &Outline) -> Result<Outline> {
        self.insert(self.len(), item)
    }

    /// Insert an item before `index`; returns the item actually stored.
    pub fn insert(&self, index: usize, item: &Outline) -> Result<Outline> {
        let stored = self.0.list.insert(index, item)?;
        self.0.write();
        Ok(stored)
    }

    /// Remove the item at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Outline> {
        let removed = self.0.list.remove_at(index)?;
        Self::unlink(&removed);
        self.0.write();
        Ok(removed)
    }

    /// Remove every item.
    pub fn clear(&self) {
        for removed in self.0.list.clear() {
            Self::unlink(&removed);
        }
        self.0.write();
    }

    /// Visible descendants counted the way `Count` is.
    pub fn visible_count(&self) -> i64 {
        let mut seen = HashSet::from([self.0.list.host().dict().key()]);
        self.0.visible(&mut seen)
    }

    fn unlink(item: &Outline) {
        for key in ["Parent", "Prev", "Next"] {
            item.dict().remove(key);
        }
        *item.0.container.borrow_mut() = Weak::new();
    }

    fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        self.0.list.adopt(owner, pass);
        self.0.write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn root() -> (Rc<WrapperCore>, OutlineCollection) {
        let host = WrapperCore::new(PdfDictionary::with_type("Outlines"), None);
        let items = OutlineCollection::root(host.clone());
        (host, items)
    }

    #[test]
    fn test_style_flags() {
        let style = OutlineStyle::new().bold().italic();
        assert_eq!(style.flags(), 3);
        assert_eq!(OutlineStyle::from_flags(2), OutlineStyle::new().bold());
    }

    #[test]
    fn test_sibling_links() {
        let (host, items) = root();
        let a = items.push(&Outline::new("a")).unwrap();
        let b = items.push(&Outline::new("b")).unwrap();
        let c = items.push(&Outline::new("c")).unwrap();
        let h = host.dict();
        assert_eq!(h.get_dict("First").unwrap(), a.underlying());
        assert_eq!(h.get_dict("Last").unwrap(), c.underlying());
        assert_eq!(b.underlying().get_dict("Prev").unwrap(), a.underlying());
        assert_eq!(b.underlying().get_dict("Next").unwrap(), c.underlying());
        assert!(!a.underlying().contains_key("Prev"));
        assert!(!c.underlying().contains_key("Next"));
        assert_eq!(c.underlying().get_dict("Parent").unwrap(), *h);
        assert_eq!(h.get_integer("Count"), Some(3));

        items.remove_at(1).unwrap();
        assert_eq!(a.underlying().get_dict("Next").unwrap(), c.underlying());
        assert!(!b.underlying().contains_key("Parent"));
        assert_eq!(h.get_integer("Count"), Some(2));
    }

    #[test]
    fn test_counts_for_open_closed_and_nested() {
        let (host, items) = root();
        let chapter = items.push(&Outline::new("chapter")).unwrap();
        let kids = chapter.kids();
        kids.push(&Outline::new("1")).unwrap();
        let section = kids.push(&Outline::new("2")).unwrap();
        section.kids().push(&Outline::new("2.1")).unwrap();

        assert_eq!(section.underlying().get_integer("Count"), Some(1));
        assert_eq!(chapter.underlying().get_integer("Count"), Some(3));
        assert_eq!(host.dict().get_integer("Count"), Some(4));

        section.set_expanded(false);
        assert_eq!(section.underlying().get_integer("Count"), Some(-1));
        assert_eq!(chapter.underlying().get_integer("Count"), Some(2));
        assert_eq!(host.dict().get_integer("Count"), Some(3));

        chapter.set_expanded(false);
        assert_eq!(chapter.underlying().get_integer("Count"), Some(-2));
        assert_eq!(host.dict().get_integer("Count"), Some(1));

        // Removing the only nested kid drops the counter entirely.
        section.kids().remove_at(0).unwrap();
        assert!(!section.underlying().contains_key("Count"));
        assert!(!section.underlying().contains_key("First"));
        assert_eq!(chapter.underlying().get_integer("Count"), Some(-2));

        kids.remove_at(0).unwrap();
        assert_eq!(chapter.underlying().get_integer("Count"), Some(-1));
        chapter.set_expanded(true);
        assert_eq!(host.dict().get_integer("Count"), Some(2));
        assert_eq!(items.visible_count(), 2);
    }

    #[test]
    fn test_load_reads_chain_and_collapsed_state() {
        let root = PdfDictionary::with_type("Outlines");
        let a = PdfDictionary::new().with("Title", Object::string("a")).with("Count", -1);
        let b = PdfDictionary::new().with("Title", Object::string("b"));
        let a1 = PdfDictionary::new().with("Title", Object::string("a1"));
        a.insert("Next", b.clone());
        a.insert("First", a1.clone());
        // A sibling loop must not hang the loader.
        b.insert("Next", a.clone());
        root.insert("First", a.clone());
        let items = OutlineCollection::root(WrapperCore::new(root, None));
        assert_eq!(items.len(), 2);
        let first = items.get(0).unwrap();
        assert!(!first.is_expanded());
        assert_eq!(first.kids().get(0).unwrap().title(), "a1");
        assert!(items.get(1).unwrap().is_expanded());
    }

    #[test]
    fn test_template_is_attached_in_place() {
        let owner = Owner::detached();
        let template = Outline::new("x");
        let attached = template.clone_to(&owner);
        assert!(attached.ptr_eq(&template));
        assert_eq!(attached.current_owner(), Some(owner));
    }

    #[test]
    fn test_copy_is_independent() {
        let a = Owner::detached();
        let b = Owner::detached();
        let page = PdfDictionary::with_type("Page");
        let item = Outline::with_destination(
            "x",
            Object::from(vec![Object::from(page), Object::name("Fit")]),
        );
        item.set_color([1.0, 0.0, 0.0]);
        item.kids().push(&Outline::new("kid")).unwrap();
        item.set_expanded(false);
        item.attach(&a).unwrap();

        let copy = item.clone_to(&b);
        assert!(!copy.ptr_eq(&item));
        assert_eq!(copy.current_owner(), Some(b));
        assert_eq!(item.current_owner(), Some(a));
        assert_eq!(copy.title(), "x");
        assert!(copy.destination().is_none());
        assert!(!copy.is_expanded());
        assert_eq!(copy.underlying().get_integer("Count"), Some(-1));
        let kid = copy.kids().get(0).unwrap();
        assert!(!kid.ptr_eq(&item.kids().get(0).unwrap()));
        assert_eq!(kid.underlying().get_dict("Parent").unwrap(), copy.underlying());

        copy.underlying()
            .get_array("C")
            .unwrap()
            .set(0, Object::Real(0.5))
            .unwrap();
        assert_eq!(item.color(), Some([1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_insert_out_of_range() {
        let (_, items) = root();
        let result = items.insert(1, &Outline::new("x"));
        assert!(matches!(result, Err(Error::IndexOutOfRange { index: 1, len: 0 })));
    }

    #[test]
    fn test_attach_adopts_kids() {
        let owner = Owner::detached();
        let item = Outline::new("parent");
        let kid = item.kids().push(&Outline::new("kid")).unwrap();
        item.attach(&owner).unwrap();
        assert_eq!(kid.current_owner(), Some(owner));
        assert!(item.kids().get(0).unwrap().ptr_eq(&kid));
    }
}
