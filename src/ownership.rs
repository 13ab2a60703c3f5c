//! Ownership and clone-transfer protocol.
//!
//! A wrapper (action, annotation, outline item, field, page, page label)
//! is either unowned, in which case it is a reusable template, or owned by
//! exactly one document. Inserting a wrapper into a collection calls
//! [`Owned::clone_to`] with the collection's owner: an unowned wrapper is
//! attached in place, an owned one is copied. Copies contain only the keys
//! the entity type allows, and every composite value in them is freshly
//! allocated, so nothing reachable from a copy is shared with the source.
//!
//! Attaching and copying walk owned children (action chains, popups, kids)
//! and may meet cycles. One [`TransferPass`] is threaded through a whole
//! walk and remembers what it already attached or copied.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::object::{NodeKey, Object, PdfArray, PdfDictionary, PdfStream};
use crate::session::Owner;

/// Keys that link an entity into its surrounding structure. A deep copy
/// never follows them, so copying one annotation appearance does not pull
/// in the page tree.
const STRUCTURAL_KEYS: &[&str] = &[
    "Parent", "P", "Prev", "Next", "First", "Last", "Kids", "Annots", "Popup", "IRT",
];

/// Implemented by every wrapper.
pub trait Owned: Sized + Clone {
    /// The dictionary this wrapper edits.
    fn underlying(&self) -> PdfDictionary;

    /// Current owner, if any.
    fn current_owner(&self) -> Option<Owner>;

    /// Give an unowned wrapper to `owner`, together with its unowned children.
    ///
    /// Fails with [`Error::AlreadyOwned`] when the wrapper has an owner.
    ///
    /// The wrapper's dictionary becomes part of the owning document's graph,
    /// and dropping that [`Document`](crate::Document) empties every
    /// dictionary in the graph. A template kept by the caller after it was
    /// attached reads as empty from then on. Use [`copy`](Self::copy) to
    /// keep the template intact.
    fn attach(&self, owner: &Owner) -> Result<()>;

    /// Independent copy owned by `owner`.
    fn copy(&self, owner: &Owner) -> Self;

    /// Attach when unowned (returning this same wrapper), copy otherwise.
    ///
    /// An attached wrapper shares the document's lifetime; see
    /// [`attach`](Self::attach).
    fn clone_to(&self, owner: &Owner) -> Self {
        match self.attach(owner) {
            Ok(()) => self.clone(),
            Err(_) => self.copy(owner),
        }
    }
}

/// Pass-aware half of [`Owned`], used while walking children.
pub(crate) trait Transfer: Owned + 'static {
    fn core(&self) -> &Rc<WrapperCore>;

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()>;

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self;

    fn clone_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let key = self.core().dict().key();
        if pass.attached.contains(&key) {
            return self.clone();
        }
        if let Some(copy) = pass.copy_of::<Self>(key) {
            return copy;
        }
        match self.attach_in(owner, pass) {
            Ok(()) => self.clone(),
            Err(_) => self.copy_in(owner, pass),
        }
    }
}

/// Implement [`Owned`] for a wrapper in terms of its [`Transfer`] impl.
macro_rules! owned_via_transfer {
    ($ty:ty) => {
        impl $crate::ownership::Owned for $ty {
            fn underlying(&self) -> $crate::object::PdfDictionary {
                $crate::ownership::Transfer::core(self).dict().clone()
            }

            fn current_owner(&self) -> Option<$crate::session::Owner> {
                $crate::ownership::Transfer::core(self).owner()
            }

            fn attach(&self, owner: &$crate::session::Owner) -> $crate::error::Result<()> {
                let mut pass = $crate::ownership::TransferPass::default();
                $crate::ownership::Transfer::attach_in(self, owner, &mut pass)
            }

            fn copy(&self, owner: &$crate::session::Owner) -> Self {
                let mut pass = $crate::ownership::TransferPass::default();
                $crate::ownership::Transfer::copy_in(self, owner, &mut pass)
            }
        }
    };
}

pub(crate) use owned_via_transfer;

/// Memo for one attach or copy walk.
#[derive(Default)]
pub(crate) struct TransferPass {
    attached: HashSet<NodeKey>,
    copies: HashMap<NodeKey, Box<dyn Any>>,
    pub(crate) copier: DeepCopier,
}

impl TransferPass {
    pub(crate) fn mark_attached(&mut self, key: NodeKey) {
        self.attached.insert(key);
    }

    pub(crate) fn remember_copy<T: Clone + 'static>(&mut self, source: NodeKey, copy: &T) {
        self.copies.insert(source, Box::new(copy.clone()));
    }

    fn copy_of<T: Clone + 'static>(&self, source: NodeKey) -> Option<T> {
        self.copies
            .get(&source)
            .and_then(|c| c.downcast_ref::<T>())
            .cloned()
    }
}

/// State every wrapper shares with the collections hosted on it.
pub(crate) struct WrapperCore {
    dict: PdfDictionary,
    owner: RefCell<Option<Owner>>,
}

impl WrapperCore {
    pub(crate) fn new(dict: PdfDictionary, owner: Option<Owner>) -> Rc<Self> {
        Rc::new(Self {
            dict,
            owner: RefCell::new(owner),
        })
    }

    pub(crate) fn dict(&self) -> &PdfDictionary {
        &self.dict
    }

    pub(crate) fn owner(&self) -> Option<Owner> {
        self.owner.borrow().clone()
    }

    /// Take ownership for `owner`; fails if already owned.
    pub(crate) fn claim(&self, owner: &Owner) -> Result<()> {
        let mut slot = self.owner.borrow_mut();
        if slot.is_some() {
            return Err(Error::AlreadyOwned);
        }
        *slot = Some(owner.clone());
        Ok(())
    }
}

/// Bring `item` under the owner of `host`.
///
/// With an owned host this is `clone_to`. An unowned host keeps unowned
/// items as they are (they are attached when the host is), and takes a
/// detached copy of owned ones so it never aliases another document.
pub(crate) fn admit<T: Transfer>(host: &WrapperCore, item: &T) -> T {
    match host.owner() {
        Some(owner) => item.clone_to(&owner),
        None if item.current_owner().is_none() => item.clone(),
        None => item.copy(&Owner::detached()),
    }
}

/// Ordered wrappers hosted on one dictionary.
pub(crate) struct WrapperList<T> {
    host: Rc<WrapperCore>,
    items: RefCell<Vec<T>>,
}

impl<T: Transfer> WrapperList<T> {
    pub(crate) fn new(host: Rc<WrapperCore>, items: Vec<T>) -> Self {
        Self {
            host,
            items: RefCell::new(items),
        }
    }

    pub(crate) fn host(&self) -> &Rc<WrapperCore> {
        &self.host
    }

    pub(crate) fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().get(index).cloned()
    }

    pub(crate) fn to_vec(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    pub(crate) fn position(&self, item: &T) -> Option<usize> {
        let key = item.core().dict().key();
        self.items
            .borrow()
            .iter()
            .position(|i| i.core().dict().key() == key)
    }

    /// Admit `item` and insert it before `index`.
    pub(crate) fn insert(&self, index: usize, item: &T) -> Result<T> {
        let len = self.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let admitted = admit(&self.host, item);
        self.items.borrow_mut().insert(index, admitted.clone());
        Ok(admitted)
    }

    pub(crate) fn remove_at(&self, index: usize) -> Result<T> {
        let mut items = self.items.borrow_mut();
        if index >= items.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        Ok(items.remove(index))
    }

    pub(crate) fn clear(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.borrow_mut())
    }

    /// Bring every item under `owner` after the host was attached.
    pub(crate) fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        let current = self.to_vec();
        let adopted: Vec<T> = current.iter().map(|item| item.clone_in(owner, pass)).collect();
        *self.items.borrow_mut() = adopted;
    }

    /// Items transferred to `owner`, for a list hosted on a copy.
    pub(crate) fn transfer_items(&self, owner: &Owner, pass: &mut TransferPass) -> Vec<T> {
        self.to_vec()
            .iter()
            .map(|item| item.clone_in(owner, pass))
            .collect()
    }
}

/// Cycle-safe deep copy of object graphs, memoized by node.
#[derive(Default)]
pub(crate) struct DeepCopier {
    memo: HashMap<NodeKey, Object>,
}

impl DeepCopier {
    /// Copy `value`. Every composite reachable from it is reallocated once.
    pub(crate) fn copy(&mut self, value: &Object) -> Object {
        match value {
            Object::Array(src) => {
                if let Some(done) = self.memo.get(&src.key()) {
                    return done.clone();
                }
                let dst = PdfArray::new();
                self.memo.insert(src.key(), Object::from(dst.clone()));
                for item in src.to_vec() {
                    dst.push(self.copy(&item));
                }
                Object::from(dst)
            },
            Object::Dictionary(src) => {
                if let Some(done) = self.memo.get(&src.key()) {
                    return done.clone();
                }
                let dst = PdfDictionary::new();
                self.memo.insert(src.key(), Object::from(dst.clone()));
                self.fill(src, &dst);
                Object::from(dst)
            },
            Object::Stream(src) => {
                if let Some(done) = self.memo.get(&src.key()) {
                    return done.clone();
                }
                let dst = PdfStream::new(PdfDictionary::new(), src.data());
                self.memo.insert(src.key(), Object::from(dst.clone()));
                self.fill(src.dict(), dst.dict());
                Object::from(dst)
            },
            // Resolution already happened; a reference left here is dangling.
            Object::Reference(_) => Object::Null,
            leaf => leaf.clone(),
        }
    }

    fn fill(&mut self, src: &PdfDictionary, dst: &PdfDictionary) {
        for key in src.keys() {
            let Some(value) = src.get(&key) else { continue };
            if value.is_composite() && STRUCTURAL_KEYS.contains(&key.as_str()) {
                continue;
            }
            let copied = self.copy(&value);
            dst.insert(key, copied);
        }
    }

    /// Deep-copy each of `keys` present in `src` into `dst`.
    pub(crate) fn copy_keys(&mut self, src: &PdfDictionary, dst: &PdfDictionary, keys: &[&str]) {
        for key in keys {
            if let Some(value) = src.get(key) {
                if value.is_null() {
                    continue;
                }
                let copied = self.copy(&value);
                dst.insert(*key, copied);
            }
        }
    }
}

/// Copy a destination (`Dest` or an action's `D`).
///
/// Named and string destinations are kept. An explicit destination naming
/// a page by number (remote documents) is deep-copied. One naming a page
/// dictionary is only meaningful inside the same document, so it is shared
/// when `same_owner` and dropped otherwise.
pub(crate) fn copy_destination(
    value: &Object,
    same_owner: bool,
    copier: &mut DeepCopier,
) -> Option<Object> {
    match value {
        Object::Name(_) | Object::String(_) => Some(value.clone()),
        Object::Array(arr) => match arr.get(0) {
            Some(Object::Integer(_)) => Some(copier.copy(value)),
            Some(Object::Dictionary(_)) if same_owner => Some(Object::from(arr.shallow_clone())),
            _ => {
                log::debug!("Dropping explicit destination that points into another document");
                None
            },
        },
        _ => None,
    }
}

/// Value of `key` on `dict` or, failing that, on the nearest ancestor
/// reached through `Parent` that has it.
pub(crate) fn inherited(dict: &PdfDictionary, key: &str) -> Option<Object> {
    let mut seen = HashSet::new();
    let mut current = Some(dict.clone());
    while let Some(node) = current {
        if !seen.insert(node.key()) {
            break;
        }
        if let Some(value) = node.get(key) {
            if !value.is_null() {
                return Some(value);
            }
        }
        current = node.get_dict("Parent");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_deep_copy_reallocates_every_node() {
        let shared = PdfArray::from_vec(vec![Object::Integer(1)]);
        let src = PdfDictionary::new()
            .with("A", shared.clone())
            .with("B", shared.clone())
            .with("N", Object::name("X"));
        let mut copier = DeepCopier::default();
        let copy = copier.copy(&Object::from(src.clone()));
        let copy = copy.as_dict().unwrap().clone();
        assert_ne!(copy, src);
        let a = copy.get_array("A").unwrap();
        assert_ne!(a, shared);
        // Sharing inside the copied graph is preserved.
        assert_eq!(copy.get_array("B").unwrap(), a);
        assert_eq!(copy.get_name("N").as_deref(), Some("X"));
    }

    #[test]
    fn test_deep_copy_handles_cycles() {
        let a = PdfDictionary::new();
        let b = PdfDictionary::new();
        a.insert("Other", b.clone());
        b.insert("Other", a.clone());
        let mut copier = DeepCopier::default();
        let copy = copier.copy(&Object::from(a.clone()));
        let ca = copy.as_dict().unwrap().clone();
        let cb = ca.get_dict("Other").unwrap();
        assert_eq!(cb.get_dict("Other").unwrap(), ca);
        assert_ne!(ca, a);
    }

    #[test]
    fn test_deep_copy_skips_structural_links() {
        let page = PdfDictionary::with_type("Page");
        let ap = PdfDictionary::new()
            .with("P", page)
            .with("Parent", Object::name("KeptBecauseLeaf"));
        let mut copier = DeepCopier::default();
        let copy = copier.copy(&Object::from(ap));
        let copy = copy.as_dict().unwrap();
        assert!(!copy.contains_key("P"));
        assert!(copy.contains_key("Parent"));
    }

    #[test]
    fn test_deep_copy_stream() {
        let stream = PdfStream::new(PdfDictionary::new().with("Length", 3), b"abc".to_vec());
        let mut copier = DeepCopier::default();
        let copy = copier.copy(&Object::from(stream.clone()));
        let copy = copy.as_stream().unwrap();
        assert_ne!(copy, &stream);
        assert_eq!(copy.data(), b"abc");
        assert_eq!(copy.dict().get_integer("Length"), Some(3));
    }

    #[test]
    fn test_dangling_reference_copies_as_null() {
        let mut copier = DeepCopier::default();
        let copy = copier.copy(&Object::Reference(ObjectRef::new(4, 0)));
        assert!(copy.is_null());
    }

    #[test]
    fn test_copy_destination_rules() {
        let mut copier = DeepCopier::default();
        let named = Object::name("Chapter1");
        assert_eq!(copy_destination(&named, false, &mut copier), Some(named));

        let page = PdfDictionary::with_type("Page");
        let explicit = Object::from(vec![Object::from(page.clone()), Object::name("Fit")]);
        assert!(copy_destination(&explicit, false, &mut copier).is_none());
        let kept = copy_destination(&explicit, true, &mut copier).unwrap();
        assert_eq!(kept.as_array().unwrap().get(0), Some(Object::from(page)));

        let remote = Object::from(vec![Object::Integer(3), Object::name("Fit")]);
        assert!(copy_destination(&remote, false, &mut copier).is_some());
    }

    #[test]
    fn test_inherited_walks_parents() {
        let root = PdfDictionary::with_type("Pages").with("Rotate", 90);
        let page = PdfDictionary::with_type("Page").with("Parent", root.clone());
        root.insert("Kids", PdfArray::from_vec(vec![Object::from(page.clone())]));
        assert_eq!(inherited(&page, "Rotate"), Some(Object::Integer(90)));
        assert_eq!(inherited(&page, "MediaBox"), None);
    }

    #[test]
    fn test_claim_twice_fails() {
        let core = WrapperCore::new(PdfDictionary::new(), None);
        let owner = Owner::detached();
        core.claim(&owner).unwrap();
        assert!(matches!(core.claim(&owner), Err(Error::AlreadyOwned)));
        assert_eq!(core.owner(), Some(owner));
    }
}
