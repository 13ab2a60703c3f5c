//! Per-document session state.
//!
//! A [`Session`] lives exactly as long as its document. It holds the side
//! tables that would otherwise need extra slots on the nodes themselves:
//! the wrapper cache (so the same dictionary always comes back as the same
//! wrapper of a given kind) and the fully-qualified field-name index.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::actions::Action;
use crate::annotations::Annotation;
use crate::error::{Error, Result};
use crate::fields::Field;
use crate::object::{NodeKey, PdfDictionary};
use crate::outline::Outline;
use crate::page_labels::PageLabel;
use crate::pages::Page;

/// Opaque identifier of an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(Uuid);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability naming the document session a wrapper belongs to.
///
/// Two owners are equal when they name the same session.
#[derive(Clone)]
pub struct Owner {
    id: OwnerId,
    session: Weak<Session>,
}

impl Owner {
    /// Owner that belongs to no document.
    ///
    /// Used to hold copies that were made while their destination was not
    /// yet attached anywhere.
    pub fn detached() -> Self {
        Self {
            id: OwnerId(Uuid::new_v4()),
            session: Weak::new(),
        }
    }

    pub(crate) fn for_session(session: &Rc<Session>) -> Self {
        Self {
            id: session.id,
            session: Rc::downgrade(session),
        }
    }

    /// Identifier of this owner.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// True while the owning document is alive.
    pub fn is_live(&self) -> bool {
        self.session.strong_count() > 0
    }

    pub(crate) fn session(&self) -> Option<Rc<Session>> {
        self.session.upgrade()
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Owner {}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A wrapper stored in the session cache.
#[derive(Clone)]
pub(crate) enum CachedWrapper {
    Action(Action),
    Annotation(Annotation),
    Outline(Outline),
    Field(Field),
    Page(Page),
    PageLabel(PageLabel),
}

/// Conversion between a wrapper type and its cache slot.
pub(crate) trait Cached: Clone + 'static {
    fn from_cached(cached: &CachedWrapper) -> Option<Self>;
    fn to_cached(&self) -> CachedWrapper;
}

macro_rules! impl_cached {
    ($ty:ident) => {
        impl Cached for $ty {
            fn from_cached(cached: &CachedWrapper) -> Option<Self> {
                match cached {
                    CachedWrapper::$ty(w) => Some(w.clone()),
                    _ => None,
                }
            }

            fn to_cached(&self) -> CachedWrapper {
                CachedWrapper::$ty(self.clone())
            }
        }
    };
}

impl_cached!(Action);
impl_cached!(Annotation);
impl_cached!(Outline);
impl_cached!(Field);
impl_cached!(Page);
impl_cached!(PageLabel);

/// Side tables of one open document.
pub(crate) struct Session {
    id: OwnerId,
    wrappers: RefCell<HashMap<(NodeKey, TypeId), CachedWrapper>>,
    fields: RefCell<IndexMap<String, Field>>,
}

impl Session {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            id: OwnerId(Uuid::new_v4()),
            wrappers: RefCell::new(HashMap::new()),
            fields: RefCell::new(IndexMap::new()),
        })
    }

    pub(crate) fn cached<T: Cached>(&self, key: NodeKey) -> Option<T> {
        self.wrappers
            .borrow()
            .get(&(key, TypeId::of::<T>()))
            .and_then(T::from_cached)
    }

    pub(crate) fn remember<T: Cached>(&self, key: NodeKey, wrapper: &T) {
        self.wrappers
            .borrow_mut()
            .insert((key, TypeId::of::<T>()), wrapper.to_cached());
    }

    pub(crate) fn field(&self, name: &str) -> Option<Field> {
        self.fields.borrow().get(name).cloned()
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }

    /// True if `name` is taken by a field other than `field`.
    pub(crate) fn name_taken(&self, name: &str, field: &Field) -> bool {
        self.fields
            .borrow()
            .get(name)
            .is_some_and(|existing| !existing.ptr_eq(field))
    }

    /// True if `field` is registered under `name`.
    pub(crate) fn is_registered(&self, name: &str, field: &Field) -> bool {
        self.fields
            .borrow()
            .get(name)
            .is_some_and(|existing| existing.ptr_eq(field))
    }

    pub(crate) fn register_field(&self, name: String, field: Field) -> Result<()> {
        if self.name_taken(&name, &field) {
            return Err(Error::DuplicateFieldName(name));
        }
        log::trace!("Registering field {}", name);
        self.fields.borrow_mut().insert(name, field);
        Ok(())
    }

    pub(crate) fn unregister_field(&self, name: &str) {
        log::trace!("Unregistering field {}", name);
        self.fields.borrow_mut().shift_remove(name);
    }

    /// Drop every cached wrapper and index entry.
    pub(crate) fn clear(&self) {
        self.wrappers.borrow_mut().clear();
        self.fields.borrow_mut().clear();
    }
}

/// The wrapper for `dict`, created with `make` unless `owner`'s session
/// already holds one.
pub(crate) fn wrapper_for<T: Cached>(
    dict: &PdfDictionary,
    owner: Option<&Owner>,
    make: impl FnOnce() -> T,
) -> T {
    let session = owner.and_then(Owner::session);
    if let Some(existing) = session.as_ref().and_then(|s| s.cached::<T>(dict.key())) {
        return existing;
    }
    let wrapper = make();
    if let Some(session) = session {
        session.remember(dict.key(), &wrapper);
    }
    wrapper
}

/// Record `wrapper` in `owner`'s session cache.
pub(crate) fn remember_wrapper<T: Cached>(owner: &Owner, dict: &PdfDictionary, wrapper: &T) {
    if let Some(session) = owner.session() {
        session.remember(dict.key(), wrapper);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::WrapperCore;

    #[test]
    fn test_owner_equality_is_by_id() {
        let session = Session::new();
        let a = Owner::for_session(&session);
        let b = Owner::for_session(&session);
        assert_eq!(a, b);
        assert_ne!(a, Owner::detached());
        assert!(a.is_live());
        assert!(!Owner::detached().is_live());
    }

    #[test]
    fn test_owner_outlives_session() {
        let session = Session::new();
        let owner = Owner::for_session(&session);
        drop(session);
        assert!(!owner.is_live());
        assert!(owner.session().is_none());
    }

    #[test]
    fn test_wrapper_cache_returns_same_wrapper() {
        let session = Session::new();
        let owner = Owner::for_session(&session);
        let dict = PdfDictionary::new();
        let make = || PageLabel::from_core(WrapperCore::new(dict.clone(), None));
        let first = wrapper_for(&dict, Some(&owner), make);
        let second = wrapper_for(&dict, Some(&owner), make);
        assert!(first.ptr_eq(&second));
        assert!(session.cached::<Page>(dict.key()).is_none());
    }

    #[test]
    fn test_field_registration() {
        let session = Session::new();
        let a = Field::new("a");
        let b = Field::new("a");
        session.register_field("a".to_string(), a.clone()).unwrap();
        session.register_field("a".to_string(), a.clone()).unwrap();
        assert!(matches!(
            session.register_field("a".to_string(), b),
            Err(Error::DuplicateFieldName(name)) if name == "a"
        ));
        assert!(session.is_registered("a", &a));
        session.unregister_field("a");
        assert!(session.field("a").is_none());
    }
}
