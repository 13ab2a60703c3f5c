//! Interactive form fields (ISO 32000-1:2008, Section 12.7).
//!
//! Fields form a tree under the AcroForm `Fields` array, linked through
//! `Kids` and `Parent`. A field's fully qualified name joins the partial
//! names (`T`) of the field and its ancestors with dots. The document
//! session keeps an index from fully qualified names to fields, and a
//! [`FieldCollection`] keeps that index in step with the tree: inserting
//! a subtree registers its names, removing it unregisters them, and two
//! fields may never share a name.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::actions::TriggerActions;
use crate::error::{Error, Result};
use crate::object::{NodeKey, Object, PdfArray, PdfDictionary};
use crate::ownership::{
    inherited, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore, WrapperList,
};
use crate::session::{remember_wrapper, wrapper_for, Owner, Session};

/// Field keys kept by a copy.
const FIELD_KEYS: &[&str] = &[
    "FT", "T", "TU", "TM", "Ff", "V", "DV", "DA", "Q", "DS", "RV", "MaxLen", "Opt", "TI", "I",
];

/// Keys of a widget annotation merged into its field.
const WIDGET_KEYS: &[&str] = &["Type", "Subtype", "Rect", "F", "MK", "AP", "AS", "BS", "Border", "H"];

/// Field type (`FT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Push buttons, check boxes and radio buttons (`Btn`)
    Button,
    /// Text fields (`Tx`)
    Text,
    /// List and combo boxes (`Ch`)
    Choice,
    /// Signature fields (`Sig`)
    Signature,
}

impl FieldType {
    /// PDF name of this type.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Button => "Btn",
            Self::Text => "Tx",
            Self::Choice => "Ch",
            Self::Signature => "Sig",
        }
    }

    /// Parse from PDF name.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "Btn" => Some(Self::Button),
            "Tx" => Some(Self::Text),
            "Ch" => Some(Self::Choice),
            "Sig" => Some(Self::Signature),
            _ => None,
        }
    }
}

/// A form field (or a widget merged with one).
#[derive(Clone)]
pub struct Field(Rc<FieldInner>);

struct FieldInner {
    core: Rc<WrapperCore>,
    kids: OnceCell<FieldCollection>,
    triggers: OnceCell<TriggerActions>,
}

impl Field {
    /// New unowned field with partial name `name` and no type.
    pub fn new(name: &str) -> Self {
        let dict = PdfDictionary::new().with("T", Object::text(name));
        Self::from_core(WrapperCore::new(dict, None))
    }

    /// New field of type `field_type`.
    pub fn with_type(name: &str, field_type: FieldType) -> Self {
        let field = Self::new(name);
        field.dict().insert("FT", Object::name(field_type.pdf_name()));
        field
    }

    /// Text field.
    pub fn text(name: &str) -> Self {
        Self::with_type(name, FieldType::Text)
    }

    /// Button field.
    pub fn button(name: &str) -> Self {
        Self::with_type(name, FieldType::Button)
    }

    /// Choice field.
    pub fn choice(name: &str) -> Self {
        Self::with_type(name, FieldType::Choice)
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        Field(Rc::new(FieldInner {
            core,
            kids: OnceCell::new(),
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

    /// Partial name (`T`).
    pub fn name(&self) -> Option<String> {
        self.dict().get_text("T")
    }

    /// Fully qualified name: the partial names of this field and its
    /// ancestors joined by `.`. Ancestors without a partial name are skipped.
    pub fn full_name(&self) -> String {
        qualified_name(self.dict())
    }

    /// Field type, inherited from ancestors when absent.
    pub fn field_type(&self) -> Option<FieldType> {
        inherited(self.dict(), "FT")
            .and_then(|ft| ft.as_name().and_then(FieldType::from_pdf_name))
    }

    /// Field flags (`Ff`), inherited.
    pub fn flags(&self) -> u32 {
        inherited(self.dict(), "Ff")
            .and_then(|f| f.as_integer())
            .unwrap_or(0) as u32
    }

    /// Set the field flags.
    pub fn set_flags(&self, flags: u32) {
        self.dict().insert("Ff", flags);
    }

    /// Value (`V`), inherited.
    pub fn value(&self) -> Option<Object> {
        inherited(self.dict(), "V")
    }

    /// Set the value.
    pub fn set_value(&self, value: impl Into<Object>) {
        self.dict().insert("V", value);
    }

    /// Tooltip / alternate name (`TU`).
    pub fn alternate_name(&self) -> Option<String> {
        self.dict().get_text("TU")
    }

    /// Set the alternate name.
    pub fn set_alternate_name(&self, name: &str) {
        self.dict().insert("TU", Object::text(name));
    }

    /// Parent field, when this field is a kid.
    pub fn parent(&self) -> Option<Field> {
        let parent = self.dict().get_dict("Parent")?;
        Some(Field::wrap(parent, self.current_owner()))
    }

    /// Kid fields and widgets.
    pub fn kids(&self) -> FieldCollection {
        self.0
            .kids
            .get_or_init(|| FieldCollection::load(self.0.core.clone(), FieldHost::Field))
            .clone()
    }

    /// Additional actions (`AA`).
    pub fn triggers(&self) -> TriggerActions {
        self.0
            .triggers
            .get_or_init(|| TriggerActions::load(self.0.core.clone()))
            .clone()
    }

    /// Change the partial name, keeping the session's name index in step.
    ///
    /// Fails with [`Error::DuplicateFieldName`] when a name in the renamed
    /// subtree is already taken; the field is left unchanged then.
    pub fn rename(&self, name: &str) -> Result<()> {
        let registered = self.registered_in();
        let Some(session) = registered else {
            self.dict().insert("T", Object::text(name));
            return Ok(());
        };

        let old_names = named_subtree(self, &parent_prefix(self.dict()));
        let previous = self.dict().insert("T", Object::text(name));
        let new_names = named_subtree(self, &parent_prefix(self.dict()));
        if let Err(e) = check_available(&session, &new_names, false) {
            match previous {
                Some(t) => self.dict().insert("T", t),
                None => self.dict().remove("T"),
            };
            return Err(e);
        }
        for (old, _) in &old_names {
            session.unregister_field(old);
        }
        for (new, field) in new_names {
            session.register_field(new, field)?;
        }
        Ok(())
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &Field) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The session this field is registered in under its full name.
    fn registered_in(&self) -> Option<Rc<Session>> {
        let session = self.current_owner()?.session()?;
        session
            .is_registered(&self.full_name(), self)
            .then_some(session)
    }
}

impl Transfer for Field {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        let kids = self.kids();
        let triggers = self.triggers();
        self.0.core.claim(owner)?;
        pass.mark_attached(self.key());
        remember_wrapper(owner, self.dict(), self);
        triggers.adopt(owner, pass);
        kids.adopt(owner, pass);
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let src = self.dict();
        let core = WrapperCore::new(PdfDictionary::new(), Some(owner.clone()));
        let copy = Field::from_core(core.clone());
        pass.remember_copy(src.key(), &copy);
        let dst = core.dict();

        pass.copier.copy_keys(src, dst, FIELD_KEYS);
        pass.copier.copy_keys(src, dst, WIDGET_KEYS);
        let triggers = self.triggers().transfer_to(core.clone(), owner, pass);
        let _ = copy.0.triggers.set(triggers);

        let items = self.kids().0.list.transfer_items(owner, pass);
        let kids = FieldCollection::with_items(core.clone(), FieldHost::Field, items);
        kids.write();
        let _ = copy.0.kids.set(kids);
        remember_wrapper(owner, dst, &copy);
        copy
    }
}

owned_via_transfer!(Field);

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.full_name())
            .field("type", &self.field_type())
            .field("owner", &self.current_owner())
            .finish()
    }
}

/// Dotted name of `dict` from its own and its ancestors' `T` entries.
fn qualified_name(dict: &PdfDictionary) -> String {
    let mut parts = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(dict.clone());
    while let Some(node) = current {
        if !seen.insert(node.key()) {
            break;
        }
        if let Some(t) = node.get_text("T") {
            parts.push(t);
        }
        current = node.get_dict("Parent");
    }
    parts.reverse();
    parts.join(".")
}

fn parent_prefix(dict: &PdfDictionary) -> String {
    dict.get_dict("Parent")
        .map(|p| qualified_name(&p))
        .unwrap_or_default()
}

/// Fully qualified names of `root` and every named field below it, as
/// they would be with `root` placed under `prefix`.
fn named_subtree(root: &Field, prefix: &str) -> Vec<(String, Field)> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(root.clone(), prefix.to_string())];
    while let Some((field, prefix)) = stack.pop() {
        if !seen.insert(field.key()) {
            continue;
        }
        let name = match field.name() {
            Some(t) if prefix.is_empty() => t,
            Some(t) => format!("{}.{}", prefix, t),
            None => prefix,
        };
        if field.name().is_some() {
            out.push((name.clone(), field.clone()));
        }
        for kid in field.kids().to_vec().into_iter().rev() {
            stack.push((kid, name.clone()));
        }
    }
    out
}

/// Fail if any of `names` collides with another name in the list or with a
/// field already in the index. When `replacing` is set every existing
/// entry counts as a collision, since the incoming fields will be copies.
fn check_available(session: &Session, names: &[(String, Field)], replacing: bool) -> Result<()> {
    let mut batch = HashSet::new();
    for (name, field) in names {
        let taken = if replacing {
            session.field(name).is_some()
        } else {
            session.name_taken(name, field)
        };
        if taken || !batch.insert(name.as_str()) {
            return Err(Error::DuplicateFieldName(name.clone()));
        }
    }
    Ok(())
}

/// Where a field collection lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldHost {
    /// The AcroForm `Fields` array
    Form,
    /// A field's `Kids` array
    Field,
}

impl FieldHost {
    fn array_key(self) -> &'static str {
        match self {
            FieldHost::Form => "Fields",
            FieldHost::Field => "Kids",
        }
    }
}

struct FieldList {
    list: WrapperList<Field>,
    host_kind: FieldHost,
}

/// The AcroForm's top-level fields or a field's kids.
#[derive(Clone)]
pub struct FieldCollection(Rc<FieldList>);

impl FieldCollection {
    pub(crate) fn load(host: Rc<WrapperCore>, host_kind: FieldHost) -> Self {
        let owner = host.owner();
        let items = host
            .dict()
            .get_array_or_empty(host_kind.array_key())
            .to_vec()
            .into_iter()
            .filter_map(|obj| match obj {
                Object::Dictionary(d) => Some(Field::wrap(d, owner.clone())),
                _ => None,
            })
            .collect();
        Self::with_items(host, host_kind, items)
    }

    fn with_items(host: Rc<WrapperCore>, host_kind: FieldHost, items: Vec<Field>) -> Self {
        FieldCollection(Rc::new(FieldList {
            list: WrapperList::new(host, items),
            host_kind,
        }))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.list.len()
    }

    /// True if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field at `index`.
    pub fn get(&self, index: usize) -> Option<Field> {
        self.0.list.get(index)
    }

    /// All fields in order.
    pub fn to_vec(&self) -> Vec<Field> {
        self.0.list.to_vec()
    }

    /// Position of `field`.
    pub fn index_of(&self, field: &Field) -> Option<usize> {
        self.0.list.position(field)
    }

    /// Append a field; returns the field actually stored.
    pub fn push(&self, field: &Field) -> Result<Field> {
        self.insert(self.len(), field)
    }

    /// Insert a field before `index`; returns the field actually stored.
    ///
    /// When the collection belongs to a document's form, every named field
    /// of the inserted subtree is registered under its fully qualified
    /// name. A name that is already taken fails with
    /// [`Error::DuplicateFieldName`] before anything is changed.
    pub fn insert(&self, index: usize, field: &Field) -> Result<Field> {
        let len = self.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let session = self.rooted_session();
        if let Some(session) = &session {
            let names = named_subtree(field, &self.prefix());
            let replacing = field.current_owner().is_some();
            check_available(session, &names, replacing)?;
        }

        let stored = self.0.list.insert(index, field)?;
        self.write();
        if let Some(session) = &session {
            for (name, f) in named_subtree(&stored, &self.prefix()) {
                session.register_field(name, f)?;
            }
        }
        Ok(stored)
    }

    /// Remove the field at `index`, unregistering its subtree.
    pub fn remove_at(&self, index: usize) -> Result<Field> {
        let removed = self.0.list.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        if let Some(session) = self.rooted_session() {
            for (name, _) in named_subtree(&removed, &self.prefix()) {
                session.unregister_field(&name);
            }
        }
        self.0.list.remove_at(index)?;
        removed.dict().remove("Parent");
        self.write();
        Ok(removed)
    }

    /// Register every named field already in this collection's subtree.
    ///
    /// Used once for fields read from a file. A name seen twice keeps the
    /// first field and logs a warning.
    pub(crate) fn register_loaded(&self) {
        let Some(session) = self.rooted_session() else { return };
        let prefix = self.prefix();
        for top in self.to_vec() {
            for (name, field) in named_subtree(&top, &prefix) {
                if session.field(&name).is_some() {
                    if !session.is_registered(&name, &field) {
                        log::warn!("Duplicate field name {} in form, keeping the first", name);
                    }
                    continue;
                }
                if let Err(e) = session.register_field(name, field) {
                    log::warn!("Could not register field: {}", e);
                }
            }
        }
    }

    /// Name prefix of fields hosted here.
    fn prefix(&self) -> String {
        match self.0.host_kind {
            FieldHost::Form => String::new(),
            FieldHost::Field => qualified_name(self.0.list.host().dict()),
        }
    }

    /// The session whose index this collection feeds: the form's own
    /// session, or the session a named host field (or its nearest named
    /// ancestor) is registered in.
    fn rooted_session(&self) -> Option<Rc<Session>> {
        let host = self.0.list.host();
        let session = host.owner()?.session()?;
        if self.0.host_kind == FieldHost::Form {
            return Some(session);
        }
        let mut seen = HashSet::new();
        let mut current = Some(host.dict().clone());
        while let Some(node) = current {
            if !seen.insert(node.key()) {
                break;
            }
            if node.get_text("T").is_some() {
                let registered = session
                    .field(&qualified_name(&node))
                    .is_some_and(|f| f.underlying() == node);
                return registered.then_some(session);
            }
            current = node.get_dict("Parent");
        }
        None
    }

    fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        self.0.list.adopt(owner, pass);
        self.write();
    }

    fn write(&self) {
        let host = self.0.list.host().dict();
        let key = self.0.host_kind.array_key();
        let items = self.0.list.to_vec();
        for item in &items {
            match self.0.host_kind {
                FieldHost::Form => item.dict().remove("Parent"),
                FieldHost::Field => item.dict().insert("Parent", host.clone()),
            };
        }
        if items.is_empty() && self.0.host_kind == FieldHost::Field {
            host.remove(key);
            return;
        }
        let arr: PdfArray = items.iter().map(|f| Object::from(f.underlying())).collect();
        host.insert(key, arr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> (Rc<Session>, Owner, FieldCollection) {
        let session = Session::new();
        let owner = Owner::for_session(&session);
        let host = WrapperCore::new(PdfDictionary::new(), Some(owner.clone()));
        let fields = FieldCollection::load(host, FieldHost::Form);
        (session, owner, fields)
    }

    #[test]
    fn test_full_name_joins_ancestors() {
        let parent = Field::new("address");
        let kid = parent.kids().push(&Field::text("street")).unwrap();
        let widget = kid.kids().push(&Field::from_core(WrapperCore::new(PdfDictionary::new(), None)));
        let widget = widget.unwrap();
        assert_eq!(kid.full_name(), "address.street");
        assert_eq!(widget.full_name(), "address.street");
        assert_eq!(widget.field_type(), Some(FieldType::Text));
        assert_eq!(kid.parent().unwrap().underlying(), parent.underlying());
    }

    #[test]
    fn test_insert_registers_and_remove_unregisters() {
        let (session, owner, fields) = form();
        let parent = Field::new("a");
        parent.kids().push(&Field::text("b")).unwrap();
        let stored = fields.push(&parent).unwrap();
        assert!(stored.ptr_eq(&parent));
        assert_eq!(stored.current_owner(), Some(owner));
        assert_eq!(session.field_names(), vec!["a".to_string(), "a.b".to_string()]);

        // Kids added later under a registered field are registered too.
        stored.kids().push(&Field::text("c")).unwrap();
        assert!(session.field("a.c").is_some());

        fields.remove_at(0).unwrap();
        assert!(session.field_names().is_empty());
        assert!(fields.host_array().is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected_before_mutation() {
        let (session, _owner, fields) = form();
        fields.push(&Field::text("name")).unwrap();
        let result = fields.push(&Field::text("name"));
        assert!(matches!(result, Err(Error::DuplicateFieldName(n)) if n == "name"));
        assert_eq!(fields.len(), 1);
        assert_eq!(session.field_names().len(), 1);
    }

    #[test]
    fn test_reinserting_owned_field_is_a_duplicate() {
        let (_session, _owner, fields) = form();
        let stored = fields.push(&Field::text("x")).unwrap();
        assert!(matches!(fields.push(&stored), Err(Error::DuplicateFieldName(_))));
    }

    #[test]
    fn test_rename_updates_index() {
        let (session, _owner, fields) = form();
        let parent = fields.push(&Field::new("p")).unwrap();
        parent.kids().push(&Field::text("k")).unwrap();
        fields.push(&Field::text("q")).unwrap();

        parent.rename("r").unwrap();
        assert!(session.field("p").is_none());
        assert!(session.field("r.k").is_some());
        assert!(matches!(parent.rename("q"), Err(Error::DuplicateFieldName(_))));
        assert_eq!(parent.name().as_deref(), Some("r"));
    }

    #[test]
    fn test_copy_keeps_field_keys() {
        let a = Owner::detached();
        let b = Owner::detached();
        let field = Field::text("t");
        field.set_value(Object::string("hello"));
        field.underlying().insert("StructParent", 3);
        field.underlying().insert("Rect", crate::object::rect_object([0.0, 0.0, 10.0, 10.0]));
        field.attach(&a).unwrap();
        let copy = field.clone_to(&b);
        assert!(!copy.ptr_eq(&field));
        let dict = copy.underlying();
        assert_eq!(dict.get_text("V").as_deref(), Some("hello"));
        assert!(dict.contains_key("Rect"));
        assert!(!dict.contains_key("StructParent"));
    }

    #[test]
    fn test_loaded_duplicates_keep_first() {
        let session = Session::new();
        let owner = Owner::for_session(&session);
        let first = PdfDictionary::new().with("T", Object::string("dup"));
        let second = PdfDictionary::new().with("T", Object::string("dup"));
        let acro = PdfDictionary::new().with(
            "Fields",
            PdfArray::from_vec(vec![Object::from(first.clone()), Object::from(second)]),
        );
        let fields = FieldCollection::load(WrapperCore::new(acro, Some(owner)), FieldHost::Form);
        fields.register_loaded();
        assert_eq!(session.field("dup").unwrap().underlying(), first);
    }

    impl FieldCollection {
        fn host_array(&self) -> PdfArray {
            self.0.list.host().dict().get_array_or_empty("Fields")
        }
    }
}
