//! Actions (ISO 32000-1:2008, Section 12.6).
//!
//! An [`Action`] wraps an action dictionary. Actions can chain: the `Next`
//! entry holds one action or an array of them, exposed as an
//! [`ActionCollection`]. Annotations, fields and pages carry additional
//! actions keyed by trigger name in an `AA` dictionary, exposed as
//! [`TriggerActions`].

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::object::{Object, PdfArray, PdfDictionary, PdfString};
use crate::ownership::{
    admit, copy_destination, owned_via_transfer, Owned, Transfer, TransferPass, WrapperCore,
    WrapperList,
};
use crate::session::{remember_wrapper, wrapper_for, Owner};

/// Keys every action carries.
const COMMON_KEYS: &[&str] = &["Type", "S"];

/// Keys copied for each action type, besides [`COMMON_KEYS`].
fn subtype_keys(subtype: &str) -> &'static [&'static str] {
    match subtype {
        "GoTo" => &["D"],
        "GoToR" => &["F", "D", "NewWindow"],
        "GoToE" => &["F", "D", "NewWindow", "T"],
        "Launch" => &["F", "Win", "Mac", "Unix", "NewWindow"],
        "Thread" => &["F", "D", "B"],
        "URI" => &["URI", "IsMap"],
        "Sound" => &["Sound", "Volume", "Synchronous", "Repeat", "Mix"],
        "Movie" => &["Annotation", "T", "Operation"],
        "Hide" => &["T", "H"],
        "Named" => &["N"],
        "SubmitForm" => &["F", "Fields", "Flags"],
        "ResetForm" => &["Fields", "Flags"],
        "ImportData" => &["F"],
        "JavaScript" => &["JS"],
        "SetOCGState" => &["State", "PreserveRB"],
        "Rendition" => &["R", "AN", "OP", "JS"],
        "Trans" => &["Trans"],
        "GoTo3DView" => &["TA", "V"],
        _ => &[],
    }
}

/// Action types whose `D` entry is a destination.
fn has_destination(subtype: &str) -> bool {
    matches!(subtype, "GoTo" | "GoToR" | "GoToE")
}

/// An action dictionary.
#[derive(Clone)]
pub struct Action(Rc<ActionInner>);

struct ActionInner {
    core: Rc<WrapperCore>,
    next: OnceCell<ActionCollection>,
}

impl Action {
    /// New unowned action of the given type (`S`).
    pub fn new(subtype: &str) -> Self {
        let dict = PdfDictionary::with_type("Action").with("S", Object::name(subtype));
        Self::from_core(WrapperCore::new(dict, None))
    }

    /// URI action.
    pub fn uri(uri: &str) -> Self {
        let action = Self::new("URI");
        action.underlying().insert("URI", Object::string(uri));
        action
    }

    /// GoTo action to `destination` (a name, string or explicit array).
    pub fn goto(destination: impl Into<Object>) -> Self {
        let action = Self::new("GoTo");
        action.underlying().insert("D", destination);
        action
    }

    /// Named action (`NextPage`, `PrevPage`, `FirstPage`, `LastPage`).
    pub fn named(name: &str) -> Self {
        let action = Self::new("Named");
        action.underlying().insert("N", Object::name(name));
        action
    }

    /// JavaScript action.
    pub fn javascript(script: &str) -> Self {
        let action = Self::new("JavaScript");
        action.underlying().insert("JS", Object::string(script));
        action
    }

    pub(crate) fn from_core(core: Rc<WrapperCore>) -> Self {
        Action(Rc::new(ActionInner {
            core,
            next: OnceCell::new(),
        }))
    }

    /// Wrapper for an existing action dictionary.
    pub(crate) fn wrap(dict: PdfDictionary, owner: Option<Owner>) -> Self {
        wrapper_for(&dict, owner.as_ref(), || {
            Self::from_core(WrapperCore::new(dict.clone(), owner.clone()))
        })
    }

    /// Action type (`S`).
    pub fn subtype(&self) -> Option<String> {
        self.0.core.dict().get_name("S")
    }

    /// Destination (`D`) of a GoTo-style action.
    pub fn destination(&self) -> Option<Object> {
        self.0.core.dict().get("D")
    }

    /// Target of a URI action.
    pub fn target_uri(&self) -> Option<String> {
        self.0.core.dict().get_text("URI")
    }

    /// Actions performed after this one.
    pub fn next(&self) -> ActionCollection {
        self.0
            .next
            .get_or_init(|| ActionCollection::load(self.0.core.clone()))
            .clone()
    }

    /// True if both handles refer to the same wrapper.
    pub fn ptr_eq(&self, other: &Action) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Transfer for Action {
    fn core(&self) -> &Rc<WrapperCore> {
        &self.0.core
    }

    fn attach_in(&self, owner: &Owner, pass: &mut TransferPass) -> Result<()> {
        let next = self.next();
        self.0.core.claim(owner)?;
        pass.mark_attached(self.0.core.dict().key());
        remember_wrapper(owner, self.0.core.dict(), self);
        next.adopt(owner, pass);
        Ok(())
    }

    fn copy_in(&self, owner: &Owner, pass: &mut TransferPass) -> Self {
        let src = self.0.core.dict();
        let copy = Self::from_core(WrapperCore::new(PdfDictionary::new(), Some(owner.clone())));
        pass.remember_copy(src.key(), &copy);
        let dst = copy.underlying();

        let subtype = self.subtype().unwrap_or_default();
        let same_owner = self.current_owner().as_ref() == Some(owner);
        pass.copier.copy_keys(src, &dst, COMMON_KEYS);
        for key in subtype_keys(&subtype) {
            if *key == "D" && has_destination(&subtype) {
                if let Some(dest) = src.get("D") {
                    if let Some(copied) = copy_destination(&dest, same_owner, &mut pass.copier) {
                        dst.insert("D", copied);
                    }
                }
            } else {
                pass.copier.copy_keys(src, &dst, &[*key]);
            }
        }

        let chain = self.next().0.transfer_items(owner, pass);
        let next = ActionCollection::with_items(copy.0.core.clone(), chain);
        next.write();
        let _ = copy.0.next.set(next);
        remember_wrapper(owner, &dst, &copy);
        copy
    }
}

owned_via_transfer!(Action);

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("subtype", &self.subtype())
            .field("owner", &self.current_owner())
            .finish()
    }
}

/// The `Next` chain of an action.
///
/// Written back as absent (no actions), a single dictionary, or an array.
#[derive(Clone)]
pub struct ActionCollection(Rc<WrapperList<Action>>);

impl ActionCollection {
    fn load(host: Rc<WrapperCore>) -> Self {
        let owner = host.owner();
        let items = match host.dict().get("Next") {
            Some(Object::Dictionary(d)) => vec![Action::wrap(d, owner)],
            Some(Object::Array(arr)) => arr
                .to_vec()
                .into_iter()
                .filter_map(|obj| match obj {
                    Object::Dictionary(d) => Some(Action::wrap(d, owner.clone())),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Self::with_items(host, items)
    }

    fn with_items(host: Rc<WrapperCore>, items: Vec<Action>) -> Self {
        ActionCollection(Rc::new(WrapperList::new(host, items)))
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no actions.
    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    /// Action at `index`.
    pub fn get(&self, index: usize) -> Option<Action> {
        self.0.get(index)
    }

    /// All actions in order.
    pub fn to_vec(&self) -> Vec<Action> {
        self.0.to_vec()
    }

    /// Append an action; returns the action actually stored.
    pub fn push(&self, action: &Action) -> Result<Action> {
        self.insert(self.len(), action)
    }

    /// Insert an action before `index`; returns the action actually stored.
    pub fn insert(&self, index: usize, action: &Action) -> Result<Action> {
        let stored = self.0.insert(index, action)?;
        self.write();
        Ok(stored)
    }

    /// Remove the action at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Action> {
        let removed = self.0.remove_at(index)?;
        self.write();
        Ok(removed)
    }

    /// Remove every action.
    pub fn clear(&self) {
        self.0.clear();
        self.write();
    }

    fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        self.0.adopt(owner, pass);
        self.write();
    }

    fn write(&self) {
        let host = self.0.host().dict();
        let items = self.0.to_vec();
        match items.as_slice() {
            [] => {
                host.remove("Next");
            },
            [single] => {
                host.insert("Next", single.underlying());
            },
            many => {
                let arr: PdfArray = many.iter().map(|a| Object::from(a.underlying())).collect();
                host.insert("Next", arr);
            },
        }
    }
}

/// Additional actions (`AA`) keyed by trigger name.
#[derive(Clone)]
pub struct TriggerActions(Rc<TriggerState>);

struct TriggerState {
    host: Rc<WrapperCore>,
    actions: RefCell<IndexMap<String, Action>>,
}

impl TriggerActions {
    pub(crate) fn load(host: Rc<WrapperCore>) -> Self {
        let owner = host.owner();
        let mut actions = IndexMap::new();
        if let Some(aa) = host.dict().get_dict("AA") {
            for trigger in aa.keys() {
                if let Some(dict) = aa.get_dict(&trigger) {
                    actions.insert(trigger, Action::wrap(dict, owner.clone()));
                }
            }
        }
        Self::with_actions(host, actions)
    }

    fn with_actions(host: Rc<WrapperCore>, actions: IndexMap<String, Action>) -> Self {
        TriggerActions(Rc::new(TriggerState {
            host,
            actions: RefCell::new(actions),
        }))
    }

    /// Action for `trigger` (e.g. `E`, `X`, `K`, `O`).
    pub fn get(&self, trigger: &str) -> Option<Action> {
        self.0.actions.borrow().get(trigger).cloned()
    }

    /// Set the action for `trigger`; returns the action actually stored.
    pub fn set(&self, trigger: &str, action: &Action) -> Action {
        let stored = admit(&self.0.host, action);
        self.0
            .actions
            .borrow_mut()
            .insert(trigger.to_string(), stored.clone());
        self.write();
        stored
    }

    /// Remove the action for `trigger`.
    pub fn remove(&self, trigger: &str) -> Option<Action> {
        let removed = self.0.actions.borrow_mut().shift_remove(trigger);
        self.write();
        removed
    }

    /// Trigger names in order.
    pub fn triggers(&self) -> Vec<String> {
        self.0.actions.borrow().keys().cloned().collect()
    }

    /// Number of triggers.
    pub fn len(&self) -> usize {
        self.0.actions.borrow().len()
    }

    /// True if no trigger is set.
    pub fn is_empty(&self) -> bool {
        self.0.actions.borrow().is_empty()
    }

    pub(crate) fn adopt(&self, owner: &Owner, pass: &mut TransferPass) {
        let current = self.0.actions.borrow().clone();
        let adopted = current
            .into_iter()
            .map(|(k, a)| (k, a.clone_in(owner, pass)))
            .collect();
        *self.0.actions.borrow_mut() = adopted;
        self.write();
    }

    /// Triggers for a copy of the host, hosted on `host`.
    pub(crate) fn transfer_to(
        &self,
        host: Rc<WrapperCore>,
        owner: &Owner,
        pass: &mut TransferPass,
    ) -> TriggerActions {
        let current = self.0.actions.borrow().clone();
        let actions = current
            .into_iter()
            .map(|(k, a)| (k, a.clone_in(owner, pass)))
            .collect();
        let copy = Self::with_actions(host, actions);
        copy.write();
        copy
    }

    fn write(&self) {
        let host = self.0.host.dict();
        let actions = self.0.actions.borrow();
        if actions.is_empty() {
            host.remove("AA");
            return;
        }
        let aa = host.get_or_insert_dict("AA");
        for stale in aa.keys() {
            if !actions.contains_key(&stale) {
                aa.remove(&stale);
            }
        }
        for (trigger, action) in actions.iter() {
            aa.insert(trigger.clone(), action.underlying());
        }
    }
}

/// `JS` entry as text, for JavaScript actions.
pub fn script_text(action: &Action) -> Option<String> {
    match action.underlying().get("JS")? {
        Object::String(s) => Some(s.to_text()),
        Object::Stream(s) => Some(PdfString::literal(s.data()).to_text()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_next_written_as_single_then_array() {
        let first = Action::uri("https://example.com");
        let chain = first.next();
        chain.push(&Action::named("NextPage")).unwrap();
        assert!(first.underlying().get_dict("Next").is_some());
        chain.push(&Action::javascript("app.alert(1)")).unwrap();
        assert_eq!(first.underlying().get_array("Next").unwrap().len(), 2);
        chain.clear();
        assert!(!first.underlying().contains_key("Next"));
    }

    #[test]
    fn test_loaded_chain() {
        let second = PdfDictionary::with_type("Action").with("S", Object::name("Named"));
        let dict = PdfDictionary::with_type("Action")
            .with("S", Object::name("URI"))
            .with("Next", second.clone());
        let action = Action::wrap(dict, None);
        assert_eq!(action.next().len(), 1);
        assert_eq!(action.next().get(0).unwrap().underlying(), second);
    }

    #[test]
    fn test_attach_owns_chain() {
        let owner = Owner::detached();
        let head = Action::uri("a");
        let tail = Action::named("LastPage");
        head.next().push(&tail).unwrap();
        head.attach(&owner).unwrap();
        assert_eq!(tail.current_owner(), Some(owner.clone()));
        assert!(matches!(head.attach(&owner), Err(Error::AlreadyOwned)));
    }

    #[test]
    fn test_copy_keeps_allowed_keys_only() {
        let owner_a = Owner::detached();
        let owner_b = Owner::detached();
        let action = Action::uri("https://example.com");
        action.underlying().insert("Junk", 1);
        action.attach(&owner_a).unwrap();

        let copy = action.clone_to(&owner_b);
        assert!(!copy.ptr_eq(&action));
        assert_eq!(copy.target_uri().as_deref(), Some("https://example.com"));
        assert!(!copy.underlying().contains_key("Junk"));
        assert_eq!(copy.current_owner(), Some(owner_b));
        assert_eq!(action.current_owner(), Some(owner_a));
    }

    #[test]
    fn test_cyclic_chain_copies_into_cycle() {
        let owner_a = Owner::detached();
        let a = Action::named("NextPage");
        let b = Action::named("PrevPage");
        a.next().push(&b).unwrap();
        b.next().push(&a).unwrap();
        a.attach(&owner_a).unwrap();
        assert_eq!(b.current_owner(), Some(owner_a.clone()));

        let copy = a.copy(&Owner::detached());
        let copied_b = copy.next().get(0).unwrap();
        let back = copied_b.next().get(0).unwrap();
        assert!(back.ptr_eq(&copy));
        assert!(!copied_b.ptr_eq(&b));
    }

    #[test]
    fn test_goto_destination_dropped_across_owners() {
        let page = PdfDictionary::with_type("Page");
        let owner_a = Owner::detached();
        let action = Action::goto(vec![Object::from(page), Object::name("Fit")]);
        action.attach(&owner_a).unwrap();
        let copy = action.copy(&Owner::detached());
        assert!(copy.destination().is_none());
        let same = action.copy(&owner_a);
        assert!(same.destination().is_some());
    }

    #[test]
    fn test_trigger_actions() {
        let host = WrapperCore::new(PdfDictionary::new(), None);
        let triggers = TriggerActions::load(host.clone());
        triggers.set("E", &Action::javascript("enter()"));
        triggers.set("X", &Action::javascript("exit()"));
        assert_eq!(triggers.triggers(), vec!["E", "X"]);
        let aa = host.dict().get_dict("AA").unwrap();
        assert_eq!(aa.len(), 2);
        triggers.remove("E");
        assert_eq!(aa.keys(), vec!["X"]);
        triggers.remove("X");
        assert!(!host.dict().contains_key("AA"));
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_script_text() {
        assert_eq!(
            script_text(&Action::javascript("go()")).as_deref(),
            Some("go()")
        );
    }
}
