//! Insertion-ordered dictionary handle.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{NodeHeader, NodeKey, Object, ObjectRef, PdfArray, PdfStream, PdfString, Resolve};

/// Shared handle to a PDF dictionary.
///
/// Keys keep insertion order. Replacing the value of an existing key keeps
/// its position; removing a key keeps the order of the rest.
#[derive(Clone)]
pub struct PdfDictionary(Rc<DictNode>);

struct DictNode {
    header: NodeHeader,
    entries: RefCell<IndexMap<String, Object>>,
}

impl PdfDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::from_map(NodeHeader::new(), IndexMap::new())
    }

    /// Create a dictionary with `/Type /<type_name>`.
    pub fn with_type(type_name: &str) -> Self {
        let dict = Self::new();
        dict.insert("Type", Object::name(type_name));
        dict
    }

    fn from_map(header: NodeHeader, entries: IndexMap<String, Object>) -> Self {
        PdfDictionary(Rc::new(DictNode {
            header,
            entries: RefCell::new(entries),
        }))
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<Object>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, returning the previous raw value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Object>) -> Option<Object> {
        self.0.entries.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove a key, returning its raw value.
    pub fn remove(&self, key: &str) -> Option<Object> {
        self.0.entries.borrow_mut().shift_remove(key)
    }

    /// Get a value, resolving an indirect reference through the node's source.
    pub fn get(&self, key: &str) -> Option<Object> {
        self.get_resolved(key, None)
    }

    /// Get a value, resolving an indirect reference through `resolver`.
    pub fn get_with(&self, key: &str, resolver: &dyn Resolve) -> Option<Object> {
        self.get_resolved(key, Some(resolver))
    }

    /// Get the stored value without resolving references.
    pub fn get_raw(&self, key: &str) -> Option<Object> {
        self.0.entries.borrow().get(key).cloned()
    }

    fn get_resolved(&self, key: &str, resolver: Option<&dyn Resolve>) -> Option<Object> {
        let current = self.get_raw(key)?;
        let Object::Reference(reference) = current else {
            return Some(current);
        };
        let Some(resolved) = self.0.header.resolve(reference, resolver) else {
            return Some(Object::Null);
        };
        // The borrow is released while resolving; only replace the slot if it
        // still holds the reference we looked up.
        if let Some(slot) = self.0.entries.borrow_mut().get_mut(key) {
            if *slot == Object::Reference(reference) {
                *slot = resolved.clone();
            }
        }
        Some(resolved)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.entries.borrow().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.entries.borrow().keys().cloned().collect()
    }

    /// Raw `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, Object)> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    /// True if the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.entries.borrow().is_empty()
    }

    /// New node with the same entries. Children are shared, not copied.
    pub fn shallow_clone(&self) -> Self {
        Self::from_map(self.0.header.sibling(), self.0.entries.borrow().clone())
    }

    /// Integer value, if present.
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|o| o.as_integer())
    }

    /// Integer value or `default`.
    pub fn get_integer_or(&self, key: &str, default: i64) -> i64 {
        self.get_integer(key).unwrap_or(default)
    }

    /// Integer or real value as `f64`.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|o| o.as_number())
    }

    /// Number value or `default`.
    pub fn get_number_or(&self, key: &str, default: f64) -> f64 {
        self.get_number(key).unwrap_or(default)
    }

    /// Boolean value, if present.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|o| o.as_bool())
    }

    /// Boolean value or `default`.
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Name value, if present.
    pub fn get_name(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|o| o.as_name().map(str::to_string))
    }

    /// True if `key` holds the name `expected`.
    pub fn has_name(&self, key: &str, expected: &str) -> bool {
        self.get(key).is_some_and(|o| o.as_name() == Some(expected))
    }

    /// String value, if present.
    pub fn get_string(&self, key: &str) -> Option<PdfString> {
        self.get(key).and_then(|o| o.as_string().cloned())
    }

    /// String value decoded as text, if present.
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get_string(key).map(|s| s.to_text())
    }

    /// Dictionary value, if present. A stream's dictionary is not returned.
    pub fn get_dict(&self, key: &str) -> Option<PdfDictionary> {
        match self.get(key)? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Array value, if present.
    pub fn get_array(&self, key: &str) -> Option<PdfArray> {
        match self.get(key)? {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Array value, or an empty array when missing or of another type.
    pub fn get_array_or_empty(&self, key: &str) -> PdfArray {
        self.get_array(key).unwrap_or_default()
    }

    /// Stream value, if present.
    pub fn get_stream(&self, key: &str) -> Option<PdfStream> {
        match self.get(key)? {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Dictionary stored under `key`, inserting an empty one when missing.
    pub fn get_or_insert_dict(&self, key: &str) -> PdfDictionary {
        if let Some(existing) = self.get_dict(key) {
            return existing;
        }
        let dict = PdfDictionary::new();
        self.insert(key, dict.clone());
        dict
    }

    /// Process-unique node key.
    pub fn key(&self) -> NodeKey {
        self.0.header.key()
    }

    /// Identity assigned by a save pass or by loading.
    pub fn identity(&self) -> Option<ObjectRef> {
        self.0.header.identity()
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &PdfDictionary) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn header(&self) -> &NodeHeader {
        &self.0.header
    }

    pub(crate) fn raw_values(&self) -> Vec<Object> {
        self.0.entries.borrow().values().cloned().collect()
    }

    pub(crate) fn resolved_values(&self, resolver: Option<&dyn Resolve>) -> Vec<Object> {
        self.keys()
            .iter()
            .filter_map(|k| self.get_resolved(k, resolver))
            .collect()
    }

    pub(crate) fn take_values(&self) -> Vec<Object> {
        let taken = std::mem::take(&mut *self.0.entries.borrow_mut());
        taken.into_values().collect()
    }
}

impl Default for PdfDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PdfDictionary {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for PdfDictionary {}

impl std::fmt::Debug for PdfDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDictionary")
            .field("node", &self.key().value())
            .field("identity", &self.identity())
            .field("keys", &self.keys())
            .finish()
    }
}

impl<K: Into<String>> FromIterator<(K, Object)> for PdfDictionary {
    fn from_iter<I: IntoIterator<Item = (K, Object)>>(iter: I) -> Self {
        let map = iter.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::from_map(NodeHeader::new(), map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_appends_and_replace_keeps_position() {
        let dict = PdfDictionary::new();
        dict.insert("A", 1);
        dict.insert("B", 2);
        dict.insert("C", 3);
        let previous = dict.insert("A", 10);
        assert_eq!(previous, Some(Object::Integer(1)));
        assert_eq!(dict.keys(), vec!["A", "B", "C"]);
        assert_eq!(dict.get_integer("A"), Some(10));
    }

    #[test]
    fn test_remove_keeps_order() {
        let dict: PdfDictionary = vec![
            ("A", Object::Integer(1)),
            ("B", Object::Integer(2)),
            ("C", Object::Integer(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(dict.remove("B"), Some(Object::Integer(2)));
        assert_eq!(dict.keys(), vec!["A", "C"]);
        assert_eq!(dict.remove("missing"), None);
    }

    #[test]
    fn test_typed_getters_default_on_wrong_type() {
        let dict = PdfDictionary::new()
            .with("Count", Object::name("NotANumber"))
            .with("Kids", 5);
        assert_eq!(dict.get_integer_or("Count", 0), 0);
        assert!(dict.get_array_or_empty("Kids").is_empty());
        assert_eq!(dict.get_name("Missing"), None);
        assert!(!dict.get_bool_or("Open", false));
    }

    #[test]
    fn test_shallow_clone_shares_children() {
        let child = PdfDictionary::new();
        let dict = PdfDictionary::new().with("Child", child.clone()).with("N", 1);
        let copy = dict.shallow_clone();
        assert_ne!(copy, dict);
        assert_eq!(copy.get_dict("Child").unwrap(), child);
        copy.insert("N", 2);
        assert_eq!(dict.get_integer("N"), Some(1));
        assert_eq!(copy.identity(), None);
    }

    #[test]
    fn test_get_or_insert_dict() {
        let dict = PdfDictionary::new();
        let aa = dict.get_or_insert_dict("AA");
        assert_eq!(dict.get_or_insert_dict("AA"), aa);
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn test_has_name() {
        let dict = PdfDictionary::with_type("Page");
        assert!(dict.has_name("Type", "Page"));
        assert!(!dict.has_name("Type", "Pages"));
    }
}
