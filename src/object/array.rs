//! Array handle.

use std::cell::RefCell;
use std::rc::Rc;

use super::{NodeHeader, NodeKey, Object, ObjectRef, PdfDictionary, Resolve};
use crate::error::{Error, Result};

/// Shared handle to a PDF array.
#[derive(Clone)]
pub struct PdfArray(Rc<ArrayNode>);

struct ArrayNode {
    header: NodeHeader,
    items: RefCell<Vec<Object>>,
}

impl PdfArray {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create an array holding `items`.
    pub fn from_vec(items: Vec<Object>) -> Self {
        Self::with_header(NodeHeader::new(), items)
    }

    fn with_header(header: NodeHeader, items: Vec<Object>) -> Self {
        PdfArray(Rc::new(ArrayNode {
            header,
            items: RefCell::new(items),
        }))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    /// True if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Element at `index`, resolving an indirect reference through the node's source.
    pub fn get(&self, index: usize) -> Option<Object> {
        self.get_resolved(index, None)
    }

    /// Element at `index`, resolving an indirect reference through `resolver`.
    pub fn get_with(&self, index: usize, resolver: &dyn Resolve) -> Option<Object> {
        self.get_resolved(index, Some(resolver))
    }

    /// Stored element without resolving references.
    pub fn get_raw(&self, index: usize) -> Option<Object> {
        self.0.items.borrow().get(index).cloned()
    }

    fn get_resolved(&self, index: usize, resolver: Option<&dyn Resolve>) -> Option<Object> {
        let current = self.get_raw(index)?;
        let Object::Reference(reference) = current else {
            return Some(current);
        };
        let Some(resolved) = self.0.header.resolve(reference, resolver) else {
            return Some(Object::Null);
        };
        if let Some(slot) = self.0.items.borrow_mut().get_mut(index) {
            if *slot == Object::Reference(reference) {
                *slot = resolved.clone();
            }
        }
        Some(resolved)
    }

    /// Dictionary element at `index`, if it is one.
    pub fn get_dict(&self, index: usize) -> Option<PdfDictionary> {
        match self.get(index)? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Integer or real element at `index`.
    pub fn get_number(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|o| o.as_number())
    }

    /// Append an element.
    pub fn push(&self, value: impl Into<Object>) {
        self.0.items.borrow_mut().push(value.into());
    }

    /// Insert an element before `index`. `index == len()` appends.
    pub fn insert(&self, index: usize, value: impl Into<Object>) -> Result<()> {
        let mut items = self.0.items.borrow_mut();
        if index > items.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        items.insert(index, value.into());
        Ok(())
    }

    /// Remove and return the raw element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Object> {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: items.len(),
            });
        }
        Ok(items.remove(index))
    }

    /// Replace the element at `index`, returning the previous raw value.
    pub fn set(&self, index: usize, value: impl Into<Object>) -> Result<Object> {
        let mut items = self.0.items.borrow_mut();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Remove every element.
    pub fn clear(&self) {
        self.0.items.borrow_mut().clear();
    }

    /// Position of the first element equal to `value` (composites by identity).
    pub fn index_of(&self, value: &Object) -> Option<usize> {
        (0..self.len()).find(|&i| self.get(i).as_ref() == Some(value))
    }

    /// All elements, with references resolved.
    pub fn to_vec(&self) -> Vec<Object> {
        self.resolved_values(None)
    }

    /// All elements as numbers; non-numeric elements are skipped.
    pub fn to_numbers(&self) -> Vec<f64> {
        self.to_vec().iter().filter_map(Object::as_number).collect()
    }

    /// New node with the same elements. Children are shared, not copied.
    pub fn shallow_clone(&self) -> Self {
        Self::with_header(self.0.header.sibling(), self.0.items.borrow().clone())
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
    pub fn ptr_eq(&self, other: &PdfArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn header(&self) -> &NodeHeader {
        &self.0.header
    }

    pub(crate) fn raw_values(&self) -> Vec<Object> {
        self.0.items.borrow().clone()
    }

    pub(crate) fn resolved_values(&self, resolver: Option<&dyn Resolve>) -> Vec<Object> {
        (0..self.len())
            .filter_map(|i| self.get_resolved(i, resolver))
            .collect()
    }

    pub(crate) fn take_values(&self) -> Vec<Object> {
        std::mem::take(&mut *self.0.items.borrow_mut())
    }
}

impl Default for PdfArray {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PdfArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for PdfArray {}

impl std::fmt::Debug for PdfArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfArray")
            .field("node", &self.key().value())
            .field("identity", &self.identity())
            .field("len", &self.len())
            .finish()
    }
}

impl FromIterator<Object> for PdfArray {
    fn from_iter<I: IntoIterator<Item = Object>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove_at() {
        let arr = PdfArray::new();
        arr.push(1);
        arr.push(3);
        arr.insert(1, 2).unwrap();
        assert_eq!(arr.to_numbers(), vec![1.0, 2.0, 3.0]);
        assert_eq!(arr.remove_at(0).unwrap(), Object::Integer(1));
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn test_out_of_range_is_reported() {
        let arr = PdfArray::from_vec(vec![Object::Null]);
        assert!(matches!(
            arr.insert(5, 1),
            Err(Error::IndexOutOfRange { index: 5, len: 1 })
        ));
        assert!(matches!(arr.remove_at(1), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(arr.set(3, 1), Err(Error::IndexOutOfRange { .. })));
        assert_eq!(arr.len(), 1);
    }

    #[test]
    fn test_insert_at_len_appends() {
        let arr = PdfArray::new();
        arr.insert(0, Object::name("A")).unwrap();
        arr.insert(1, Object::name("B")).unwrap();
        assert_eq!(arr.get(1), Some(Object::name("B")));
    }

    #[test]
    fn test_index_of_uses_identity_for_composites() {
        let d = PdfDictionary::new();
        let other = PdfDictionary::new();
        let arr = PdfArray::from_vec(vec![Object::from(other), Object::from(d.clone())]);
        assert_eq!(arr.index_of(&Object::from(d)), Some(1));
        assert_eq!(arr.index_of(&Object::from(PdfDictionary::new())), None);
    }

    #[test]
    fn test_shallow_clone() {
        let child = PdfArray::new();
        let arr = PdfArray::from_vec(vec![Object::from(child.clone())]);
        let copy = arr.shallow_clone();
        copy.push(1);
        assert_eq!(arr.len(), 1);
        assert_eq!(copy.get(0), Some(Object::from(child)));
    }
}
