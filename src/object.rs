//! PDF object types.
//!
//! Leaves (null, booleans, numbers, names, strings) are plain values.
//! Arrays, dictionaries and streams are shared handles: cloning a handle
//! aliases the same node, and two handles compare equal only when they
//! point at the same node.
//!
//! A container slot may hold an indirect reference. Reading such a slot
//! resolves it through the node's source table (or an explicit resolver)
//! and stores the result back in the slot, so later reads return the same
//! node without another lookup.

mod array;
mod dictionary;
mod stream;

pub use array::PdfArray;
pub use dictionary::PdfDictionary;
pub use stream::PdfStream;

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

/// PDF object representation.
#[derive(Debug, Clone)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// Name (starting with /), stored without the slash
    Name(String),
    /// String (byte array plus its preferred on-disk form)
    String(PdfString),
    /// Array of objects
    Array(PdfArray),
    /// Dictionary (key-value pairs)
    Dictionary(PdfDictionary),
    /// Stream (dictionary + data)
    Stream(PdfStream),
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// A PDF string: raw bytes plus whether it was (or should be) written in
/// hexadecimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfString {
    /// Raw string bytes
    pub bytes: Vec<u8>,
    /// Written as `<...>` when true, `(...)` otherwise
    pub hex: bool,
}

impl PdfString {
    /// Literal string.
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    /// Hexadecimal string.
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    /// Text string: ASCII text as-is, anything else as UTF-16BE with a BOM.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            return Self::literal(text);
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self::literal(bytes)
    }

    /// Lossy text view of the bytes. UTF-16BE strings (with BOM) are decoded.
    pub fn to_text(&self) -> String {
        if self.bytes.len() >= 2 && self.bytes[0] == 0xFE && self.bytes[1] == 0xFF {
            let units: Vec<u16> = self.bytes[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Process-unique key of a composite node.
///
/// Side tables (wrapper cache, deep-copy memo, collect index) are keyed by
/// it instead of storing anything extra on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

static NEXT_NODE_KEY: AtomicU64 = AtomicU64::new(1);

impl NodeKey {
    fn next() -> Self {
        NodeKey(NEXT_NODE_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Maps indirect references to objects.
///
/// Implemented by the lazy object table of a loaded document and by the
/// per-save [`ReferenceTable`](crate::reference_table::ReferenceTable).
pub trait Resolve {
    /// Resolve a reference. Unknown references yield [`Object::Null`].
    fn resolve(&self, reference: ObjectRef) -> Object;
}

/// Resolver that knows no objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl Resolve for NullResolver {
    fn resolve(&self, _reference: ObjectRef) -> Object {
        Object::Null
    }
}

/// Bookkeeping shared by every composite node.
pub(crate) struct NodeHeader {
    key: NodeKey,
    identity: Cell<Option<ObjectRef>>,
    source: RefCell<Option<Weak<dyn Resolve>>>,
}

impl NodeHeader {
    pub(crate) fn new() -> Self {
        Self {
            key: NodeKey::next(),
            identity: Cell::new(None),
            source: RefCell::new(None),
        }
    }

    /// Fresh header (new key, no identity) that resolves through the same source.
    pub(crate) fn sibling(&self) -> Self {
        let header = Self::new();
        *header.source.borrow_mut() = self.source.borrow().clone();
        header
    }

    pub(crate) fn key(&self) -> NodeKey {
        self.key
    }

    pub(crate) fn identity(&self) -> Option<ObjectRef> {
        self.identity.get()
    }

    /// Assign an identity unless one is already present.
    pub(crate) fn assign_identity(&self, reference: ObjectRef) -> bool {
        if self.identity.get().is_some() {
            return false;
        }
        self.identity.set(Some(reference));
        true
    }

    pub(crate) fn set_source(&self, source: Weak<dyn Resolve>) {
        *self.source.borrow_mut() = Some(source);
    }

    /// Resolve `reference` through `resolver`, or this node's source when no
    /// resolver is given. Returns `None` when nothing could be asked.
    pub(crate) fn resolve(
        &self,
        reference: ObjectRef,
        resolver: Option<&dyn Resolve>,
    ) -> Option<Object> {
        let resolved = match resolver {
            Some(resolver) => resolver.resolve(reference),
            None => {
                let source = self.source.borrow().as_ref().and_then(Weak::upgrade)?;
                source.resolve(reference)
            },
        };
        Some(match resolved {
            Object::Reference(chained) => {
                log::debug!("Reference {} resolved to another reference {}", reference, chained);
                Object::Null
            },
            Object::Null => {
                log::debug!("Reference {} is dangling, substituting null", reference);
                Object::Null
            },
            other => other,
        })
    }
}

impl Object {
    /// Name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(PdfString::literal(bytes))
    }

    /// Text string object (see [`PdfString::from_text`]).
    pub fn text(text: &str) -> Self {
        Object::String(PdfString::from_text(text))
    }

    /// Hexadecimal string object.
    pub fn hex_string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(PdfString::hex(bytes))
    }

    /// Integer object.
    pub fn integer(value: i64) -> Self {
        Object::Integer(value)
    }

    /// Real object.
    pub fn real(value: f64) -> Self {
        Object::Real(value)
    }

    /// Boolean object.
    pub fn boolean(value: bool) -> Self {
        Object::Boolean(value)
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Integer or real, as `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to string.
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    /// Try to cast to stream.
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// True for arrays, dictionaries and streams.
    pub fn is_composite(&self) -> bool {
        matches!(self, Object::Array(_) | Object::Dictionary(_) | Object::Stream(_))
    }

    /// Node key of a composite object.
    pub fn node_key(&self) -> Option<NodeKey> {
        self.header().map(NodeHeader::key)
    }

    /// Identity of a composite object, if one has been assigned.
    pub fn identity(&self) -> Option<ObjectRef> {
        self.header().and_then(NodeHeader::identity)
    }

    pub(crate) fn header(&self) -> Option<&NodeHeader> {
        match self {
            Object::Array(a) => Some(a.header()),
            Object::Dictionary(d) => Some(d.header()),
            Object::Stream(s) => Some(s.header()),
            _ => None,
        }
    }

    /// Child values of a composite, with reference slots resolved (and the
    /// result stored back). A stream's children are its dictionary values.
    pub(crate) fn resolved_children(&self, resolver: Option<&dyn Resolve>) -> Vec<Object> {
        match self {
            Object::Array(a) => a.resolved_values(resolver),
            Object::Dictionary(d) => d.resolved_values(resolver),
            Object::Stream(s) => s.dict().resolved_values(resolver),
            _ => Vec::new(),
        }
    }
}

impl PartialEq for Object {
    /// Leaves compare by value; composites compare by node identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Object::Null, Object::Null) => true,
            (Object::Boolean(a), Object::Boolean(b)) => a == b,
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Real(a), Object::Real(b)) => a == b,
            (Object::Name(a), Object::Name(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => a == b,
            (Object::Dictionary(a), Object::Dictionary(b)) => a == b,
            (Object::Stream(a), Object::Stream(b)) => a == b,
            (Object::Reference(a), Object::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<PdfString> for Object {
    fn from(value: PdfString) -> Self {
        Object::String(value)
    }
}

impl From<PdfArray> for Object {
    fn from(value: PdfArray) -> Self {
        Object::Array(value)
    }
}

impl From<PdfDictionary> for Object {
    fn from(value: PdfDictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<PdfStream> for Object {
    fn from(value: PdfStream) -> Self {
        Object::Stream(value)
    }
}

impl From<ObjectRef> for Object {
    fn from(value: ObjectRef) -> Self {
        Object::Reference(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(PdfArray::from_vec(value))
    }
}

/// Rectangle helper: `[llx lly urx ury]` as an array object.
pub fn rect_object(rect: [f64; 4]) -> Object {
    Object::from(rect.iter().map(|v| number_object(*v)).collect::<Vec<_>>())
}

/// Integer object when `value` has no fractional part, real otherwise.
pub fn number_object(value: f64) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}

/// Record `source` on every composite reachable from `root` through direct
/// (non-reference) slots. Used by the object table after parsing.
pub(crate) fn attach_source(root: &Object, source: &Weak<dyn Resolve>) {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(obj) = queue.pop_front() {
        let Some(header) = obj.header() else { continue };
        if !seen.insert(header.key()) {
            continue;
        }
        header.set_source(source.clone());
        match &obj {
            Object::Array(a) => queue.extend(a.raw_values()),
            Object::Dictionary(d) => queue.extend(d.raw_values()),
            Object::Stream(s) => {
                s.dict().header().set_source(source.clone());
                queue.extend(s.dict().raw_values());
            },
            _ => {},
        }
    }
}

/// Empty every container reachable from `roots` through direct slots.
///
/// Graphs with Parent/Kids back-edges form `Rc` cycles; clearing the
/// containers breaks them so the nodes can be freed.
pub(crate) fn sever_graph(roots: &[Object]) {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<Object> = roots.iter().cloned().collect();
    while let Some(obj) = queue.pop_front() {
        let Some(key) = obj.node_key() else { continue };
        if !seen.insert(key) {
            continue;
        }
        match &obj {
            Object::Array(a) => queue.extend(a.take_values()),
            Object::Dictionary(d) => queue.extend(d.take_values()),
            Object::Stream(s) => {
                queue.extend(s.dict().take_values());
                s.set_data(Vec::new());
            },
            _ => {},
        }
    }
}
