//! Identity assignment and lookup for a save pass.
//!
//! [`ReferenceTable::collect`] walks the graph reachable from a set of roots
//! breadth-first. Each composite is given an identity (if it has none yet)
//! and recorded in the table *before* its children are queued, so a
//! back-edge (Parent, Prev, a Kids ring) reaches a node that is already in
//! the table and stops there. The walk visits every distinct node once and
//! every edge once.

use std::collections::{HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::object::{NodeKey, Object, ObjectRef, Resolve};

/// Hands out object numbers that are not yet in use.
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    next: u32,
}

impl IdentityAllocator {
    /// Allocator whose first number is `first` (at least 1).
    pub fn starting_at(first: u32) -> Self {
        Self { next: first.max(1) }
    }

    /// Next identity, generation 0.
    ///
    /// Fails once the 32-bit number space is used up.
    pub fn allocate(&mut self) -> Result<ObjectRef> {
        let id = self.next;
        self.next = id
            .checked_add(1)
            .ok_or_else(|| Error::InvalidPdf("object numbers exhausted".to_string()))?;
        Ok(ObjectRef::new(id, 0))
    }

    /// Make sure future numbers are greater than `reference.id`.
    pub fn observe(&mut self, reference: ObjectRef) {
        if reference.id >= self.next {
            self.next = reference.id.saturating_add(1);
        }
    }

    /// Number the next allocation will return.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// One collected composite.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    /// Identity of the node.
    pub reference: ObjectRef,
    /// The node itself.
    pub object: Object,
    /// Number of container slots (within the collected graph) that hold it.
    pub incoming: usize,
    /// True if the node was passed in as a root.
    pub root: bool,
}

/// Table built by one collect pass.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
    by_node: HashMap<NodeKey, usize>,
    by_number: HashMap<u32, usize>,
}

impl ReferenceTable {
    /// Collect every composite reachable from `roots`, resolving reference
    /// slots through each node's own source.
    pub fn collect(roots: &[Object], allocator: &mut IdentityAllocator) -> Result<Self> {
        Self::collect_inner(roots, allocator, None)
    }

    /// Collect, resolving reference slots (and reference roots) through `resolver`.
    pub fn collect_with(
        roots: &[Object],
        allocator: &mut IdentityAllocator,
        resolver: &dyn Resolve,
    ) -> Result<Self> {
        Self::collect_inner(roots, allocator, Some(resolver))
    }

    fn collect_inner(
        roots: &[Object],
        allocator: &mut IdentityAllocator,
        resolver: Option<&dyn Resolve>,
    ) -> Result<Self> {
        let mut table = ReferenceTable::default();
        let mut queue = VecDeque::new();

        for root in roots {
            let root = match root {
                Object::Reference(r) => resolver.map(|res| res.resolve(*r)).unwrap_or(Object::Null),
                other => other.clone(),
            };
            if !root.is_composite() {
                continue;
            }
            match table.index_of(&root) {
                Some(index) => table.entries[index].root = true,
                None => {
                    table.admit(&root, allocator, true)?;
                    queue.push_back(root);
                },
            }
        }

        while let Some(node) = queue.pop_front() {
            for child in node.resolved_children(resolver) {
                if !child.is_composite() {
                    continue;
                }
                match table.index_of(&child) {
                    Some(index) => table.entries[index].incoming += 1,
                    None => {
                        table.admit(&child, allocator, false)?;
                        queue.push_back(child);
                    },
                }
            }
        }

        log::debug!("Collected {} objects", table.entries.len());
        Ok(table)
    }

    fn admit(
        &mut self,
        node: &Object,
        allocator: &mut IdentityAllocator,
        root: bool,
    ) -> Result<()> {
        let Some(header) = node.header() else {
            return Ok(());
        };
        let reference = match header.identity() {
            Some(existing) => {
                allocator.observe(existing);
                existing
            },
            None => {
                let fresh = allocator.allocate()?;
                header.assign_identity(fresh);
                fresh
            },
        };
        if self.by_number.contains_key(&reference.id) {
            // Two nodes claim one number: a node was moved between documents
            // without going through clone_to.
            return Err(Error::InvalidPdf(format!(
                "object number {} is claimed by two different nodes",
                reference.id
            )));
        }
        let index = self.entries.len();
        self.by_node.insert(header.key(), index);
        self.by_number.insert(reference.id, index);
        self.entries.push(ReferenceEntry {
            reference,
            object: node.clone(),
            incoming: if root { 0 } else { 1 },
            root,
        });
        Ok(())
    }

    fn index_of(&self, node: &Object) -> Option<usize> {
        node.node_key().and_then(|k| self.by_node.get(&k).copied())
    }

    /// Object with the given number, or Null.
    pub fn resolve(&self, number: u32) -> Object {
        self.by_number
            .get(&number)
            .map(|&i| self.entries[i].object.clone())
            .unwrap_or(Object::Null)
    }

    /// Entry for a node collected in this pass.
    pub fn entry_for(&self, node: &Object) -> Option<&ReferenceEntry> {
        self.index_of(node).map(|i| &self.entries[i])
    }

    /// Entries in discovery order.
    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    /// Number of collected nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest object number in the table (0 when empty).
    pub fn max_number(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.reference.id)
            .max()
            .unwrap_or(0)
    }
}

impl Resolve for ReferenceTable {
    fn resolve(&self, reference: ObjectRef) -> Object {
        match self.by_number.get(&reference.id) {
            Some(&i) if self.entries[i].reference.gen == reference.gen => {
                self.entries[i].object.clone()
            },
            _ => Object::Null,
        }
    }
}
