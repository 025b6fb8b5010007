//! Tree nodes and the per-factory node table.
//!
//! Nodes live in slab memory owned by their factory and are addressed by
//! [`NodeId`], an index into the factory's [`NodeTable`]. Children never
//! change after a node is built; only the bookkeeping (flags, digest,
//! reference count, canonical-bucket links) is updated, through `Cell`s,
//! so shared `&Node` borrows are the only kind ever handed out.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use polar_mem::BumpPtrAllocator;

/// Index of a node within its factory.
///
/// Ids are only meaningful to the factory that produced them. Two trees
/// from the same factory with the same root id are the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

const MUTABLE: u32 = 1 << 0;
const DIGEST_CACHED: u32 = 1 << 1;
const CANONICALIZED: u32 = 1 << 2;
const FLAG_BITS: u32 = 3;

pub(crate) struct Node<V> {
    left: Option<NodeId>,
    right: Option<NodeId>,
    value: V,
    /// Height in the upper bits, flags in the low `FLAG_BITS`.
    bits: Cell<u32>,
    digest: Cell<u32>,
    ref_count: Cell<u32>,
    /// Neighbours in the canonical cache bucket.
    prev: Cell<Option<NodeId>>,
    next: Cell<Option<NodeId>>,
}

impl<V> Node<V> {
    /// A fresh mutable node with no references.
    pub(crate) fn new(left: Option<NodeId>, value: V, right: Option<NodeId>, height: u32) -> Self {
        Node {
            left,
            right,
            value,
            bits: Cell::new((height << FLAG_BITS) | MUTABLE),
            digest: Cell::new(0),
            ref_count: Cell::new(0),
            prev: Cell::new(None),
            next: Cell::new(None),
        }
    }

    #[inline]
    pub(crate) fn left(&self) -> Option<NodeId> {
        self.left
    }

    #[inline]
    pub(crate) fn right(&self) -> Option<NodeId> {
        self.right
    }

    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub(crate) fn height(&self) -> u32 {
        self.bits.get() >> FLAG_BITS
    }

    #[inline]
    fn has_flag(&self, flag: u32) -> bool {
        self.bits.get() & flag != 0
    }

    #[inline]
    fn set_flag(&self, flag: u32, on: bool) {
        let bits = self.bits.get();
        self.bits.set(if on { bits | flag } else { bits & !flag });
    }

    pub(crate) fn is_mutable(&self) -> bool {
        self.has_flag(MUTABLE)
    }

    pub(crate) fn mark_immutable(&self) {
        debug_assert!(self.is_mutable(), "node is already immutable");
        self.set_flag(MUTABLE, false);
    }

    /// Takes a destroyed node out of the recovery pass.
    pub(crate) fn clear_mutable(&self) {
        self.set_flag(MUTABLE, false);
    }

    pub(crate) fn is_canonicalized(&self) -> bool {
        self.has_flag(CANONICALIZED)
    }

    pub(crate) fn mark_canonicalized(&self) {
        self.set_flag(CANONICALIZED, true);
    }

    pub(crate) fn cached_digest(&self) -> Option<u32> {
        self.has_flag(DIGEST_CACHED).then(|| self.digest.get())
    }

    pub(crate) fn cache_digest(&self, digest: u32) {
        self.digest.set(digest);
        self.set_flag(DIGEST_CACHED, true);
    }

    #[inline]
    pub(crate) fn ref_count(&self) -> u32 {
        self.ref_count.get()
    }

    #[inline]
    pub(crate) fn set_ref_count(&self, count: u32) {
        self.ref_count.set(count);
    }

    pub(crate) fn prev(&self) -> Option<NodeId> {
        self.prev.get()
    }

    pub(crate) fn set_prev(&self, prev: Option<NodeId>) {
        self.prev.set(prev);
    }

    pub(crate) fn next(&self) -> Option<NodeId> {
        self.next.get()
    }

    pub(crate) fn set_next(&self, next: Option<NodeId>) {
        self.next.set(next);
    }
}

/// Slab-backed storage for every node a factory has ever built.
///
/// Slots are never returned to the allocator. A destroyed node keeps its
/// slot (and its value) until [`NodeTable::replace`] reuses it; all values
/// are dropped when the table is.
pub(crate) struct NodeTable<V> {
    slots: Vec<NonNull<Node<V>>>,
    _owns: PhantomData<Node<V>>,
}

impl<V> NodeTable<V> {
    pub(crate) const fn new() -> Self {
        NodeTable {
            slots: Vec::new(),
            _owns: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> &Node<V> {
        // SAFETY: every slot holds an initialized node in memory owned by the
        // factory's allocator, which outlives the table. Nodes are only
        // overwritten through `&mut self`.
        unsafe { self.slots[id.index()].as_ref() }
    }

    /// Stable address of a node, for identity checks across factories and
    /// for borrows that must outlive a table borrow.
    #[inline]
    pub(crate) fn ptr(&self, id: NodeId) -> NonNull<Node<V>> {
        self.slots[id.index()]
    }

    /// Borrows a node's value for a caller-chosen lifetime.
    ///
    /// # Safety
    ///
    /// The node must stay retained (reachable from a live root) for all of
    /// `'r`, so its slot is not reused, and the table must not be dropped.
    #[inline]
    pub(crate) unsafe fn value_detached<'r>(&self, id: NodeId) -> &'r V {
        // SAFETY: forwarded from the caller. Values of live nodes are never
        // written.
        unsafe { &(*self.slots[id.index()].as_ptr()).value }
    }

    pub(crate) fn height(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.get(id).height())
    }

    /// Places `node` in fresh slab memory.
    pub(crate) fn insert(&mut self, allocator: &BumpPtrAllocator, node: Node<V>) -> NodeId {
        let Ok(raw) = u32::try_from(self.slots.len()) else {
            panic!("node table overflow");
        };
        let slot = allocator.allocate_array::<Node<V>>(1);
        // SAFETY: `slot` is fresh, properly aligned and sized for one node.
        unsafe { slot.as_ptr().write(node) };
        self.slots.push(slot);
        NodeId(raw)
    }

    /// Overwrites a destroyed node, dropping the value it still held.
    pub(crate) fn replace(&mut self, id: NodeId, node: Node<V>) {
        // SAFETY: the slot is initialized and no `&Node` into the table can
        // be alive while we hold `&mut self`.
        unsafe { *self.slots[id.index()].as_ptr() = node };
    }
}

impl<V> Drop for NodeTable<V> {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            // SAFETY: each slot holds exactly one initialized node; the
            // backing memory is released later by the allocator.
            unsafe { ptr::drop_in_place(slot.as_ptr()) };
        }
    }
}
