//! The persistent AVL tree and the factory that builds it.
//!
//! Trees are never modified after construction. Adding or removing a value
//! builds new nodes along one root-to-leaf path and shares every other
//! subtree with the original, so a version costs `O(log n)` nodes.
//!
//! # Node lifecycle
//!
//! While an add or remove is in progress its new nodes are *mutable* and
//! unreferenced. Rebalancing may throw some of them away. Once the
//! operation finishes, every node reachable from the new root is frozen,
//! and the leftovers are destroyed immediately. Frozen nodes are reference
//! counted: by their parents and by the sets, maps and iterators holding a
//! root. A node whose count drops to zero releases its children and goes
//! onto the factory's free list, and its slot is reused by the next node
//! built.
//!
//! # Canonicalization
//!
//! Roots can be looked up in a cache keyed by a 32-bit content digest.
//! When an equal tree is already cached it is returned instead, so equal
//! sets built by one canonicalizing factory share a root and compare in
//! constant time.
//!
//! Balance is relaxed: sibling heights may differ by up to two. This keeps
//! rebuilds short while still bounding height logarithmically.

use std::cell::{Ref, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr;

use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use polar_log::{debug, trace};
use polar_mem::{AllocError, BumpPtrAllocator, SlabConfig};

use crate::error::ValidationError;
use crate::info::ImutInfo;
use crate::iter::{Cursor, InOrderCursor, Iter};
use crate::node::{Node, NodeId, NodeTable};

/// Cache bucket for a digest.
///
/// Bit 1 is ignored, so digests differing only there share a bucket and
/// are told apart by content.
#[inline]
fn mask_cache_index(digest: u32) -> u32 {
    digest & !0x02
}

fn order<I: ImutInfo>(key: &I::Key, current: &I::Key) -> Ordering {
    if I::is_equal(key, current) {
        Ordering::Equal
    } else if I::is_less(key, current) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Compares two trees element by element.
///
/// Trees may come from different tables. Subtrees stored at the same
/// address are skipped without being visited.
pub(crate) fn trees_equal<I: ImutInfo>(
    lhs_table: &NodeTable<I::Value>,
    lhs: Option<NodeId>,
    rhs_table: &NodeTable<I::Value>,
    rhs: Option<NodeId>,
) -> bool {
    let (Some(l), Some(r)) = (lhs, rhs) else {
        return lhs.is_none() && rhs.is_none();
    };
    if lhs_table.ptr(l) == rhs_table.ptr(r) {
        return true;
    }

    let mut left = InOrderCursor::new(lhs_table, lhs);
    let mut right = InOrderCursor::new(rhs_table, rhs);
    while let (Some(a), Some(b)) = (left.current(), right.current()) {
        if lhs_table.ptr(a) == rhs_table.ptr(b) {
            left.skip_sub_tree(lhs_table);
            right.skip_sub_tree(rhs_table);
            continue;
        }
        if !I::is_element_equal(lhs_table.get(a).value(), rhs_table.get(b).value()) {
            return false;
        }
        left.advance(lhs_table);
        right.advance(rhs_table);
    }
    left.at_end() && right.at_end()
}

/// Node storage plus the bookkeeping of a factory.
pub(crate) struct FactoryState<I: ImutInfo> {
    pub(crate) table: NodeTable<I::Value>,
    /// Canonical roots, chained through `prev`/`next` per bucket.
    cache: HashMap<u32, NodeId, FxBuildHasher>,
    /// Nodes built by the operation in progress.
    created: Vec<NodeId>,
    /// Destroyed nodes whose slots can be reused.
    free: Vec<NodeId>,
    _info: PhantomData<I>,
}

impl<I: ImutInfo> FactoryState<I> {
    fn new() -> Self {
        FactoryState {
            table: NodeTable::new(),
            cache: HashMap::with_hasher(FxBuildHasher::default()),
            created: Vec::new(),
            free: Vec::new(),
            _info: PhantomData,
        }
    }

    fn children(&self, id: NodeId) -> (Option<NodeId>, Option<NodeId>) {
        let node = self.table.get(id);
        (node.left(), node.right())
    }

    fn value_of(&self, id: NodeId) -> I::Value {
        self.table.get(id).value().clone()
    }

    pub(crate) fn retain(&self, id: NodeId) {
        let node = self.table.get(id);
        node.set_ref_count(node.ref_count() + 1);
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        let node = self.table.get(id);
        let count = node.ref_count();
        debug_assert!(count > 0, "reference count underflow on node {id}");
        if count == 0 {
            return;
        }
        node.set_ref_count(count - 1);
        if count == 1 {
            self.destroy(id);
        }
    }

    fn destroy(&mut self, id: NodeId) {
        let (left, right) = self.children(id);
        if let Some(left) = left {
            self.release(left);
        }
        if let Some(right) = right {
            self.release(right);
        }

        let node = self.table.get(id);
        if node.is_canonicalized() {
            let (prev, next) = (node.prev(), node.next());
            if let Some(next) = next {
                self.table.get(next).set_prev(prev);
            }
            match prev {
                Some(prev) => self.table.get(prev).set_next(next),
                None => {
                    let index = mask_cache_index(self.digest(Some(id)));
                    match next {
                        Some(next) => {
                            self.cache.insert(index, next);
                        }
                        None => {
                            self.cache.remove(&index);
                        }
                    }
                }
            }
        }

        // Keep `recover_nodes` from destroying it a second time.
        self.table.get(id).clear_mutable();
        self.free.push(id);
    }

    fn create_node(
        &mut self,
        allocator: &BumpPtrAllocator,
        left: Option<NodeId>,
        value: I::Value,
        right: Option<NodeId>,
    ) -> NodeId {
        let height = self.table.height(left).max(self.table.height(right)) + 1;
        if let Some(left) = left {
            self.retain(left);
        }
        if let Some(right) = right {
            self.retain(right);
        }

        let node = Node::new(left, value, right, height);
        let id = match self.free.pop() {
            Some(id) => {
                trace!("reusing free node {id}");
                self.table.replace(id, node);
                id
            }
            None => self.table.insert(allocator, node),
        };
        self.created.push(id);
        id
    }

    fn balance_tree(
        &mut self,
        allocator: &BumpPtrAllocator,
        left: Option<NodeId>,
        value: I::Value,
        right: Option<NodeId>,
    ) -> NodeId {
        let hl = self.table.height(left);
        let hr = self.table.height(right);

        if hl > hr + 2 {
            let Some(l) = left else {
                unreachable!("left subtree of height >= 3 is empty");
            };
            let (ll, lr) = self.children(l);
            let l_value = self.value_of(l);
            if self.table.height(ll) >= self.table.height(lr) {
                let new_right = self.create_node(allocator, lr, value, right);
                return self.create_node(allocator, ll, l_value, Some(new_right));
            }

            let Some(lr) = lr else {
                unreachable!("taller inner subtree is empty");
            };
            let (lrl, lrr) = self.children(lr);
            let lr_value = self.value_of(lr);
            let new_left = self.create_node(allocator, ll, l_value, lrl);
            let new_right = self.create_node(allocator, lrr, value, right);
            return self.create_node(allocator, Some(new_left), lr_value, Some(new_right));
        }

        if hr > hl + 2 {
            let Some(r) = right else {
                unreachable!("right subtree of height >= 3 is empty");
            };
            let (rl, rr) = self.children(r);
            let r_value = self.value_of(r);
            if self.table.height(rr) >= self.table.height(rl) {
                let new_left = self.create_node(allocator, left, value, rl);
                return self.create_node(allocator, Some(new_left), r_value, rr);
            }

            let Some(rl) = rl else {
                unreachable!("taller inner subtree is empty");
            };
            let (rll, rlr) = self.children(rl);
            let rl_value = self.value_of(rl);
            let new_left = self.create_node(allocator, left, value, rll);
            let new_right = self.create_node(allocator, rlr, r_value, rr);
            return self.create_node(allocator, Some(new_left), rl_value, Some(new_right));
        }

        self.create_node(allocator, left, value, right)
    }

    fn add_internal(
        &mut self,
        allocator: &BumpPtrAllocator,
        value: I::Value,
        root: Option<NodeId>,
    ) -> NodeId {
        let Some(id) = root else {
            return self.create_node(allocator, None, value, None);
        };
        debug_assert!(
            !self.table.get(id).is_mutable(),
            "adding into a tree that is still being built"
        );

        let (left, right) = self.children(id);
        let ordering = order::<I>(I::key_of(&value), I::key_of(self.table.get(id).value()));
        match ordering {
            Ordering::Equal => self.create_node(allocator, left, value, right),
            Ordering::Less => {
                let current = self.value_of(id);
                let new_left = self.add_internal(allocator, value, left);
                self.balance_tree(allocator, Some(new_left), current, right)
            }
            Ordering::Greater => {
                let current = self.value_of(id);
                let new_right = self.add_internal(allocator, value, right);
                self.balance_tree(allocator, left, current, Some(new_right))
            }
        }
    }

    fn remove_internal(
        &mut self,
        allocator: &BumpPtrAllocator,
        key: &I::Key,
        root: Option<NodeId>,
    ) -> Option<NodeId> {
        let id = root?;
        debug_assert!(
            !self.table.get(id).is_mutable(),
            "removing from a tree that is still being built"
        );

        let (left, right) = self.children(id);
        let ordering = order::<I>(key, I::key_of(self.table.get(id).value()));
        match ordering {
            Ordering::Equal => self.combine_trees(allocator, left, right),
            Ordering::Less => {
                let current = self.value_of(id);
                let new_left = self.remove_internal(allocator, key, left);
                Some(self.balance_tree(allocator, new_left, current, right))
            }
            Ordering::Greater => {
                let current = self.value_of(id);
                let new_right = self.remove_internal(allocator, key, right);
                Some(self.balance_tree(allocator, left, current, new_right))
            }
        }
    }

    fn combine_trees(
        &mut self,
        allocator: &BumpPtrAllocator,
        left: Option<NodeId>,
        right: Option<NodeId>,
    ) -> Option<NodeId> {
        let Some(r) = right else {
            return left;
        };
        if left.is_none() {
            return right;
        }
        let (new_right, min) = self.remove_min_binding(allocator, r);
        Some(self.balance_tree(allocator, left, min, new_right))
    }

    /// Splits the smallest value off `id`, returning the rest of the tree.
    fn remove_min_binding(
        &mut self,
        allocator: &BumpPtrAllocator,
        id: NodeId,
    ) -> (Option<NodeId>, I::Value) {
        let (left, right) = self.children(id);
        let Some(left) = left else {
            return (right, self.value_of(id));
        };
        let current = self.value_of(id);
        let (new_left, min) = self.remove_min_binding(allocator, left);
        (Some(self.balance_tree(allocator, new_left, current, right)), min)
    }

    fn mark_immutable(&self, root: Option<NodeId>) {
        let Some(id) = root else {
            return;
        };
        let node = self.table.get(id);
        if !node.is_mutable() {
            return;
        }
        node.mark_immutable();
        self.mark_immutable(node.left());
        self.mark_immutable(node.right());
    }

    /// Destroys nodes built but abandoned by the last operation.
    fn recover_nodes(&mut self) {
        let mut created = mem::take(&mut self.created);
        for &id in &created {
            let node = self.table.get(id);
            if node.is_mutable() && node.ref_count() == 0 {
                self.destroy(id);
            }
        }
        created.clear();
        self.created = created;
    }

    pub(crate) fn add(
        &mut self,
        allocator: &BumpPtrAllocator,
        root: Option<NodeId>,
        value: I::Value,
    ) -> Option<NodeId> {
        let result = self.add_internal(allocator, value, root);
        self.mark_immutable(Some(result));
        self.recover_nodes();
        self.check_invariants(Some(result));
        Some(result)
    }

    pub(crate) fn remove(
        &mut self,
        allocator: &BumpPtrAllocator,
        root: Option<NodeId>,
        key: &I::Key,
    ) -> Option<NodeId> {
        let result = self.remove_internal(allocator, key, root);
        self.mark_immutable(result);
        self.recover_nodes();
        self.check_invariants(result);
        result
    }

    /// Returns the cached tree equal to `root`, caching `root` if there is
    /// none. An unreferenced `root` that loses to a cached tree is
    /// destroyed.
    pub(crate) fn get_canonical_tree(&mut self, root: Option<NodeId>) -> Option<NodeId> {
        let id = root?;
        if self.table.get(id).is_canonicalized() {
            return Some(id);
        }

        let digest = self.digest(Some(id));
        let index = mask_cache_index(digest);
        if let Some(&head) = self.cache.get(&index) {
            let mut candidate = Some(head);
            while let Some(cached) = candidate {
                if trees_equal::<I>(&self.table, Some(cached), &self.table, Some(id)) {
                    if self.table.get(id).ref_count() == 0 {
                        self.destroy(id);
                    }
                    trace!("canonical tree hit for digest {digest:#010x}");
                    return Some(cached);
                }
                candidate = self.table.get(cached).next();
            }
            self.table.get(head).set_prev(Some(id));
            self.table.get(id).set_next(Some(head));
        }

        trace!("caching canonical tree {id} for digest {digest:#010x}");
        self.cache.insert(index, id);
        self.table.get(id).mark_canonicalized();
        Some(id)
    }

    /// Sum of the profiles of every value in the tree, wrapping.
    pub(crate) fn digest(&self, root: Option<NodeId>) -> u32 {
        let Some(id) = root else {
            return 0;
        };
        let node = self.table.get(id);
        if let Some(digest) = node.cached_digest() {
            return digest;
        }
        let digest = self
            .digest(node.left())
            .wrapping_add(I::profile(node.value()))
            .wrapping_add(self.digest(node.right()));
        node.cache_digest(digest);
        digest
    }

    pub(crate) fn find(&self, root: Option<NodeId>, key: &I::Key) -> Option<NodeId> {
        let mut cursor = root;
        while let Some(id) = cursor {
            let node = self.table.get(id);
            cursor = match order::<I>(key, I::key_of(node.value())) {
                Ordering::Equal => return Some(id),
                Ordering::Less => node.left(),
                Ordering::Greater => node.right(),
            };
        }
        None
    }

    pub(crate) fn max_element(&self, root: Option<NodeId>) -> Option<NodeId> {
        let mut id = root?;
        while let Some(right) = self.table.get(id).right() {
            id = right;
        }
        Some(id)
    }

    /// Number of nodes in the tree.
    pub(crate) fn size(&self, root: Option<NodeId>) -> usize {
        root.map_or(0, |id| {
            let (left, right) = self.children(id);
            self.size(left) + 1 + self.size(right)
        })
    }

    /// Checks heights, balance and ordering; returns the tree height.
    pub(crate) fn validate(&self, root: Option<NodeId>) -> Result<u32, ValidationError> {
        let Some(id) = root else {
            return Ok(0);
        };
        let node = self.table.get(id);
        let hl = self.validate(node.left())?;
        let hr = self.validate(node.right())?;

        let expected = hl.max(hr) + 1;
        if node.height() != expected {
            return Err(ValidationError::HeightMismatch {
                expected,
                found: node.height(),
            });
        }
        if hl.abs_diff(hr) > 2 {
            return Err(ValidationError::Unbalanced {
                left: hl,
                right: hr,
            });
        }

        let key = I::key_of(node.value());
        if node
            .left()
            .is_some_and(|left| !I::is_less(I::key_of(self.table.get(left).value()), key))
        {
            return Err(ValidationError::LeftOrdering);
        }
        if node
            .right()
            .is_some_and(|right| !I::is_less(key, I::key_of(self.table.get(right).value())))
        {
            return Err(ValidationError::RightOrdering);
        }
        Ok(expected)
    }

    #[inline]
    fn check_invariants(&self, root: Option<NodeId>) {
        if !cfg!(all(debug_assertions, feature = "expensive-checks")) {
            return;
        }
        if let Err(err) = self.validate(root) {
            panic!("tree invariant broken: {err}");
        }
    }
}

enum NodeAllocator<'a> {
    Owned(BumpPtrAllocator),
    Shared(&'a BumpPtrAllocator),
}

impl NodeAllocator<'_> {
    fn get(&self) -> &BumpPtrAllocator {
        match self {
            NodeAllocator::Owned(allocator) => allocator,
            NodeAllocator::Shared(allocator) => allocator,
        }
    }
}

/// Builds and owns the nodes of every tree derived from it.
///
/// A factory either owns its slab allocator or borrows one that several
/// factories share. Trees hold a reference to their factory, so the
/// factory outlives all of them. Factories are single-threaded.
pub struct TreeFactory<'a, I: ImutInfo> {
    // Declared first: node values are dropped before the slabs holding
    // them are freed.
    state: RefCell<FactoryState<I>>,
    allocator: NodeAllocator<'a>,
}

impl<I: ImutInfo> TreeFactory<'static, I> {
    /// Creates a factory with its own default allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::from_allocator(NodeAllocator::Owned(BumpPtrAllocator::new()))
    }

    /// Creates a factory with its own allocator sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if `config` is not usable.
    pub fn with_slab_config(config: SlabConfig) -> Result<Self, AllocError> {
        let allocator = BumpPtrAllocator::with_config(config)?;
        Ok(Self::from_allocator(NodeAllocator::Owned(allocator)))
    }
}

impl<I: ImutInfo> Default for TreeFactory<'static, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, I: ImutInfo> TreeFactory<'a, I> {
    /// Creates a factory that allocates nodes from a shared allocator.
    #[must_use]
    pub fn with_allocator(allocator: &'a BumpPtrAllocator) -> Self {
        Self::from_allocator(NodeAllocator::Shared(allocator))
    }

    fn from_allocator(allocator: NodeAllocator<'a>) -> Self {
        debug!(
            "created tree factory with {} allocator",
            match allocator {
                NodeAllocator::Owned(_) => "owned",
                NodeAllocator::Shared(_) => "shared",
            }
        );
        TreeFactory {
            state: RefCell::new(FactoryState::new()),
            allocator,
        }
    }

    /// The allocator nodes are carved from.
    pub fn allocator(&self) -> &BumpPtrAllocator {
        self.allocator.get()
    }

    /// Whether the allocator is shared with other owners.
    pub fn shares_allocator(&self) -> bool {
        matches!(self.allocator, NodeAllocator::Shared(_))
    }

    pub(crate) fn state(&self) -> Ref<'_, FactoryState<I>> {
        self.state.borrow()
    }

    /// Number of node slots ever allocated, live or free.
    pub fn node_count(&self) -> usize {
        self.state().table.len()
    }

    /// Number of destroyed nodes waiting for reuse.
    pub fn free_node_count(&self) -> usize {
        self.state().free.len()
    }

    /// Number of digest buckets in the canonical cache.
    pub fn canonical_bucket_count(&self) -> usize {
        self.state().cache.len()
    }

    fn is_owner_of(&self, root: &TreeRoot<'_, I>) -> bool {
        ptr::eq(self.state.as_ptr(), root.factory.state.as_ptr())
    }

    pub(crate) fn add<'f>(
        &'f self,
        root: &TreeRoot<'f, I>,
        value: I::Value,
        canonicalize: bool,
    ) -> TreeRoot<'f, I> {
        assert!(self.is_owner_of(root), "tree belongs to a different factory");
        let result = {
            let mut state = self.state.borrow_mut();
            let result = state.add(self.allocator.get(), root.id, value);
            if canonicalize {
                state.get_canonical_tree(result)
            } else {
                result
            }
        };
        TreeRoot::new(self, result)
    }

    pub(crate) fn remove<'f>(
        &'f self,
        root: &TreeRoot<'f, I>,
        key: &I::Key,
        canonicalize: bool,
    ) -> TreeRoot<'f, I> {
        assert!(self.is_owner_of(root), "tree belongs to a different factory");
        let result = {
            let mut state = self.state.borrow_mut();
            let result = state.remove(self.allocator.get(), root.id, key);
            if canonicalize {
                state.get_canonical_tree(result)
            } else {
                result
            }
        };
        TreeRoot::new(self, result)
    }

    pub(crate) fn canonicalize<'f>(&'f self, root: &TreeRoot<'f, I>) -> TreeRoot<'f, I> {
        assert!(self.is_owner_of(root), "tree belongs to a different factory");
        let result = self.state.borrow_mut().get_canonical_tree(root.id);
        TreeRoot::new(self, result)
    }
}

impl<I: ImutInfo> fmt::Debug for TreeFactory<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("TreeFactory")
            .field("nodes", &state.table.len())
            .field("free", &state.free.len())
            .field("canonical_buckets", &state.cache.len())
            .field("shared_allocator", &self.shares_allocator())
            .finish()
    }
}

/// A counted reference to a tree root.
///
/// Every set and map is one of these. Cloning retains the root and
/// dropping releases it.
pub(crate) struct TreeRoot<'f, I: ImutInfo> {
    id: Option<NodeId>,
    factory: &'f TreeFactory<'f, I>,
}

impl<'f, I: ImutInfo> TreeRoot<'f, I> {
    pub(crate) fn new(factory: &'f TreeFactory<'f, I>, id: Option<NodeId>) -> Self {
        if let Some(id) = id {
            factory.state().retain(id);
        }
        TreeRoot { id, factory }
    }

    pub(crate) fn empty(factory: &'f TreeFactory<'f, I>) -> Self {
        TreeRoot { id: None, factory }
    }

    #[inline]
    pub(crate) fn id(&self) -> Option<NodeId> {
        self.id
    }

    #[inline]
    pub(crate) fn factory(&self) -> &'f TreeFactory<'f, I> {
        self.factory
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.id.is_none()
    }

    pub(crate) fn is_singleton(&self) -> bool {
        self.id.is_some_and(|id| {
            let state = self.factory.state();
            let node = state.table.get(id);
            node.left().is_none() && node.right().is_none()
        })
    }

    pub(crate) fn height(&self) -> u32 {
        self.factory.state().table.height(self.id)
    }

    pub(crate) fn len(&self) -> usize {
        self.factory.state().size(self.id)
    }

    pub(crate) fn contains(&self, key: &I::Key) -> bool {
        self.factory.state().find(self.id, key).is_some()
    }

    pub(crate) fn find(&self, key: &I::Key) -> Option<&I::Value> {
        let state = self.factory.state();
        let id = state.find(self.id, key)?;
        // SAFETY: the node is reachable from our retained root and the
        // result borrows `self`.
        Some(unsafe { state.table.value_detached(id) })
    }

    pub(crate) fn max_element(&self) -> Option<&I::Value> {
        let state = self.factory.state();
        let id = state.max_element(self.id)?;
        // SAFETY: as in `find`.
        Some(unsafe { state.table.value_detached(id) })
    }

    pub(crate) fn iter(&self) -> Iter<'_, I> {
        Iter::new(self.factory, self.id)
    }

    pub(crate) fn cursor(&self) -> Cursor<'_, I> {
        Cursor::new(self.factory, self.id)
    }

    pub(crate) fn validate(&self) -> Result<u32, ValidationError> {
        self.factory.state().validate(self.id)
    }

    pub(crate) fn digest(&self) -> u32 {
        self.factory.state().digest(self.id)
    }

    pub(crate) fn is_canonical(&self) -> bool {
        self.id
            .is_some_and(|id| self.factory.state().table.get(id).is_canonicalized())
    }

    /// Structural equality, valid across factories.
    pub(crate) fn is_equal(&self, other: &TreeRoot<'_, I>) -> bool {
        let lhs = self.factory.state();
        let rhs = other.factory.state();
        trees_equal::<I>(&lhs.table, self.id, &rhs.table, other.id)
    }
}

impl<I: ImutInfo> Clone for TreeRoot<'_, I> {
    fn clone(&self) -> Self {
        TreeRoot::new(self.factory, self.id)
    }
}

impl<I: ImutInfo> Drop for TreeRoot<'_, I> {
    fn drop(&mut self) {
        let Some(id) = self.id else {
            return;
        };
        // Only fails while unwinding out of a factory operation; the node
        // is leaked in that case.
        if let Ok(mut state) = self.factory.state.try_borrow_mut() {
            state.release(id);
        }
    }
}
