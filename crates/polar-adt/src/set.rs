//! Persistent ordered sets.
//!
//! [`ImmutableSet`] values are created and extended only through their
//! [`SetFactory`]; every add or remove returns a new set and leaves the old
//! one intact. [`ImmutableSetRef`] carries its factory along instead, for
//! code that passes sets around without access to the factory.
//!
//! # Examples
//!
//! ```
//! use polar_adt::SetFactory;
//!
//! let factory = SetFactory::new();
//! let empty = factory.empty_set();
//! let one = factory.add(&empty, 1u32);
//! let both = factory.add(&one, 2);
//!
//! assert!(empty.is_empty());
//! assert!(one.contains(&1) && !one.contains(&2));
//! assert_eq!(both.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use polar_mem::{AllocError, BumpPtrAllocator};

use crate::config::FactoryConfig;
use crate::error::ValidationError;
use crate::info::{ImutContainerInfo, ImutInfo};
use crate::iter::{Cursor, Iter};
use crate::node::NodeId;
use crate::tree::{TreeFactory, TreeRoot};

/// Ascending iterator over a set.
pub type SetIter<'s, T> = Iter<'s, ImutContainerInfo<T>>;

/// Bidirectional cursor over a set.
pub type SetCursor<'s, T> = Cursor<'s, ImutContainerInfo<T>>;

/// The tree factory behind sets of `T`.
pub type SetTreeFactory<'a, T> = TreeFactory<'a, ImutContainerInfo<T>>;

/// Builds [`ImmutableSet`]s.
///
/// `I` decides how elements are ordered, compared and profiled. It
/// defaults to [`ImutContainerInfo`], which uses `Ord` and `Hash`.
pub struct SetFactory<'a, T, I = ImutContainerInfo<T>>
where
    I: ImutInfo<Value = T>,
{
    tree: TreeFactory<'a, I>,
    canonicalize: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Ord + Hash + Clone> SetFactory<'static, T> {
    /// Creates a canonicalizing factory with its own allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with its own allocator.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] for an unusable slab
    /// configuration.
    pub fn with_config(config: FactoryConfig) -> Result<Self, AllocError> {
        Self::with_info_config(config)
    }
}

impl<'a, T: Ord + Hash + Clone> SetFactory<'a, T> {
    /// Creates a factory drawing nodes from a shared allocator.
    #[must_use]
    pub fn with_allocator(allocator: &'a BumpPtrAllocator, canonicalize: bool) -> Self {
        Self::with_info_allocator(allocator, canonicalize)
    }
}

impl<T, I: ImutInfo<Value = T>> SetFactory<'static, T, I> {
    /// Like [`with_config`](SetFactory::with_config), for any element
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] for an unusable slab
    /// configuration.
    pub fn with_info_config(config: FactoryConfig) -> Result<Self, AllocError> {
        Ok(SetFactory {
            tree: TreeFactory::with_slab_config(config.slab)?,
            canonicalize: config.canonicalize,
            _marker: PhantomData,
        })
    }
}

impl<T, I: ImutInfo<Value = T>> Default for SetFactory<'static, T, I> {
    fn default() -> Self {
        SetFactory {
            tree: TreeFactory::new(),
            canonicalize: true,
            _marker: PhantomData,
        }
    }
}

impl<'a, T, I: ImutInfo<Value = T>> SetFactory<'a, T, I> {
    /// Like [`with_allocator`](SetFactory::with_allocator), for any element
    /// policy.
    #[must_use]
    pub fn with_info_allocator(allocator: &'a BumpPtrAllocator, canonicalize: bool) -> Self {
        SetFactory {
            tree: TreeFactory::with_allocator(allocator),
            canonicalize,
            _marker: PhantomData,
        }
    }

    pub fn empty_set(&self) -> ImmutableSet<'_, T, I> {
        ImmutableSet::from_root(TreeRoot::empty(&self.tree))
    }

    /// Returns `old` with `value` added, replacing an equal element.
    ///
    /// # Panics
    ///
    /// Panics if `old` was built by another factory.
    #[must_use]
    pub fn add<'f>(&'f self, old: &ImmutableSet<'f, T, I>, value: T) -> ImmutableSet<'f, T, I> {
        ImmutableSet::from_root(self.tree.add(&old.root, value, self.canonicalize))
    }

    /// Returns `old` without `value`. Removing a missing value yields a set
    /// equal to `old`.
    ///
    /// # Panics
    ///
    /// Panics if `old` was built by another factory.
    #[must_use]
    pub fn remove<'f>(
        &'f self,
        old: &ImmutableSet<'f, T, I>,
        value: &I::Key,
    ) -> ImmutableSet<'f, T, I> {
        ImmutableSet::from_root(self.tree.remove(&old.root, value, self.canonicalize))
    }

    /// The underlying tree factory, for building [`ImmutableSetRef`]s.
    pub fn tree_factory(&self) -> &TreeFactory<'a, I> {
        &self.tree
    }

    /// Whether add and remove return canonical trees.
    pub fn canonicalizes(&self) -> bool {
        self.canonicalize
    }
}

impl<T, I: ImutInfo<Value = T>> fmt::Debug for SetFactory<'_, T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetFactory")
            .field("tree", &self.tree)
            .field("canonicalize", &self.canonicalize)
            .finish()
    }
}

/// A persistent ordered set.
///
/// Cloning is `O(1)`. Sets from one canonicalizing factory with equal
/// contents share their root, so [`root`](Self::root) identifies them.
pub struct ImmutableSet<'f, T, I = ImutContainerInfo<T>>
where
    I: ImutInfo<Value = T>,
{
    root: TreeRoot<'f, I>,
    _marker: PhantomData<fn() -> T>,
}

impl<'f, T, I: ImutInfo<Value = T>> ImmutableSet<'f, T, I> {
    fn from_root(root: TreeRoot<'f, I>) -> Self {
        ImmutableSet {
            root,
            _marker: PhantomData,
        }
    }

    pub fn contains(&self, value: &I::Key) -> bool {
        self.root.contains(value)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// True if the set holds exactly one element.
    pub fn is_singleton(&self) -> bool {
        self.root.is_singleton()
    }

    /// Number of elements. Walks the whole tree.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Height of the tree; zero when empty.
    pub fn height(&self) -> u32 {
        self.root.height()
    }

    /// The root node, or `None` when empty.
    pub fn root(&self) -> Option<NodeId> {
        self.root.id()
    }

    pub fn iter(&self) -> Iter<'_, I> {
        self.root.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, I> {
        self.root.cursor()
    }

    pub fn for_each<F: FnMut(&T)>(&self, f: F) {
        self.iter().for_each(f);
    }

    /// Whether this root is the factory's canonical copy of its contents.
    pub fn is_canonical(&self) -> bool {
        self.root.is_canonical()
    }

    /// Content digest; equal sets have equal digests.
    pub fn digest(&self) -> u32 {
        self.root.digest()
    }

    /// Checks the tree's balance and ordering and returns its height.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate_tree(&self) -> Result<u32, ValidationError> {
        self.root.validate()
    }
}

impl<T, I: ImutInfo<Value = T>> Clone for ImmutableSet<'_, T, I> {
    fn clone(&self) -> Self {
        ImmutableSet::from_root(self.root.clone())
    }
}

impl<'g, T, I: ImutInfo<Value = T>> PartialEq<ImmutableSet<'g, T, I>> for ImmutableSet<'_, T, I> {
    fn eq(&self, other: &ImmutableSet<'g, T, I>) -> bool {
        self.root.is_equal(&other.root)
    }
}

impl<T, I: ImutInfo<Value = T>> Eq for ImmutableSet<'_, T, I> {}

impl<T, I: ImutInfo<Value = T>> Hash for ImmutableSet<'_, T, I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.root.digest());
    }
}

impl<T: fmt::Debug, I: ImutInfo<Value = T>> fmt::Debug for ImmutableSet<'_, T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'s, T, I: ImutInfo<Value = T>> IntoIterator for &'s ImmutableSet<'_, T, I> {
    type Item = &'s T;
    type IntoIter = Iter<'s, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A persistent set that carries its factory.
///
/// Adds and removes never canonicalize; call
/// [`as_immutable_set`](Self::as_immutable_set) to get a canonical set.
pub struct ImmutableSetRef<'f, T, I = ImutContainerInfo<T>>
where
    I: ImutInfo<Value = T>,
{
    root: TreeRoot<'f, I>,
    _marker: PhantomData<fn() -> T>,
}

impl<'f, T, I: ImutInfo<Value = T>> ImmutableSetRef<'f, T, I> {
    fn from_root(root: TreeRoot<'f, I>) -> Self {
        ImmutableSetRef {
            root,
            _marker: PhantomData,
        }
    }

    pub fn empty(factory: &'f TreeFactory<'f, I>) -> Self {
        Self::from_root(TreeRoot::empty(factory))
    }

    #[must_use]
    pub fn add(&self, value: T) -> Self {
        Self::from_root(self.root.factory().add(&self.root, value, false))
    }

    #[must_use]
    pub fn remove(&self, value: &I::Key) -> Self {
        Self::from_root(self.root.factory().remove(&self.root, value, false))
    }

    pub fn contains(&self, value: &I::Key) -> bool {
        self.root.contains(value)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.root.is_singleton()
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn height(&self) -> u32 {
        self.root.height()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root.id()
    }

    pub fn iter(&self) -> Iter<'_, I> {
        self.root.iter()
    }

    pub fn cursor(&self) -> Cursor<'_, I> {
        self.root.cursor()
    }

    pub fn for_each<F: FnMut(&T)>(&self, f: F) {
        self.iter().for_each(f);
    }

    pub fn factory(&self) -> &'f TreeFactory<'f, I> {
        self.root.factory()
    }

    /// Converts to a plain set, optionally swapping in the canonical root.
    pub fn as_immutable_set(&self, canonicalize: bool) -> ImmutableSet<'f, T, I> {
        let root = if canonicalize {
            self.root.factory().canonicalize(&self.root)
        } else {
            self.root.clone()
        };
        ImmutableSet::from_root(root)
    }

    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate_tree(&self) -> Result<u32, ValidationError> {
        self.root.validate()
    }
}

impl<'f, T, I: ImutInfo<Value = T>> From<ImmutableSet<'f, T, I>> for ImmutableSetRef<'f, T, I> {
    fn from(set: ImmutableSet<'f, T, I>) -> Self {
        ImmutableSetRef::from_root(set.root)
    }
}

impl<T, I: ImutInfo<Value = T>> Clone for ImmutableSetRef<'_, T, I> {
    fn clone(&self) -> Self {
        ImmutableSetRef::from_root(self.root.clone())
    }
}

impl<'g, T, I: ImutInfo<Value = T>> PartialEq<ImmutableSetRef<'g, T, I>>
    for ImmutableSetRef<'_, T, I>
{
    fn eq(&self, other: &ImmutableSetRef<'g, T, I>) -> bool {
        self.root.is_equal(&other.root)
    }
}

impl<T, I: ImutInfo<Value = T>> Eq for ImmutableSetRef<'_, T, I> {}

impl<T, I: ImutInfo<Value = T>> Hash for ImmutableSetRef<'_, T, I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.root.digest());
    }
}

impl<T: fmt::Debug, I: ImutInfo<Value = T>> fmt::Debug for ImmutableSetRef<'_, T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'s, T, I: ImutInfo<Value = T>> IntoIterator for &'s ImmutableSetRef<'_, T, I> {
    type Item = &'s T;
    type IntoIter = Iter<'s, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
