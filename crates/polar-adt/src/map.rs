//! Persistent ordered maps.
//!
//! Maps are trees of `(key, data)` pairs ordered by key. Two maps are equal
//! when they bind the same keys to equal data.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::marker::PhantomData;

use polar_mem::{AllocError, BumpPtrAllocator};

use crate::config::FactoryConfig;
use crate::error::ValidationError;
use crate::info::{ImutInfo, ImutKeyValueInfo};
use crate::iter::{Cursor, Iter};
use crate::node::NodeId;
use crate::tree::{TreeFactory, TreeRoot};

/// The tree factory behind maps from `K` to `V`.
pub type MapTreeFactory<'a, K, V> = TreeFactory<'a, ImutKeyValueInfo<K, V>>;

/// Bidirectional cursor over a map's entries.
pub type MapCursor<'s, K, V> = Cursor<'s, ImutKeyValueInfo<K, V>>;

/// Ascending iterator over the entries of a map.
pub struct MapIter<'s, K, V, I = ImutKeyValueInfo<K, V>>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    inner: Iter<'s, I>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'s, K: 's, V: 's, I> Iterator for MapIter<'s, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    type Item = (&'s K, &'s V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, data)| (key, data))
    }
}

impl<'s, K: 's, V: 's, I> FusedIterator for MapIter<'s, K, V, I> where
    I: ImutInfo<Value = (K, V), Key = K>
{
}

impl<K, V, I> Clone for MapIter<'_, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn clone(&self) -> Self {
        MapIter {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

/// Builds [`ImmutableMap`]s.
///
/// `I` decides how keys are ordered and how entries are compared and
/// profiled. It defaults to [`ImutKeyValueInfo`].
pub struct MapFactory<'a, K, V, I = ImutKeyValueInfo<K, V>>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    tree: TreeFactory<'a, I>,
    canonicalize: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> MapFactory<'static, K, V>
where
    K: Ord + Hash + Clone,
    V: PartialEq + Hash + Clone,
{
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

impl<'a, K, V> MapFactory<'a, K, V>
where
    K: Ord + Hash + Clone,
    V: PartialEq + Hash + Clone,
{
    /// Creates a factory drawing nodes from a shared allocator.
    #[must_use]
    pub fn with_allocator(allocator: &'a BumpPtrAllocator, canonicalize: bool) -> Self {
        Self::with_info_allocator(allocator, canonicalize)
    }
}

impl<K, V, I> MapFactory<'static, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    /// Like [`with_config`](MapFactory::with_config), for any entry policy.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] for an unusable slab
    /// configuration.
    pub fn with_info_config(config: FactoryConfig) -> Result<Self, AllocError> {
        Ok(MapFactory {
            tree: TreeFactory::with_slab_config(config.slab)?,
            canonicalize: config.canonicalize,
            _marker: PhantomData,
        })
    }
}

impl<K, V, I> Default for MapFactory<'static, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn default() -> Self {
        MapFactory {
            tree: TreeFactory::new(),
            canonicalize: true,
            _marker: PhantomData,
        }
    }
}

impl<'a, K, V, I> MapFactory<'a, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    /// Like [`with_allocator`](MapFactory::with_allocator), for any entry
    /// policy.
    #[must_use]
    pub fn with_info_allocator(allocator: &'a BumpPtrAllocator, canonicalize: bool) -> Self {
        MapFactory {
            tree: TreeFactory::with_allocator(allocator),
            canonicalize,
            _marker: PhantomData,
        }
    }

    pub fn empty_map(&self) -> ImmutableMap<'_, K, V, I> {
        ImmutableMap::from_root(TreeRoot::empty(&self.tree))
    }

    /// Returns `old` with `key` bound to `data`, replacing any previous
    /// binding.
    ///
    /// # Panics
    ///
    /// Panics if `old` was built by another factory.
    #[must_use]
    pub fn add<'f>(
        &'f self,
        old: &ImmutableMap<'f, K, V, I>,
        key: K,
        data: V,
    ) -> ImmutableMap<'f, K, V, I> {
        ImmutableMap::from_root(self.tree.add(&old.root, (key, data), self.canonicalize))
    }

    /// Returns `old` without a binding for `key`.
    ///
    /// # Panics
    ///
    /// Panics if `old` was built by another factory.
    #[must_use]
    pub fn remove<'f>(
        &'f self,
        old: &ImmutableMap<'f, K, V, I>,
        key: &K,
    ) -> ImmutableMap<'f, K, V, I> {
        ImmutableMap::from_root(self.tree.remove(&old.root, key, self.canonicalize))
    }

    pub fn tree_factory(&self) -> &TreeFactory<'a, I> {
        &self.tree
    }

    pub fn canonicalizes(&self) -> bool {
        self.canonicalize
    }
}

impl<K, V, I> fmt::Debug for MapFactory<'_, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFactory")
            .field("tree", &self.tree)
            .field("canonicalize", &self.canonicalize)
            .finish()
    }
}

/// Read-only operations shared by [`ImmutableMap`] and [`ImmutableMapRef`].
macro_rules! map_queries {
    () => {
        pub fn contains(&self, key: &K) -> bool {
            self.root.contains(key)
        }

        /// Data bound to `key`.
        pub fn lookup(&self, key: &K) -> Option<&V> {
            self.root.find(key).map(|(_, data)| data)
        }

        /// The entry for `key`.
        pub fn find(&self, key: &K) -> Option<(&K, &V)> {
            self.root.find(key).map(|(key, data)| (key, data))
        }

        /// The entry with the largest key.
        pub fn max_element(&self) -> Option<(&K, &V)> {
            self.root.max_element().map(|(key, data)| (key, data))
        }

        pub fn is_empty(&self) -> bool {
            self.root.is_empty()
        }

        pub fn is_singleton(&self) -> bool {
            self.root.is_singleton()
        }

        /// Number of entries. Walks the whole tree.
        pub fn len(&self) -> usize {
            self.root.len()
        }

        pub fn height(&self) -> u32 {
            self.root.height()
        }

        pub fn root(&self) -> Option<NodeId> {
            self.root.id()
        }

        pub fn iter(&self) -> MapIter<'_, K, V, I> {
            MapIter {
                inner: self.root.iter(),
                _marker: PhantomData,
            }
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
            self.iter().map(|(key, _)| key)
        }

        pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
            self.iter().map(|(_, data)| data)
        }

        pub fn cursor(&self) -> Cursor<'_, I> {
            self.root.cursor()
        }

        pub fn for_each<F: FnMut(&K, &V)>(&self, mut f: F) {
            self.iter().for_each(|(key, data)| f(key, data));
        }

        pub fn digest(&self) -> u32 {
            self.root.digest()
        }

        pub fn is_canonical(&self) -> bool {
            self.root.is_canonical()
        }

        /// Checks the tree's balance and ordering and returns its height.
        ///
        /// # Errors
        ///
        /// Returns the first [`ValidationError`] found.
        pub fn validate_tree(&self) -> Result<u32, ValidationError> {
            self.root.validate()
        }
    };
}

/// Common trait impls for a map handle type.
macro_rules! map_impls {
    ($name:ident) => {
        impl<K, V, I> Clone for $name<'_, K, V, I>
        where
            I: ImutInfo<Value = (K, V), Key = K>,
        {
            fn clone(&self) -> Self {
                $name::from_root(self.root.clone())
            }
        }

        impl<'g, K, V, I> PartialEq<$name<'g, K, V, I>> for $name<'_, K, V, I>
        where
            I: ImutInfo<Value = (K, V), Key = K>,
        {
            fn eq(&self, other: &$name<'g, K, V, I>) -> bool {
                self.root.is_equal(&other.root)
            }
        }

        impl<K, V, I> Eq for $name<'_, K, V, I>
        where
            I: ImutInfo<Value = (K, V), Key = K>,
        {
        }

        impl<K, V, I> Hash for $name<'_, K, V, I>
        where
            I: ImutInfo<Value = (K, V), Key = K>,
        {
            fn hash<H: Hasher>(&self, state: &mut H) {
                state.write_u32(self.root.digest());
            }
        }

        impl<K, V, I> fmt::Debug for $name<'_, K, V, I>
        where
            K: fmt::Debug,
            V: fmt::Debug,
            I: ImutInfo<Value = (K, V), Key = K>,
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_map().entries(self.iter()).finish()
            }
        }

        impl<'s, K, V, I> IntoIterator for &'s $name<'_, K, V, I>
        where
            I: ImutInfo<Value = (K, V), Key = K>,
        {
            type Item = (&'s K, &'s V);
            type IntoIter = MapIter<'s, K, V, I>;

            fn into_iter(self) -> Self::IntoIter {
                self.iter()
            }
        }
    };
}

/// A persistent map ordered by key.
pub struct ImmutableMap<'f, K, V, I = ImutKeyValueInfo<K, V>>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    root: TreeRoot<'f, I>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'f, K, V, I> ImmutableMap<'f, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn from_root(root: TreeRoot<'f, I>) -> Self {
        ImmutableMap {
            root,
            _marker: PhantomData,
        }
    }

    map_queries!();
}

map_impls!(ImmutableMap);

/// A persistent map that carries its factory.
///
/// Adds and removes never canonicalize;
/// [`as_immutable_map`](Self::as_immutable_map) always does.
pub struct ImmutableMapRef<'f, K, V, I = ImutKeyValueInfo<K, V>>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    root: TreeRoot<'f, I>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'f, K, V, I> ImmutableMapRef<'f, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn from_root(root: TreeRoot<'f, I>) -> Self {
        ImmutableMapRef {
            root,
            _marker: PhantomData,
        }
    }

    pub fn empty(factory: &'f TreeFactory<'f, I>) -> Self {
        Self::from_root(TreeRoot::empty(factory))
    }

    #[must_use]
    pub fn add(&self, key: K, data: V) -> Self {
        Self::from_root(self.root.factory().add(&self.root, (key, data), false))
    }

    #[must_use]
    pub fn remove(&self, key: &K) -> Self {
        Self::from_root(self.root.factory().remove(&self.root, key, false))
    }

    pub fn factory(&self) -> &'f TreeFactory<'f, I> {
        self.root.factory()
    }

    /// Converts to a plain map holding the canonical root.
    pub fn as_immutable_map(&self) -> ImmutableMap<'f, K, V, I> {
        ImmutableMap::from_root(self.root.factory().canonicalize(&self.root))
    }

    map_queries!();
}

impl<'f, K, V, I> From<ImmutableMap<'f, K, V, I>> for ImmutableMapRef<'f, K, V, I>
where
    I: ImutInfo<Value = (K, V), Key = K>,
{
    fn from(map: ImmutableMap<'f, K, V, I>) -> Self {
        ImmutableMapRef::from_root(map.root)
    }
}

map_impls!(ImmutableMapRef);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_replace() {
        let factory = MapFactory::new();
        let m1 = factory.add(&factory.empty_map(), "a", 1);
        let m2 = factory.add(&m1, "a", 2);

        assert_eq!(m1.lookup(&"a"), Some(&1));
        assert_eq!(m2.lookup(&"a"), Some(&2));
        assert_eq!(m2.len(), 1);
        assert_ne!(m1, m2);
        assert_eq!(m2.find(&"a"), Some((&"a", &2)));
        assert_eq!(m2.lookup(&"b"), None);
    }

    #[test]
    fn test_keys_and_values() {
        let factory = MapFactory::new();
        let mut map = factory.empty_map();
        for (k, v) in [(3u32, 'c'), (1, 'a'), (2, 'b')] {
            map = factory.add(&map, k, v);
        }
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(map.values().copied().collect::<String>(), "abc");
        assert_eq!(map.max_element(), Some((&3, &'c')));
        assert_eq!(format!("{map:?}"), "{1: 'a', 2: 'b', 3: 'c'}");
    }

    #[test]
    fn test_map_ref_round_trip() {
        let factory = MapFactory::<u32, u32>::new();
        let m = ImmutableMapRef::empty(factory.tree_factory())
            .add(1, 10)
            .add(2, 20);
        assert_eq!(m.lookup(&2), Some(&20));

        let canonical = m.as_immutable_map();
        assert!(canonical.is_canonical());
        assert_eq!(canonical.lookup(&1), Some(&10));

        let back = ImmutableMapRef::from(canonical.clone());
        assert_eq!(back.remove(&1).len(), 1);
        assert_eq!(canonical.len(), 2);
    }

    #[test]
    fn test_for_each() {
        let factory = MapFactory::new();
        let map = factory.add(&factory.add(&factory.empty_map(), 2u8, 4u8), 1, 2);
        let mut total = 0u32;
        map.for_each(|k, v| total += u32::from(*k) * u32::from(*v));
        assert_eq!(total, 2 + 8);
    }
}
