//! Element traits that parameterize the tree.
//!
//! A tree stores `Value`s. For sets the value is the element itself; for
//! maps it is a `(key, data)` pair. [`ImutInfo`] tells the tree how to pull
//! the key and data out of a value, how to order and compare keys, and how
//! to hash a value into the 32-bit profile used for canonicalization.

use std::hash::Hash;
use std::marker::PhantomData;

/// Describes how tree values are keyed, compared and profiled.
pub trait ImutInfo {
    /// The stored element.
    type Value: Clone;
    /// The part of a value that orders it in the tree.
    type Key: ?Sized;
    /// The payload compared when keys are equal. `()` for sets.
    type Data: ?Sized;

    fn key_of(value: &Self::Value) -> &Self::Key;

    fn data_of(value: &Self::Value) -> &Self::Data;

    fn is_equal(lhs: &Self::Key, rhs: &Self::Key) -> bool;

    fn is_less(lhs: &Self::Key, rhs: &Self::Key) -> bool;

    fn is_data_equal(lhs: &Self::Data, rhs: &Self::Data) -> bool;

    /// Hash of a whole value. Equal values must profile equally.
    fn profile(value: &Self::Value) -> u32;

    /// Key and data both equal.
    fn is_element_equal(lhs: &Self::Value, rhs: &Self::Value) -> bool {
        Self::is_equal(Self::key_of(lhs), Self::key_of(rhs))
            && Self::is_data_equal(Self::data_of(lhs), Self::data_of(rhs))
    }
}

/// Set elements: the value is its own key and carries no data.
pub struct ImutContainerInfo<T>(PhantomData<fn() -> T>);

impl<T: Ord + Hash + Clone> ImutInfo for ImutContainerInfo<T> {
    type Value = T;
    type Key = T;
    type Data = ();

    #[inline]
    fn key_of(value: &T) -> &T {
        value
    }

    #[inline]
    fn data_of(_: &T) -> &() {
        &()
    }

    #[inline]
    fn is_equal(lhs: &T, rhs: &T) -> bool {
        lhs == rhs
    }

    #[inline]
    fn is_less(lhs: &T, rhs: &T) -> bool {
        lhs < rhs
    }

    #[inline]
    fn is_data_equal(_: &(), _: &()) -> bool {
        true
    }

    fn profile(value: &T) -> u32 {
        fxhash::hash32(value)
    }
}

/// Map entries: `(key, data)` pairs ordered by key.
pub struct ImutKeyValueInfo<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> ImutInfo for ImutKeyValueInfo<K, V>
where
    K: Ord + Hash + Clone,
    V: PartialEq + Hash + Clone,
{
    type Value = (K, V);
    type Key = K;
    type Data = V;

    #[inline]
    fn key_of(value: &(K, V)) -> &K {
        &value.0
    }

    #[inline]
    fn data_of(value: &(K, V)) -> &V {
        &value.1
    }

    #[inline]
    fn is_equal(lhs: &K, rhs: &K) -> bool {
        lhs == rhs
    }

    #[inline]
    fn is_less(lhs: &K, rhs: &K) -> bool {
        lhs < rhs
    }

    #[inline]
    fn is_data_equal(lhs: &V, rhs: &V) -> bool {
        lhs == rhs
    }

    fn profile(value: &(K, V)) -> u32 {
        fxhash::hash32(&(&value.0, &value.1))
    }
}
