//! Persistent sets and maps for compiler analyses.
//!
//! Every container here is immutable: adding or removing an element yields
//! a new container that shares all untouched structure with the old one.
//! This makes it cheap to keep a separate version of a set or map at every
//! program point of a dataflow analysis.
//!
//! - [`ImmutableSet`] / [`SetFactory`]: ordered sets
//! - [`ImmutableMap`] / [`MapFactory`]: ordered maps
//! - [`ImmutableSetRef`] / [`ImmutableMapRef`]: the same containers with
//!   their factory attached
//! - [`TreeFactory`]: the shared persistent AVL tree underneath
//! - [`ImutInfo`]: how elements are ordered, compared and profiled; every
//!   set and map type takes one as an optional last type parameter
//!
//! Factories allocate nodes from a [`BumpPtrAllocator`], either their own or
//! one shared with other factories. A canonicalizing factory returns the
//! same root for equal contents, so equality of its sets is pointer
//! comparison.
//!
//! # Examples
//!
//! ```
//! use polar_adt::MapFactory;
//!
//! let factory = MapFactory::new();
//! let empty = factory.empty_map();
//! let map = factory.add(&empty, "x", 1);
//! let map = factory.add(&map, "y", 2);
//!
//! assert_eq!(map.lookup(&"y"), Some(&2));
//! assert_eq!(empty.lookup(&"y"), None);
//! ```
//!
//! [`BumpPtrAllocator`]: polar_mem::BumpPtrAllocator

pub mod config;
pub mod error;
pub mod info;
pub mod iter;
pub mod map;
pub mod node;
pub mod set;
pub mod tree;

pub use config::FactoryConfig;
pub use error::ValidationError;
pub use info::{ImutContainerInfo, ImutInfo, ImutKeyValueInfo};
pub use iter::{Cursor, Iter};
pub use map::{ImmutableMap, ImmutableMapRef, MapCursor, MapFactory, MapIter, MapTreeFactory};
pub use node::NodeId;
pub use set::{ImmutableSet, ImmutableSetRef, SetCursor, SetFactory, SetIter, SetTreeFactory};
pub use tree::TreeFactory;
