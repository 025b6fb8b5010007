//! Memory management infrastructure for the polar compiler containers.
//!
//! This crate provides the allocation layer that persistent containers and
//! syntax arenas are built on:
//!
//! - **Slab allocation**: [`SlabAllocator`] / [`BumpPtrAllocator`], a
//!   monotonic bump-pointer allocator that carves requests out of growing
//!   slabs and gives oversized requests their own custom-sized slab
//! - **Array recycling**: [`ArrayRecycler`], power-of-two size-classed free
//!   lists layered over any [`Allocator`]
//! - **System allocation**: [`MallocAllocator`], the default backing store
//!
//! Nothing here is thread-safe: allocators use plain `Cell`s and are meant
//! to be owned by one compilation phase at a time.

pub mod allocator;
pub mod error;
pub mod recycler;
pub mod slab;

pub use allocator::{Allocator, MallocAllocator};
pub use error::{AllocError, Result};
pub use recycler::{ArrayRecycler, Capacity};
pub use slab::{BumpPtrAllocator, SlabAllocator, SlabConfig};
