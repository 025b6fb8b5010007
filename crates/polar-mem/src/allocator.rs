//! The allocator interface shared by slabs, recyclers and containers.
//!
//! [`Allocator`] is deliberately tiny: a raw `allocate(size, alignment)` and
//! a sized `deallocate`. Allocation takes `&self` so a single allocator can
//! be handed out by reference to several owners (for example several tree
//! factories sharing one [`BumpPtrAllocator`](crate::BumpPtrAllocator)).
//! Implementations use interior mutability and are not `Sync`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// A source of raw, aligned memory.
pub trait Allocator {
    /// Whether `deallocate` actually returns memory.
    ///
    /// Bump allocators set this to `false`; [`ArrayRecycler::clear`] then
    /// drops its free lists without handing every array back.
    ///
    /// [`ArrayRecycler::clear`]: crate::ArrayRecycler::clear
    const RECLAIMS_MEMORY: bool = true;

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a non-zero power of two. Failure to obtain memory
    /// is fatal.
    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8>;

    /// Releases memory previously returned by [`Allocator::allocate`] with
    /// the same `size` and `alignment`.
    fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize);
}

impl<A: Allocator + ?Sized> Allocator for &A {
    const RECLAIMS_MEMORY: bool = A::RECLAIMS_MEMORY;

    #[inline]
    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        (**self).allocate(size, alignment)
    }

    #[inline]
    fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        (**self).deallocate(ptr, size, alignment);
    }
}

/// Allocator backed by the global system allocator.
///
/// Zero-sized requests are rounded up to one byte so every call maps to a
/// real allocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct MallocAllocator;

impl MallocAllocator {
    fn layout(size: usize, alignment: usize) -> Layout {
        match Layout::from_size_align(size.max(1), alignment) {
            Ok(layout) => layout,
            Err(_) => panic!(
                "invalid layout: {size} bytes aligned to {alignment}"
            ),
        }
    }
}

impl Allocator for MallocAllocator {
    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        let layout = Self::layout(size, alignment);

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        }
    }

    fn deallocate(&self, ptr: NonNull<u8>, size: usize, alignment: usize) {
        let layout = Self::layout(size, alignment);

        // SAFETY: the caller passes back a pointer from `allocate` with the
        // same size and alignment, so the layouts match.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}
