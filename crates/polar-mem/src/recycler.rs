//! Size-classed recycling of array allocations.
//!
//! [`ArrayRecycler`] keeps one intrusive free list per power-of-two
//! [`Capacity`]. Freed arrays are threaded onto the list through their first
//! word and handed back, most recently freed first, by the next allocation
//! of the same capacity. The recycler never owns memory: arrays come from
//! and return to a caller-supplied [`Allocator`], and the owner must call
//! [`ArrayRecycler::clear`] before dropping the recycler.
//!
//! # Examples
//!
//! ```
//! use polar_mem::{ArrayRecycler, BumpPtrAllocator, Capacity};
//!
//! let allocator = BumpPtrAllocator::new();
//! let mut recycler = ArrayRecycler::<u64>::new();
//! let cap = Capacity::get(6);
//! assert_eq!(cap.size(), 8);
//!
//! let first = recycler.allocate(cap, &allocator);
//! unsafe { recycler.deallocate(cap, first) };
//! let again = recycler.allocate(cap, &allocator);
//! assert_eq!(first, again);
//!
//! recycler.clear(&allocator);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use polar_log::trace;

use crate::allocator::Allocator;
use crate::slab::POISON_BYTE;

/// A power-of-two array size class, stored as its base-2 logarithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(u8);

impl Capacity {
    /// Smallest capacity holding at least `n` elements.
    ///
    /// `get(0)` and `get(1)` are both the single-element class.
    #[must_use]
    pub const fn get(n: usize) -> Self {
        Capacity(n.next_power_of_two().trailing_zeros() as u8)
    }

    /// Number of elements in arrays of this capacity.
    #[must_use]
    pub const fn size(self) -> usize {
        1 << self.0
    }

    /// Free-list index for this capacity.
    #[must_use]
    pub const fn bucket(self) -> usize {
        self.0 as usize
    }

    /// Next larger capacity, for amortized growth.
    #[must_use]
    pub const fn next(self) -> Self {
        Capacity(self.0 + 1)
    }
}

/// Link stored in the first word of a recycled array.
struct FreeList {
    next: Option<NonNull<FreeList>>,
}

/// Recycles arrays of `T` by capacity.
///
/// `T` must be at least as large and as aligned as a pointer; this is
/// checked at compile time when the recycler is created.
pub struct ArrayRecycler<T> {
    /// Free list heads, indexed by [`Capacity::bucket`].
    bucket: Vec<Option<NonNull<FreeList>>>,
    _marker: PhantomData<*mut T>,
}

impl<T> ArrayRecycler<T> {
    const ALIGN: usize = mem::align_of::<T>();

    const FITS_FREE_LIST: () = assert!(
        mem::size_of::<T>() >= mem::size_of::<FreeList>()
            && mem::align_of::<T>() >= mem::align_of::<FreeList>(),
        "array elements must be able to hold a free-list link"
    );

    /// Creates an empty recycler.
    #[must_use]
    pub const fn new() -> Self {
        let () = Self::FITS_FREE_LIST;
        Self {
            bucket: Vec::new(),
            _marker: PhantomData,
        }
    }

    fn pop(&mut self, index: usize) -> Option<NonNull<T>> {
        let head = (*self.bucket.get(index)?)?;
        // SAFETY: every entry was written by `push` and is still owned by
        // this recycler.
        self.bucket[index] = unsafe { head.as_ref().next };
        Some(head.cast())
    }

    /// # Safety
    ///
    /// `ptr` must be valid for writes of `Capacity(index).size()` elements.
    unsafe fn push(&mut self, index: usize, ptr: NonNull<T>) {
        if index >= self.bucket.len() {
            self.bucket.resize(index + 1, None);
        }

        if cfg!(feature = "poison") {
            let bytes = mem::size_of::<T>() << index;
            let link = mem::size_of::<FreeList>();
            // SAFETY: the array spans `bytes` bytes; only the tail past the
            // link is overwritten.
            unsafe {
                ptr.cast::<u8>()
                    .as_ptr()
                    .add(link)
                    .write_bytes(POISON_BYTE, bytes - link);
            }
        }

        let entry = ptr.cast::<FreeList>();
        // SAFETY: T is at least pointer sized and aligned (FITS_FREE_LIST).
        unsafe {
            entry.as_ptr().write(FreeList {
                next: self.bucket[index],
            });
        }
        self.bucket[index] = Some(entry);
    }

    /// Returns an uninitialized array of `capacity.size()` elements,
    /// reusing the most recently freed array of that capacity if any.
    pub fn allocate<A: Allocator>(&mut self, capacity: Capacity, allocator: &A) -> NonNull<T> {
        if let Some(ptr) = self.pop(capacity.bucket()) {
            trace!("recycled array of capacity {}", capacity.size());
            return ptr;
        }

        let size = mem::size_of::<T>() * capacity.size();
        allocator.allocate(size, Self::ALIGN).cast()
    }

    /// Makes `ptr` available to later allocations of the same capacity.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) with
    /// the same `capacity`, must not be used afterwards, and must not
    /// already be on a free list. Any values in it are not dropped.
    pub unsafe fn deallocate(&mut self, capacity: Capacity, ptr: NonNull<T>) {
        // SAFETY: forwarded from the caller.
        unsafe { self.push(capacity.bucket(), ptr) }
    }

    /// Empties every free list.
    ///
    /// Allocators that reclaim memory get each array back through
    /// [`Allocator::deallocate`]. Bump allocators cannot reuse the memory
    /// anyway, so the lists are simply dropped.
    pub fn clear<A: Allocator>(&mut self, allocator: &A) {
        if !A::RECLAIMS_MEMORY {
            self.bucket.clear();
            return;
        }

        while let Some(index) = self.bucket.len().checked_sub(1) {
            let size = mem::size_of::<T>() << index;
            while let Some(ptr) = self.pop(index) {
                allocator.deallocate(ptr.cast(), size, Self::ALIGN);
            }
            self.bucket.pop();
        }
    }

    /// Returns true if no array is waiting for reuse.
    pub fn is_empty(&self) -> bool {
        self.bucket.iter().all(Option::is_none)
    }
}

impl<T> Default for ArrayRecycler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ArrayRecycler<T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.is_empty(),
                "non-empty ArrayRecycler deleted; call clear() first"
            );
        }
    }
}

impl<T> fmt::Debug for ArrayRecycler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRecycler")
            .field("buckets", &self.bucket.len())
            .field("is_empty", &self.is_empty())
            .finish()
    }
}
