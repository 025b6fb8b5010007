//! Slab bump-pointer allocator.
//!
//! [`SlabAllocator`] hands out memory by bumping a cursor through the
//! current slab. When a request does not fit, a new slab is obtained from
//! the backing [`Allocator`]; requests larger than the configured threshold
//! get a dedicated custom-sized slab instead, so one huge allocation never
//! wastes the tail of a regular slab.
//!
//! Individual deallocation is a no-op. Memory comes back in bulk through
//! [`SlabAllocator::reset`] (keeps the first slab) or on drop.
//!
//! # Slab growth
//!
//! Slab `i` is `slab_size * 2^min(30, i / growth_delay)` bytes, so the slab
//! size doubles every `growth_delay` slabs. This keeps the slab count
//! logarithmic for allocators that live through a whole compilation.
//!
//! # Examples
//!
//! ```
//! use polar_mem::BumpPtrAllocator;
//!
//! let allocator = BumpPtrAllocator::new();
//!
//! let a = allocator.alloc(42u32);
//! let b = allocator.alloc(7u64);
//! *a += 1;
//!
//! assert_eq!(*a, 43);
//! assert_eq!(*b, 7);
//! assert_eq!(allocator.num_slabs(), 1);
//! assert_eq!(allocator.bytes_allocated(), 12);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use polar_log::{debug, info, trace};

use crate::allocator::{Allocator, MallocAllocator};
use crate::error::{AllocError, Result};

/// Alignment of every slab obtained from the backing allocator.
///
/// Matches the strictest fundamental alignment on common targets.
const SLAB_ALIGNMENT: usize = 16;

/// Largest padded request a `Layout` with [`SLAB_ALIGNMENT`] can describe.
const MAX_PADDED_SIZE: usize = isize::MAX as usize - (SLAB_ALIGNMENT - 1);

/// Largest growth exponent: slabs stop doubling at `slab_size * 2^30`.
const MAX_GROWTH_SHIFT: usize = 30;

/// Byte written over deallocated memory when the `poison` feature is on.
pub const POISON_BYTE: u8 = 0xCD;

/// Default slab size in bytes.
pub const DEFAULT_SLAB_SIZE: usize = 4096;

/// Default number of slabs allocated before the slab size doubles.
pub const DEFAULT_GROWTH_DELAY: usize = 128;

/// Sizing parameters for a [`SlabAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabConfig {
    /// Size of the first slab in bytes.
    pub slab_size: usize,
    /// Requests whose padded size exceeds this get a custom-sized slab.
    pub size_threshold: usize,
    /// Number of slabs allocated between each doubling of the slab size.
    pub growth_delay: usize,
    /// Extra bytes left unused after every allocation.
    pub red_zone: usize,
}

impl SlabConfig {
    /// Returns the default configuration: 4 KiB slabs, threshold equal to
    /// the slab size, doubling every 128 slabs, no red zone.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slab_size: DEFAULT_SLAB_SIZE,
            size_threshold: DEFAULT_SLAB_SIZE,
            growth_delay: DEFAULT_GROWTH_DELAY,
            red_zone: 0,
        }
    }

    /// Sets the slab size and pulls the threshold down to it if needed.
    #[must_use]
    pub const fn with_slab_size(mut self, slab_size: usize) -> Self {
        self.slab_size = slab_size;
        if self.size_threshold > slab_size {
            self.size_threshold = slab_size;
        }
        self
    }

    /// Sets the custom-slab threshold.
    #[must_use]
    pub const fn with_size_threshold(mut self, size_threshold: usize) -> Self {
        self.size_threshold = size_threshold;
        self
    }

    /// Sets how many slabs are allocated between doublings.
    #[must_use]
    pub const fn with_growth_delay(mut self, growth_delay: usize) -> Self {
        self.growth_delay = growth_delay;
        self
    }

    /// Sets the red zone appended to every allocation.
    #[must_use]
    pub const fn with_red_zone(mut self, red_zone: usize) -> Self {
        self.red_zone = red_zone;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if the slab size or growth delay
    /// is zero, or if the threshold exceeds the slab size.
    pub fn validate(&self) -> Result<()> {
        if self.slab_size == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "slab size must be non-zero",
            });
        }
        if self.size_threshold > self.slab_size {
            return Err(AllocError::InvalidConfig {
                reason: "size threshold exceeds slab size",
            });
        }
        if self.growth_delay == 0 {
            return Err(AllocError::InvalidConfig {
                reason: "growth delay must be non-zero",
            });
        }
        Ok(())
    }
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Size of the slab at `index`: doubles every `growth_delay` slabs.
#[inline]
fn slab_size_for(config: &SlabConfig, index: usize) -> usize {
    let shift = (index / config.growth_delay).min(MAX_GROWTH_SHIFT);
    config.slab_size << shift
}

/// Bytes needed to round `addr` up to a multiple of `alignment`.
#[inline(always)]
const fn offset_to_aligned(addr: usize, alignment: usize) -> usize {
    addr.wrapping_neg() & (alignment - 1)
}

/// Monotonic bump-pointer allocator over slabs from `A`.
///
/// Allocation goes through `&self`, so the allocator can be shared by
/// reference; [`reset`](Self::reset) needs `&mut self`, which statically
/// rules out resetting while anything still borrows allocations.
///
/// The allocator never runs destructors for values placed in it.
pub struct SlabAllocator<A: Allocator = MallocAllocator> {
    /// Bump cursor into the current slab. Null until the first slab exists.
    cur_ptr: Cell<*mut u8>,
    /// End of the current slab (exclusive).
    end: Cell<*mut u8>,
    /// Regular slabs, in allocation order.
    slabs: RefCell<Vec<NonNull<u8>>>,
    /// Dedicated slabs for oversized requests, with their sizes.
    custom_sized_slabs: RefCell<Vec<(NonNull<u8>, usize)>>,
    /// Sum of requested sizes since construction or the last reset.
    bytes_allocated: Cell<usize>,
    /// Padding appended to every allocation.
    red_zone: Cell<usize>,
    config: SlabConfig,
    allocator: A,
}

/// The slab allocator over the system allocator.
pub type BumpPtrAllocator = SlabAllocator<MallocAllocator>;

// SAFETY: the allocator exclusively owns its slabs; the raw pointers are
// never shared with another allocator instance. It stays `!Sync`.
unsafe impl<A: Allocator + Send> Send for SlabAllocator<A> {}

impl<A: Allocator + Default> SlabAllocator<A> {
    /// Creates an empty allocator with the default configuration.
    ///
    /// No slab is allocated until the first request.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(SlabConfig::new(), A::default())
    }

    /// Creates an empty allocator with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if `config` fails
    /// [`SlabConfig::validate`].
    pub fn with_config(config: SlabConfig) -> Result<Self> {
        Self::with_allocator(config, A::default())
    }
}

impl<A: Allocator + Default> Default for SlabAllocator<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> SlabAllocator<A> {
    /// Creates an empty allocator drawing slabs from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] if `config` fails
    /// [`SlabConfig::validate`].
    pub fn with_allocator(config: SlabConfig, allocator: A) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, allocator))
    }

    fn from_parts(config: SlabConfig, allocator: A) -> Self {
        Self {
            cur_ptr: Cell::new(ptr::null_mut()),
            end: Cell::new(ptr::null_mut()),
            slabs: RefCell::new(Vec::new()),
            custom_sized_slabs: RefCell::new(Vec::new()),
            bytes_allocated: Cell::new(0),
            red_zone: Cell::new(config.red_zone),
            config,
            allocator,
        }
    }

    /// Returns the backing allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &SlabConfig {
        &self.config
    }

    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// `alignment` must be a power of two. The returned memory is
    /// uninitialized and stays valid until [`reset`](Self::reset) or drop.
    ///
    /// # Panics
    ///
    /// In debug builds, panics on a non power-of-two alignment or if the
    /// padded size overflows. Exhaustion of the backing allocator is fatal.
    #[inline]
    pub fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment {alignment} is not a power of two"
        );

        // Only the requested size counts; padding and red zones do not.
        self.bytes_allocated.set(self.bytes_allocated.get() + size);

        let size_to_allocate = size + self.red_zone.get();
        let cur = self.cur_ptr.get();
        let adjustment = offset_to_aligned(cur.addr(), alignment);

        if !cur.is_null()
            && adjustment + size_to_allocate <= self.end.get().addr() - cur.addr()
        {
            // SAFETY: cur + adjustment + size_to_allocate <= end, all inside
            // the current slab.
            unsafe {
                let aligned = cur.add(adjustment);
                self.cur_ptr.set(aligned.add(size_to_allocate));
                return NonNull::new_unchecked(aligned);
            }
        }

        self.allocate_slow(size_to_allocate, alignment)
    }

    /// Checked variant of [`allocate`](Self::allocate).
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidAlignment`] for a zero or non power of
    /// two alignment, and [`AllocError::SizeOverflow`] if the padded request
    /// exceeds `isize::MAX`. A rejected request is not counted.
    pub fn try_allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>> {
        if !alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment { alignment });
        }

        let overflow = AllocError::SizeOverflow { size, alignment };
        let padded = size
            .checked_add(self.red_zone.get())
            .ok_or_else(|| overflow.clone())?;
        let padded = padded
            .checked_add(alignment - 1)
            .ok_or_else(|| overflow.clone())?;
        if padded > MAX_PADDED_SIZE {
            return Err(overflow);
        }

        Ok(self.allocate(size, alignment))
    }

    #[cold]
    #[inline(never)]
    fn allocate_slow(&self, size: usize, alignment: usize) -> NonNull<u8> {
        let padded_size = size + alignment - 1;

        if padded_size > self.config.size_threshold {
            let slab = self.allocator.allocate(padded_size, SLAB_ALIGNMENT);
            self.custom_sized_slabs.borrow_mut().push((slab, padded_size));
            debug!(
                "custom-sized slab of {} bytes for a {}-byte request",
                padded_size, size
            );

            let adjustment = offset_to_aligned(slab.addr().get(), alignment);
            // SAFETY: the slab holds size + alignment - 1 bytes, enough for
            // any adjustment below `alignment`.
            return unsafe { slab.add(adjustment) };
        }

        self.start_new_slab();

        let cur = self.cur_ptr.get();
        let adjustment = offset_to_aligned(cur.addr(), alignment);
        debug_assert!(
            adjustment + size <= self.end.get().addr() - cur.addr(),
            "a fresh slab must fit any request below the threshold"
        );

        // SAFETY: the fresh slab is at least `size_threshold` bytes, which
        // covers size + alignment - 1.
        unsafe {
            let aligned = cur.add(adjustment);
            self.cur_ptr.set(aligned.add(size));
            NonNull::new_unchecked(aligned)
        }
    }

    fn compute_slab_size(&self, index: usize) -> usize {
        slab_size_for(&self.config, index)
    }

    /// Allocates a new regular slab and moves the cursor into it.
    fn start_new_slab(&self) {
        let index = self.slabs.borrow().len();
        let size = self.compute_slab_size(index);
        let slab = self.allocator.allocate(size, SLAB_ALIGNMENT);

        self.slabs.borrow_mut().push(slab);
        self.cur_ptr.set(slab.as_ptr());
        // SAFETY: one past the end of a `size`-byte slab.
        self.end.set(unsafe { slab.as_ptr().add(size) });

        debug!("started slab #{} of {} bytes", index, size);
    }

    /// Marks memory as no longer used.
    ///
    /// Nothing is reclaimed. With the `poison` feature the region is
    /// overwritten with [`POISON_BYTE`] to make use-after-free visible.
    #[inline]
    pub fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        if cfg!(feature = "poison") {
            // SAFETY: the caller gives back `size` bytes it got from us.
            unsafe { ptr.as_ptr().write_bytes(POISON_BYTE, size) };
        }
    }

    /// Frees every custom-sized slab and every slab but the first, and
    /// rewinds the cursor to the start of the first slab.
    ///
    /// Cheap way to recycle one allocator across compilation phases.
    pub fn reset(&mut self) {
        self.deallocate_custom_sized_slabs();
        self.bytes_allocated.set(0);

        let slabs = self.slabs.get_mut();
        let Some(&first) = slabs.first() else {
            return;
        };

        for (index, slab) in slabs.iter().enumerate().skip(1) {
            let size = slab_size_for(&self.config, index);
            self.allocator.deallocate(*slab, size, SLAB_ALIGNMENT);
        }
        let released = slabs.len() - 1;
        slabs.truncate(1);

        self.cur_ptr.set(first.as_ptr());
        // SAFETY: the first slab is exactly `slab_size` bytes.
        self.end.set(unsafe { first.as_ptr().add(self.config.slab_size) });

        trace!("reset allocator, released {} slabs", released);
    }

    fn deallocate_custom_sized_slabs(&mut self) {
        for (slab, size) in self.custom_sized_slabs.get_mut().drain(..) {
            self.allocator.deallocate(slab, size, SLAB_ALIGNMENT);
        }
    }

    /// Number of regular slabs (custom-sized slabs are not counted).
    pub fn num_slabs(&self) -> usize {
        self.slabs.borrow().len()
    }

    /// Number of custom-sized slabs.
    pub fn num_custom_slabs(&self) -> usize {
        self.custom_sized_slabs.borrow().len()
    }

    /// Total bytes obtained from the backing allocator.
    pub fn total_memory(&self) -> usize {
        let regular: usize = (0..self.num_slabs())
            .map(|index| self.compute_slab_size(index))
            .sum();
        let custom: usize = self
            .custom_sized_slabs
            .borrow()
            .iter()
            .map(|&(_, size)| size)
            .sum();
        regular + custom
    }

    /// Sum of requested sizes since construction or the last reset.
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    /// Sets the padding appended after each subsequent allocation.
    pub fn set_red_zone_size(&self, size: usize) {
        self.red_zone.set(size);
    }

    /// Returns a stable identifier for an address inside this allocator.
    ///
    /// Regular slabs map to non-negative offsets counted across all slabs
    /// in order; custom-sized slabs map to negative offsets starting at -1.
    /// Returns `None` if `ptr` does not point into any slab.
    pub fn identify_object(&self, ptr: *const u8) -> Option<i64> {
        let addr = ptr.addr();

        let mut in_slab_index = 0i64;
        for (index, slab) in self.slabs.borrow().iter().enumerate() {
            let start = slab.addr().get();
            let size = self.compute_slab_size(index);
            if addr >= start && addr < start + size {
                return Some(in_slab_index + (addr - start) as i64);
            }
            in_slab_index += size as i64;
        }

        let mut in_custom_index = -1i64;
        for &(slab, size) in self.custom_sized_slabs.borrow().iter() {
            let start = slab.addr().get();
            if addr >= start && addr < start + size {
                return Some(in_custom_index - (addr - start) as i64);
            }
            in_custom_index -= size as i64;
        }

        None
    }

    /// Like [`identify_object`](Self::identify_object) for pointers known
    /// to come from this allocator.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is not inside any slab.
    pub fn identify_known_object(&self, ptr: *const u8) -> i64 {
        match self.identify_object(ptr) {
            Some(id) => id,
            None => panic!("{ptr:p} was not allocated by this allocator"),
        }
    }

    /// Identifier for an object of type `T`, scaled by its alignment so
    /// consecutive objects get dense identifiers.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is not inside any slab.
    pub fn identify_known_aligned_object<T>(&self, ptr: *const T) -> i64 {
        let out = self.identify_known_object(ptr.cast());
        let align = mem::align_of::<T>() as i64;
        debug_assert!(out % align == 0, "wrong alignment information");
        out / align
    }

    /// Moves `value` into the allocator and returns a reference to it.
    ///
    /// The value's destructor never runs.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        let ptr = self.allocate_array::<T>(1);
        // SAFETY: freshly allocated, aligned for T, never handed out before.
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Copies `s` into the allocator.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, s: &str) -> &mut str {
        let ptr = self.allocate(s.len(), 1);
        // SAFETY: `ptr` is valid for s.len() fresh bytes that do not overlap
        // `s`, and the copied bytes are valid UTF-8.
        unsafe {
            ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), s.len());
            let bytes = std::slice::from_raw_parts_mut(ptr.as_ptr(), s.len());
            std::str::from_utf8_unchecked_mut(bytes)
        }
    }

    /// Allocates uninitialized space for `count` values of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the byte size overflows `usize`.
    #[inline]
    pub fn allocate_array<T>(&self, count: usize) -> NonNull<T> {
        let Some(size) = mem::size_of::<T>().checked_mul(count) else {
            panic!("array of {count} elements overflows");
        };
        self.allocate(size, mem::align_of::<T>()).cast()
    }

    /// Typed counterpart of [`deallocate`](Self::deallocate).
    #[inline]
    pub fn deallocate_array<T>(&self, ptr: NonNull<T>, count: usize) {
        self.deallocate(ptr.cast(), mem::size_of::<T>() * count);
    }

    /// Logs a usage summary at info level.
    pub fn print_stats(&self) {
        let total = self.total_memory();
        let allocated = self.bytes_allocated();
        info!(
            "slab allocator: {} slabs, {} custom-sized slabs, {} bytes allocated, {} bytes reserved, {} bytes wasted",
            self.num_slabs(),
            self.num_custom_slabs(),
            allocated,
            total,
            total.saturating_sub(allocated)
        );
    }
}

impl<A: Allocator> Allocator for SlabAllocator<A> {
    const RECLAIMS_MEMORY: bool = false;

    #[inline]
    fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        SlabAllocator::allocate(self, size, alignment)
    }

    #[inline]
    fn deallocate(&self, ptr: NonNull<u8>, size: usize, _alignment: usize) {
        SlabAllocator::deallocate(self, ptr, size);
    }
}

impl<A: Allocator> Drop for SlabAllocator<A> {
    fn drop(&mut self) {
        self.deallocate_custom_sized_slabs();
        for (index, slab) in self.slabs.get_mut().iter().enumerate() {
            let size = slab_size_for(&self.config, index);
            self.allocator.deallocate(*slab, size, SLAB_ALIGNMENT);
        }
    }
}

impl<A: Allocator> fmt::Debug for SlabAllocator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("num_slabs", &self.num_slabs())
            .field("num_custom_slabs", &self.num_custom_slabs())
            .field("bytes_allocated", &self.bytes_allocated())
            .field("total_memory", &self.total_memory())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_allocations_share_one_slab() {
        let alloc = BumpPtrAllocator::new();

        let a = alloc.allocate_array::<i32>(1);
        let b = alloc.allocate_array::<i32>(10);
        let c = alloc.allocate_array::<i32>(1);

        unsafe {
            a.as_ptr().write(1);
            b.as_ptr().add(9).write(2);
            c.as_ptr().write(3);
        }
        assert_eq!(alloc.num_slabs(), 1);

        let moved = alloc;
        unsafe {
            assert_eq!(*a.as_ptr(), 1);
            assert_eq!(*b.as_ptr().add(9), 2);
            assert_eq!(*c.as_ptr(), 3);
            b.as_ptr().write(4);
            assert_eq!(*b.as_ptr(), 4);
        }
        assert_eq!(moved.num_slabs(), 1);
    }

    #[test]
    fn test_three_slabs() {
        let alloc = BumpPtrAllocator::new();

        alloc.allocate(3000, 1);
        assert_eq!(alloc.num_slabs(), 1);
        alloc.allocate(3000, 1);
        assert_eq!(alloc.num_slabs(), 2);
        alloc.allocate(3000, 1);
        assert_eq!(alloc.num_slabs(), 3);
        assert_eq!(alloc.bytes_allocated(), 9000);
    }

    #[test]
    fn test_alignment() {
        let alloc = BumpPtrAllocator::new();

        for alignment in [1usize, 2, 4, 8, 16, 32, 64, 128, 1024] {
            // Misalign the cursor first.
            alloc.allocate(1, 1);
            let ptr = alloc.allocate(8, alignment);
            assert_eq!(ptr.addr().get() % alignment, 0, "alignment {alignment}");
        }
    }

    #[test]
    fn test_alignment_past_slab() {
        let alloc = BumpPtrAllocator::new();
        alloc.allocate(4095, 1);

        // The cursor sits at offset 4095; aligning to 2 leaves no room.
        alloc.allocate(1, 2);
        assert_eq!(alloc.num_slabs(), 2);
    }

    #[test]
    fn test_slab_exactly_filled() {
        let alloc = BumpPtrAllocator::new();
        alloc.allocate(4096, 1);
        assert_eq!(alloc.num_slabs(), 1);
        alloc.allocate(4096, 1);
        assert_eq!(alloc.num_slabs(), 2);
        assert_eq!(alloc.num_custom_slabs(), 0);
    }

    #[test]
    fn test_huge_allocation_uses_custom_slab() {
        let alloc = BumpPtrAllocator::new();
        alloc.allocate(16, 8);
        let before = alloc.total_memory();

        let big = alloc.allocate(8192, 8);
        unsafe { big.as_ptr().write_bytes(7, 8192) };

        assert_eq!(alloc.num_slabs(), 1);
        assert_eq!(alloc.num_custom_slabs(), 1);
        assert_eq!(alloc.total_memory(), before + 8192 + 7);

        // The cursor is untouched by the custom slab.
        let small = alloc.allocate(16, 8);
        assert_eq!(alloc.identify_object(small.as_ptr()), Some(16));
    }

    #[test]
    fn test_large_alignment_goes_to_custom_slab() {
        let alloc = BumpPtrAllocator::new();
        let ptr = alloc.allocate(64, 4096);

        assert_eq!(ptr.addr().get() % 4096, 0);
        assert_eq!(alloc.num_slabs(), 0);
        assert_eq!(alloc.num_custom_slabs(), 1);
    }

    #[test]
    fn test_reset() {
        let mut alloc = BumpPtrAllocator::new();
        for _ in 0..5 {
            alloc.allocate(3000, 1);
        }
        alloc.allocate(10_000, 1);
        assert_eq!(alloc.num_slabs(), 5);
        assert_eq!(alloc.num_custom_slabs(), 1);

        alloc.reset();
        assert_eq!(alloc.num_slabs(), 1);
        assert_eq!(alloc.num_custom_slabs(), 0);
        assert_eq!(alloc.bytes_allocated(), 0);
        assert_eq!(alloc.total_memory(), DEFAULT_SLAB_SIZE);

        // Allocation resumes at the start of the first slab.
        let ptr = alloc.allocate(4, 4);
        assert_eq!(alloc.identify_object(ptr.as_ptr()), Some(0));
    }

    #[test]
    fn test_reset_without_slabs() {
        let mut alloc = BumpPtrAllocator::new();
        alloc.reset();
        assert_eq!(alloc.num_slabs(), 0);
        assert_eq!(alloc.bytes_allocated(), 0);

        alloc.allocate(100_000, 8);
        alloc.reset();
        assert_eq!(alloc.num_slabs(), 0);
        assert_eq!(alloc.num_custom_slabs(), 0);
        assert_eq!(alloc.bytes_allocated(), 0);
    }

    #[test]
    fn test_slab_growth() {
        let config = SlabConfig::new().with_growth_delay(1);
        let alloc = BumpPtrAllocator::with_config(config).unwrap();

        alloc.allocate(4000, 1);
        alloc.allocate(4000, 1);
        alloc.allocate(4000, 1);
        alloc.allocate(4000, 1);

        assert_eq!(alloc.num_slabs(), 3);
        assert_eq!(alloc.total_memory(), 4096 + 8192 + 16384);
    }

    #[test]
    fn test_red_zone() {
        let alloc = BumpPtrAllocator::new();
        alloc.set_red_zone_size(16);

        let a = alloc.allocate(8, 8);
        let b = alloc.allocate(8, 8);
        assert_eq!(b.addr().get() - a.addr().get(), 24);
        assert_eq!(alloc.bytes_allocated(), 16);
    }

    #[test]
    fn test_identify_object() {
        let config = SlabConfig::new().with_growth_delay(1);
        let alloc = BumpPtrAllocator::with_config(config).unwrap();

        let a = alloc.allocate(4000, 1);
        let b = alloc.allocate(4000, 1);
        let huge = alloc.allocate(20_000, 1);

        assert_eq!(alloc.identify_object(a.as_ptr()), Some(0));
        assert_eq!(alloc.identify_object(b.as_ptr()), Some(4096));
        assert_eq!(alloc.identify_object(huge.as_ptr()), Some(-1));
        assert_eq!(
            alloc.identify_object(unsafe { huge.as_ptr().add(10) }),
            Some(-11)
        );

        let outside = 0u64;
        assert_eq!(alloc.identify_object(ptr::from_ref(&outside).cast()), None);
    }

    #[test]
    fn test_identify_known_aligned_object() {
        let alloc = BumpPtrAllocator::new();
        let first = alloc.allocate_array::<u64>(1);
        let second = alloc.allocate_array::<u64>(1);

        assert_eq!(alloc.identify_known_aligned_object(first.as_ptr()), 0);
        assert_eq!(alloc.identify_known_aligned_object(second.as_ptr()), 1);
    }

    #[test]
    #[should_panic(expected = "was not allocated by this allocator")]
    fn test_identify_known_object_panics_on_foreign_pointer() {
        let alloc = BumpPtrAllocator::new();
        alloc.allocate(8, 8);
        let outside = 0u8;
        alloc.identify_known_object(&outside);
    }

    #[test]
    fn test_try_allocate_errors() {
        let alloc = BumpPtrAllocator::new();

        assert_eq!(
            alloc.try_allocate(8, 3),
            Err(AllocError::InvalidAlignment { alignment: 3 })
        );
        assert_eq!(
            alloc.try_allocate(8, 0),
            Err(AllocError::InvalidAlignment { alignment: 0 })
        );
        assert_eq!(
            alloc.try_allocate(usize::MAX, 8),
            Err(AllocError::SizeOverflow {
                size: usize::MAX,
                alignment: 8
            })
        );
        assert_eq!(
            alloc.try_allocate(usize::MAX / 2, 8),
            Err(AllocError::SizeOverflow {
                size: usize::MAX / 2,
                alignment: 8
            })
        );
        assert_eq!(
            alloc.try_allocate(isize::MAX as usize - 4, 1),
            Err(AllocError::SizeOverflow {
                size: isize::MAX as usize - 4,
                alignment: 1
            })
        );
        assert_eq!(alloc.bytes_allocated(), 0);
        assert_eq!(alloc.num_slabs(), 0);

        let ptr = alloc.try_allocate(24, 8).unwrap();
        assert_eq!(ptr.addr().get() % 8, 0);
        assert_eq!(alloc.bytes_allocated(), 24);
    }

    #[test]
    fn test_config_validation() {
        assert!(SlabConfig::new().validate().is_ok());
        assert!(matches!(
            BumpPtrAllocator::with_config(SlabConfig::new().with_slab_size(0)),
            Err(AllocError::InvalidConfig { .. })
        ));
        assert!(matches!(
            BumpPtrAllocator::with_config(
                SlabConfig::new().with_size_threshold(8192)
            ),
            Err(AllocError::InvalidConfig { .. })
        ));
        assert!(matches!(
            BumpPtrAllocator::with_config(SlabConfig::new().with_growth_delay(0)),
            Err(AllocError::InvalidConfig { .. })
        ));

        // Shrinking the slab drags the threshold along.
        let config = SlabConfig::new().with_slab_size(1024);
        assert_eq!(config.size_threshold, 1024);
    }

    #[test]
    fn test_small_threshold() {
        let config = SlabConfig::new().with_size_threshold(256);
        let alloc = BumpPtrAllocator::with_config(config).unwrap();

        // Nothing to bump into yet, and 300 is over the threshold.
        alloc.allocate(300, 1);
        assert_eq!(alloc.num_slabs(), 0);
        assert_eq!(alloc.num_custom_slabs(), 1);

        alloc.allocate(200, 1);
        assert_eq!(alloc.num_slabs(), 1);

        // Fits the remaining space even though it is over the threshold.
        alloc.allocate(300, 1);
        assert_eq!(alloc.num_slabs(), 1);
        assert_eq!(alloc.num_custom_slabs(), 1);

        alloc.allocate(4000, 1);
        assert_eq!(alloc.num_slabs(), 1);
        assert_eq!(alloc.num_custom_slabs(), 2);
    }

    #[test]
    fn test_typed_helpers() {
        let alloc = BumpPtrAllocator::new();

        let value = alloc.alloc(String::from("kept"));
        value.push('!');
        assert_eq!(value, "kept!");
        // Destructors never run; reclaim the heap buffer by hand.
        drop(mem::take(value));

        let s = alloc.alloc_str("identifier");
        assert_eq!(s, "identifier");
        s.make_ascii_uppercase();
        assert_eq!(s, "IDENTIFIER");
    }

    #[test]
    fn test_nested_slab_allocator() {
        let outer = BumpPtrAllocator::new();
        let inner =
            SlabAllocator::with_allocator(SlabConfig::new().with_slab_size(512), &outer)
                .unwrap();

        inner.allocate(100, 8);
        inner.allocate(500, 8);
        assert_eq!(inner.num_slabs(), 2);
        assert_eq!(outer.bytes_allocated(), 1024);
    }

    #[cfg(feature = "poison")]
    #[test]
    fn test_deallocate_poisons() {
        let alloc = BumpPtrAllocator::new();
        let ptr = alloc.allocate(4, 4);
        unsafe { ptr.as_ptr().write_bytes(0, 4) };

        alloc.deallocate(ptr, 4);
        assert_eq!(unsafe { *ptr.as_ptr() }, POISON_BYTE);
    }
}
