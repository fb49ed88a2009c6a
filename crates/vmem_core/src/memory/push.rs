//! # Push Arena
//!
//! A bump allocator over one fixed reservation. Like a `Vec<u8>` whose
//! capacity is reserved up front, so growing never reallocates and pointers
//! into it stay put.

// SAFETY: Hands out raw pointers into committed pages of its own reservation.
#![allow(unsafe_code)]

use crate::config::AllocatorConfig;
use crate::error::AllocResult;
use crate::pages::{checked_round_up, DefaultPages, PageProvider, Reservation};
use std::mem;
use std::ptr::{self, NonNull};

/// Pattern written over freshly pushed bytes when debug fill is on.
pub const DEBUG_FILL_UNINIT: u8 = 0xCC;

/// Pattern written over bytes released by a rewind when debug fill is on.
pub const DEBUG_FILL_FREED: u8 = 0xDD;

/// A monotonic bump allocator backed by reserved pages.
///
/// Pages are committed as the top advances and decommitted when the arena
/// is rewound at least one page below its commit boundary.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Use one arena per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = PushArena::new(64 << 20, AllocatorConfig::default())?; // 64MB reserved
///
/// let mark = arena.size();
/// let header = arena.push_copy(Header { len: 3 })?;
/// let body = arena.push_slice(&[1u32, 2, 3])?;
///
/// // Drop everything pushed since `mark`, returning pages to the OS
/// arena.reset_to(mark);
/// ```
pub struct PushArena<P: PageProvider = DefaultPages> {
    /// Reserved range and commit boundary.
    reservation: Reservation<P>,
    /// Requested maximum size; the reservation may be larger by up to a page.
    limit: usize,
    /// Offset one past the last pushed byte.
    top: usize,
    /// Exhaustion policy and debug fill.
    config: AllocatorConfig,
}

impl PushArena<DefaultPages> {
    /// Reserves `max_size` bytes of address space for a new arena.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size` is zero or the address space cannot be
    /// reserved.
    pub fn new(max_size: usize, config: AllocatorConfig) -> AllocResult<Self> {
        Self::with_provider(DefaultPages::default(), max_size, config)
    }
}

impl<P: PageProvider> PushArena<P> {
    /// Creates an arena reserving `max_size` bytes from `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size` is zero or the provider cannot reserve
    /// the range.
    pub fn with_provider(provider: P, max_size: usize, config: AllocatorConfig) -> AllocResult<Self> {
        let reservation = Reservation::new(provider, max_size)?;
        Ok(Self { reservation, limit: max_size, top: 0, config })
    }

    /// Pushes `size` bytes aligned to `align` and returns their start.
    ///
    /// New bytes read as zero unless debug fill is on or they were pushed
    /// before and rewound without the page being decommitted.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::CapacityExceeded`](crate::AllocError::CapacityExceeded)
    /// if the push would run past the reservation and the policy is
    /// [`ExhaustionPolicy::ReturnError`](crate::ExhaustionPolicy::ReturnError).
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two, or on exhaustion under
    /// [`ExhaustionPolicy::Panic`](crate::ExhaustionPolicy::Panic).
    pub fn push(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");

        let base = self.reservation.base().as_ptr() as usize;
        let capacity = self.limit;

        // Align the address, not the offset, so alignments above the page size hold.
        let bounds = checked_round_up(base + self.top, align)
            .map(|addr| addr - base)
            .and_then(|start| Some((start, start.checked_add(size)?)));
        let (start, end) = match bounds {
            Some((start, end)) if end <= capacity => (start, end),
            Some((_, end)) => return self.config.exhausted(end, capacity),
            None => return self.config.exhausted(usize::MAX, capacity),
        };

        self.reservation.commit_to(end);
        self.debug_fill(self.top, end, DEBUG_FILL_UNINIT);
        self.top = end;

        Ok(self.reservation.ptr_at(start))
    }

    /// Pushes a copy of `value`.
    ///
    /// # Errors
    ///
    /// Same as [`push`](Self::push).
    pub fn push_copy<T: Copy>(&mut self, value: T) -> AllocResult<NonNull<T>> {
        let ptr = self.push(mem::size_of::<T>(), mem::align_of::<T>())?.cast::<T>();
        // SAFETY: freshly pushed, committed and suitably aligned.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Pushes a copy of `values` as one contiguous block.
    ///
    /// # Errors
    ///
    /// Same as [`push`](Self::push).
    pub fn push_slice<T: Copy>(&mut self, values: &[T]) -> AllocResult<NonNull<[T]>> {
        let ptr = self.push(mem::size_of_val(values), mem::align_of::<T>())?.cast::<T>();
        // SAFETY: freshly pushed block of exactly `values.len()` elements.
        unsafe { ptr::copy_nonoverlapping(values.as_ptr(), ptr.as_ptr(), values.len()) };
        Ok(NonNull::slice_from_raw_parts(ptr, values.len()))
    }

    /// Rewinds the top to `ptr`, an address previously at or below the top.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is outside `[base, top]`.
    pub fn reset(&mut self, ptr: *const u8) {
        let Some(offset) = self.reservation.offset_of(ptr).filter(|&offset| offset <= self.top) else {
            panic!("reset to {ptr:p} outside arena [{:p}, {:p}]", self.reservation.base(), self.top());
        };
        self.reset_to(offset);
    }

    /// Rewinds the top to `size` bytes from the base.
    ///
    /// Whole pages above the new top are returned to the OS.
    ///
    /// # Panics
    ///
    /// Panics if `size` is greater than the current size.
    pub fn reset_to(&mut self, size: usize) {
        assert!(size <= self.top, "reset to {size} above top {}", self.top);
        self.debug_fill(size, self.top, DEBUG_FILL_FREED);
        self.reservation.decommit_to(size);
        self.top = size;
    }

    /// Rewinds to empty and decommits every page.
    pub fn clear(&mut self) {
        self.reset_to(0);
    }

    /// Address one past the last pushed byte.
    #[inline]
    #[must_use]
    pub fn top(&self) -> NonNull<u8> {
        self.reservation.ptr_at(self.top)
    }

    /// Bytes pushed so far, including alignment padding.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.top
    }

    /// Whether nothing has been pushed.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.top == 0
    }

    /// Maximum size in bytes, as passed at construction.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.limit
    }

    /// Bytes left before the reservation is exhausted.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.limit - self.top
    }

    /// Committed bytes.
    #[inline]
    #[must_use]
    pub const fn commit_size(&self) -> usize {
        self.reservation.committed()
    }

    /// Everything pushed so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: [0, top) is committed, and committed bytes are always
        // initialized (zero-filled by commit or written since).
        unsafe { std::slice::from_raw_parts(self.reservation.base().as_ptr(), self.top) }
    }

    /// The page provider backing this arena.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> &P {
        self.reservation.provider()
    }

    /// The arena's configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    fn debug_fill(&mut self, from: usize, to: usize, pattern: u8) {
        if self.config.debug_fill && to > from {
            // SAFETY: [from, to) lies below the top, inside committed pages.
            unsafe { ptr::write_bytes(self.reservation.ptr_at(from).as_ptr(), pattern, to - from) };
        }
    }
}

impl<P: PageProvider> std::fmt::Debug for PushArena<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushArena")
            .field("size", &self.top)
            .field("committed", &self.reservation.committed())
            .field("capacity", &self.limit)
            .finish_non_exhaustive()
    }
}
