//! # Page Providers
//!
//! The five operations every allocator in this crate is built on: query the
//! page size, reserve and release an address range, commit and decommit
//! page-aligned sub-ranges of it.
//!
//! ## Providers
//!
//! - [`OsPages`] - real virtual memory (unix only)
//! - [`HeapPages`] - portable, instrumented provider with a chosen page size
//!
//! Allocators never talk to a provider directly; they go through a
//! [`Reservation`], which owns the range and tracks the commit boundary.

use std::io;
use std::ptr::NonNull;

mod heap;
#[cfg(unix)]
mod os;
mod reservation;

pub use heap::{HeapPages, DECOMMIT_FILL};
#[cfg(unix)]
pub use os::{os_page_size, OsPages};
pub use reservation::Reservation;

/// Provider used by the `new` constructors.
#[cfg(unix)]
pub type DefaultPages = OsPages;

/// Provider used by the `new` constructors.
#[cfg(not(unix))]
pub type DefaultPages = HeapPages;

/// Source of reserved, page-granular memory.
///
/// `reserve` hands out an inaccessible range; only committed sub-ranges may be
/// read or written. Committed memory reads as zero until written.
// SAFETY: Declares the raw page operations; callers uphold the range contracts.
#[allow(unsafe_code)]
pub trait PageProvider {
    /// Page size in bytes. Must be a power of two and constant for the
    /// provider's lifetime.
    fn page_size(&self) -> usize;

    /// Reserves `size` bytes of address space with no backing memory.
    ///
    /// `size` is a non-zero multiple of [`page_size`](Self::page_size). The
    /// returned base is page-aligned.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the range cannot be reserved.
    fn reserve(&self, size: usize) -> io::Result<NonNull<u8>>;

    /// Releases a whole reservation.
    ///
    /// # Safety
    ///
    /// `base` and `size` must be exactly a pair returned by / passed to
    /// [`reserve`](Self::reserve) on this provider, released only once, and
    /// no pointer into the range may be used afterwards.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the range cannot be released.
    unsafe fn release(&self, base: NonNull<u8>, size: usize) -> io::Result<()>;

    /// Backs `[ptr, ptr+size)` with zero-filled read/write memory.
    ///
    /// # Safety
    ///
    /// The range must be page-aligned and lie inside a live reservation of
    /// this provider.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the pages cannot be committed.
    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()>;

    /// Returns the backing memory of `[ptr, ptr+size)` to the OS, keeping the
    /// address range reserved. Contents are undefined afterwards.
    ///
    /// # Safety
    ///
    /// The range must be page-aligned, lie inside a live reservation of this
    /// provider, and no reference into it may be live.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the pages cannot be decommitted.
    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()>;
}

/// Rounds `value` up to a multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn checked_round_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
