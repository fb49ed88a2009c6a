//! # Reservation
//!
//! One reserved address range plus its commit boundary.
//!
//! ```text
//! base                 base+committed                     base+len
//!  |==== committed =====|-------------- reserved ---------------|
//! ```
//!
//! Callers address the range by byte offset. `committed` is always a whole
//! number of pages and never exceeds `len`. The range is released exactly
//! once, on drop.

// SAFETY: Owns a raw address range handed out by a page provider.
#![allow(unsafe_code)]

use super::{checked_round_up, PageProvider};
use crate::error::{AllocError, AllocResult};
use std::ptr::NonNull;

/// An owned reservation of page-granular address space.
pub struct Reservation<P: PageProvider> {
    provider: P,
    base: NonNull<u8>,
    len: usize,
    committed: usize,
    page_size: usize,
}

impl<P: PageProvider> Reservation<P> {
    /// Reserves at least `size` bytes, rounded up to whole pages. Nothing is
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] for a zero or overflowing size or
    /// a provider with a bad page size, and [`AllocError::Reserve`] if the
    /// provider cannot reserve the range.
    pub fn new(provider: P, size: usize) -> AllocResult<Self> {
        let page_size = provider.page_size();
        if !page_size.is_power_of_two() {
            return Err(AllocError::InvalidConfig(format!(
                "page size {page_size} is not a power of two"
            )));
        }
        if size == 0 {
            return Err(AllocError::InvalidConfig("reservation size must be non-zero".into()));
        }
        let len = checked_round_up(size, page_size).ok_or_else(|| {
            AllocError::InvalidConfig(format!("reservation size {size} overflows"))
        })?;

        let base = {
            let _span = tracing::trace_span!("reserve_address_space", len).entered();
            provider
                .reserve(len)
                .map_err(|source| AllocError::Reserve { size: len, source })?
        };
        tracing::debug!(base = ?base, len, page_size, "reserved address space");

        Ok(Self { provider, base, len, committed: 0, page_size })
    }

    /// The page provider backing this reservation.
    #[inline]
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Base address of the range.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Reserved size in bytes (whole pages).
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always `false`; reservations are never empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Committed prefix in bytes (whole pages).
    #[inline]
    #[must_use]
    pub const fn committed(&self) -> usize {
        self.committed
    }

    /// Page size of the provider.
    #[inline]
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Address of the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the reservation.
    #[inline]
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.len, "offset {offset:#x} outside reservation of {:#x}", self.len);
        // SAFETY: offset is within (or one past) the reserved range.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Offset of `ptr` from the base, if it lies within `[base, base+len]`.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
        (offset <= self.len).then_some(offset)
    }

    /// Makes sure `[0, end)` is committed, committing whole pages up to the
    /// page-rounded `end`. Returns the number of newly committed bytes.
    ///
    /// # Panics
    ///
    /// Panics if `end` is past the reservation or the provider fails to
    /// commit; the allocator cannot continue without the memory.
    pub fn commit_to(&mut self, end: usize) -> usize {
        if end <= self.committed {
            return 0;
        }
        assert!(end <= self.len, "commit to {end:#x} outside reservation of {:#x}", self.len);
        let new_committed = checked_round_up(end, self.page_size).unwrap_or(self.len);
        let size = new_committed - self.committed;

        {
            let _span = tracing::trace_span!("commit_pages", offset = self.committed, size).entered();
            let ptr = self.ptr_at(self.committed);
            // SAFETY: page-aligned range inside our reservation.
            if let Err(e) = unsafe { self.provider.commit(ptr, size) } {
                panic!("failed to commit {size} bytes at offset {:#x}: {e}", self.committed);
            }
        }
        tracing::debug!(from = self.committed, to = new_committed, "commit boundary raised");
        self.committed = new_committed;
        size
    }

    /// Decommits every page above the page-rounded `end`, if there is at
    /// least one. Returns the number of decommitted bytes.
    ///
    /// Both bounds are page-aligned, so any decommit frees at least one page.
    ///
    /// # Panics
    ///
    /// Panics if the provider fails to decommit.
    pub fn decommit_to(&mut self, end: usize) -> usize {
        let new_committed = checked_round_up(end, self.page_size).unwrap_or(self.len);
        if new_committed >= self.committed {
            return 0;
        }
        let size = self.committed - new_committed;

        {
            let _span = tracing::trace_span!("decommit_pages", offset = new_committed, size).entered();
            let ptr = self.ptr_at(new_committed);
            // SAFETY: page-aligned range inside our reservation; the owning
            // allocator holds no references above `end`.
            if let Err(e) = unsafe { self.provider.decommit(ptr, size) } {
                panic!("failed to decommit {size} bytes at offset {new_committed:#x}: {e}");
            }
        }
        tracing::debug!(from = self.committed, to = new_committed, "commit boundary lowered");
        self.committed = new_committed;
        size
    }
}

impl<P: PageProvider> Drop for Reservation<P> {
    fn drop(&mut self) {
        let _span = tracing::trace_span!("release_address_space", len = self.len).entered();
        // SAFETY: base/len is our reservation and this is the only release.
        if let Err(e) = unsafe { self.provider.release(self.base, self.len) } {
            tracing::error!(base = ?self.base, len = self.len, "failed to release address space: {e}");
        }
    }
}

impl<P: PageProvider> std::fmt::Debug for Reservation<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("committed", &self.committed)
            .field("page_size", &self.page_size)
            .finish()
    }
}

// SAFETY: The reservation exclusively owns its range; moving it to another
// thread moves that ownership along with the provider.
unsafe impl<P: PageProvider + Send> Send for Reservation<P> {}
