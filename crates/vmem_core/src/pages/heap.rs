//! # Heap Page Provider
//!
//! A page provider that carves reservations out of the global allocator.
//!
//! Nothing is actually returned to the OS on decommit, but the provider
//! behaves like one from the allocator's point of view: commit zero-fills,
//! decommit scribbles over the pages, and every byte crossing the commit
//! boundary is counted. Tests use it to check the commit contract with an
//! exact page size on any host.

// SAFETY: Raw allocation and byte fills on ranges owned by this provider.
#![allow(unsafe_code)]

use super::PageProvider;
use std::alloc::{self, Layout};
use std::cell::Cell;
use std::io;
use std::ptr::{self, NonNull};

/// Byte pattern written over decommitted pages.
pub const DECOMMIT_FILL: u8 = 0xEE;

/// Instrumented page provider with a caller-chosen page size.
#[derive(Debug)]
pub struct HeapPages {
    page_size: usize,
    reserved_bytes: Cell<usize>,
    committed_bytes: Cell<usize>,
    commit_calls: Cell<usize>,
    decommit_calls: Cell<usize>,
}

impl HeapPages {
    /// Creates a provider with the given page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is not a power of two.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two(), "page size {page_size} is not a power of two");
        Self {
            page_size,
            reserved_bytes: Cell::new(0),
            committed_bytes: Cell::new(0),
            commit_calls: Cell::new(0),
            decommit_calls: Cell::new(0),
        }
    }

    /// Bytes currently reserved through this provider.
    #[inline]
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes.get()
    }

    /// Bytes currently committed through this provider.
    #[inline]
    #[must_use]
    pub fn committed_bytes(&self) -> usize {
        self.committed_bytes.get()
    }

    /// Pages currently committed through this provider.
    #[inline]
    #[must_use]
    pub fn committed_pages(&self) -> usize {
        self.committed_bytes.get() / self.page_size
    }

    /// Number of `commit` calls so far.
    #[inline]
    #[must_use]
    pub fn commit_calls(&self) -> usize {
        self.commit_calls.get()
    }

    /// Number of `decommit` calls so far.
    #[inline]
    #[must_use]
    pub fn decommit_calls(&self) -> usize {
        self.decommit_calls.get()
    }

    fn layout(&self, size: usize) -> io::Result<Layout> {
        Layout::from_size_align(size, self.page_size)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    fn check_aligned(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        let mask = self.page_size - 1;
        if (ptr.as_ptr() as usize) & mask != 0 || size & mask != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {ptr:p}+{size:#x} is not page-aligned"),
            ));
        }
        Ok(())
    }
}

impl Default for HeapPages {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl PageProvider for HeapPages {
    #[inline]
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&self, size: usize) -> io::Result<NonNull<u8>> {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty reservation"));
        }
        let layout = self.layout(size)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;
        self.reserved_bytes.set(self.reserved_bytes.get() + size);
        Ok(ptr)
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) -> io::Result<()> {
        let layout = self.layout(size)?;
        // SAFETY: caller guarantees base/size came from `reserve`.
        unsafe { alloc::dealloc(base.as_ptr(), layout) };
        self.reserved_bytes.set(self.reserved_bytes.get().saturating_sub(size));
        Ok(())
    }

    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        self.check_aligned(ptr, size)?;
        // SAFETY: caller guarantees the range lies inside a reservation.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        self.committed_bytes.set(self.committed_bytes.get() + size);
        self.commit_calls.set(self.commit_calls.get() + 1);
        Ok(())
    }

    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        self.check_aligned(ptr, size)?;
        let committed = self.committed_bytes.get().checked_sub(size).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "decommit of uncommitted pages")
        })?;
        // SAFETY: caller guarantees the range lies inside a reservation.
        unsafe { ptr::write_bytes(ptr.as_ptr(), DECOMMIT_FILL, size) };
        self.committed_bytes.set(committed);
        self.decommit_calls.set(self.decommit_calls.get() + 1);
        Ok(())
    }
}
