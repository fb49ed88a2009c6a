//! # OS Virtual Memory
//!
//! `mmap`-based reservations. A reservation is a `PROT_NONE` anonymous
//! mapping; commit flips pages to read/write, decommit maps fresh `PROT_NONE`
//! pages over the range so the kernel drops the old frames and the next commit
//! reads as zero on every unix.

// SAFETY: This module is the FFI boundary to the kernel's memory syscalls.
#![allow(unsafe_code)]

use super::PageProvider;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

/// The OS page size, queried once per process.
#[must_use]
pub fn os_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).unwrap_or(4096)
    })
}

/// Page provider backed by the process's virtual address space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OsPages;

impl OsPages {
    /// Creates the provider. Stateless; all instances are equivalent.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PageProvider for OsPages {
    #[inline]
    fn page_size(&self) -> usize {
        os_page_size()
    }

    fn reserve(&self, size: usize) -> io::Result<NonNull<u8>> {
        // SAFETY: anonymous mapping at a kernel-chosen address.
        let ptr = unsafe {
            libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, RESERVE_FLAGS, -1, 0)
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
    }

    unsafe fn release(&self, base: NonNull<u8>, size: usize) -> io::Result<()> {
        // SAFETY: caller guarantees this is exactly one live reservation.
        if unsafe { libc::munmap(base.as_ptr().cast(), size) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    unsafe fn commit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        // SAFETY: caller guarantees a page-aligned range inside a reservation.
        let ret = unsafe {
            libc::mprotect(ptr.as_ptr().cast(), size, libc::PROT_READ | libc::PROT_WRITE)
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    unsafe fn decommit(&self, ptr: NonNull<u8>, size: usize) -> io::Result<()> {
        // SAFETY: MAP_FIXED replaces pages we own inside our own reservation.
        let ret = unsafe {
            libc::mmap(
                ptr.as_ptr().cast(),
                size,
                libc::PROT_NONE,
                RESERVE_FLAGS | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if ret == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
