//! # Allocator Error Types
//!
//! Recoverable errors reported by the page allocators.
//!
//! Only conditions the caller can branch on are errors. Broken preconditions
//! (freeing an index that was never handed out, rewinding past the base) and
//! OS commit failures after construction are panics: continuing would leave
//! the bitmap caches or the commit boundary describing memory that is not
//! there.

use std::io;
use thiserror::Error;

/// Errors that can occur when constructing or growing an allocator.
#[derive(Error, Debug)]
pub enum AllocError {
    /// Growth beyond the fixed reservation was requested.
    #[error("reservation exceeded: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// Bytes (push arena) or slots (slot allocator) that would be in use.
        requested: usize,
        /// Bytes or slots the reservation can hold.
        capacity: usize,
    },

    /// The OS refused to reserve address space.
    #[error("failed to reserve {size} bytes of address space: {source}")]
    Reserve {
        /// Requested reservation size in bytes.
        size: usize,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Invalid allocator configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;
