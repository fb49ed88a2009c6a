//! # VMEM Core
//!
//! Allocators that reserve their whole maximum size as address space up front
//! and commit OS pages only as they are needed:
//! - Stable addresses and indices, growth never copies data
//! - Committed memory follows the live region up and down
//! - Free-slot search in O(1) amortized via 64-bit word scans
//!
//! ## Architecture Rules
//!
//! 1. **One reservation per allocator** - released exactly once, on drop
//! 2. **Page-granular commit** - the commit boundary is always page-aligned
//! 3. **Single writer** - no internal locking; share behind a caller's mutex
//!
//! ## Example
//!
//! ```rust,ignore
//! use vmem_core::{AllocatorConfig, PushArena, SlotAllocator};
//!
//! let mut arena = PushArena::new(1 << 30, AllocatorConfig::default())?; // 1GB reserved, 0 committed
//! let block = arena.push(5000, 16)?;
//!
//! let mut slots: SlotAllocator<[f32; 4]> = SlotAllocator::new(1_000_000, AllocatorConfig::default())?;
//! let idx = slots.insert([0.0, 1.0, 2.0, 3.0])?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod pages;

pub use config::{AllocatorConfig, ExhaustionPolicy};
pub use error::{AllocError, AllocResult};
pub use memory::{FreeListBitmap, PushArena, SlotAllocator};
#[cfg(unix)]
pub use pages::OsPages;
pub use pages::{DefaultPages, HeapPages, PageProvider, Reservation};
