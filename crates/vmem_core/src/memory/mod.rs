//! # Memory Management
//!
//! Allocators built on one fixed reservation each.
//!
//! ## Design Philosophy
//!
//! The whole maximum size is reserved up front and pages are committed as the
//! live region grows. Nothing ever moves:
//! - Pointers into a [`PushArena`] stay valid until rewound past
//! - Slot indices from a [`SlotAllocator`] stay valid until freed
//! - Growth never copies data

mod bitmap;
mod push;
mod slots;

pub use bitmap::{scan_forward_free, scan_reverse_allocated, FreeListBitmap, WORD_BITS};
pub use push::{PushArena, DEBUG_FILL_FREED, DEBUG_FILL_UNINIT};
pub use slots::SlotAllocator;
