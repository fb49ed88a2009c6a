//! # Slot Allocator
//!
//! Fixed-size block allocator with stable `u32` indices.
//!
//! One reservation holds `max_count` elements of `T`; a [`FreeListBitmap`]
//! decides which index is next. Pages are committed as the highest live index
//! climbs and decommitted when a contiguous tail of slots is freed. There is
//! no compaction: a single live slot near the top keeps every page below it
//! committed.
//!
//! ## Slot lifecycle
//!
//! ```text
//! Unreserved (>= alloc_end) --alloc--> Allocated --free--> Free (< alloc_end)
//!      ^                                                     |
//!      +---------- tail freed: alloc_end drops, pages decommitted
//! ```

// SAFETY: Hands out references into committed pages of its own reservation.
#![allow(unsafe_code)]

use super::bitmap::FreeListBitmap;
use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult};
use crate::pages::{DefaultPages, PageProvider, Reservation};
use bytemuck::Zeroable;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Index, IndexMut};

/// A typed slot allocator over reserved pages.
///
/// Indices are handed out lowest-first and stay valid until freed. A slot
/// that has never been used (or whose page was decommitted) starts zeroed,
/// hence the [`Zeroable`] bound; a reused slot keeps whatever was last
/// written to it.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Wrap in a mutex to share it.
///
/// # Example
///
/// ```rust,ignore
/// let mut slots: SlotAllocator<Particle> = SlotAllocator::new(1_000_000, AllocatorConfig::default())?;
///
/// let idx = slots.insert(Particle { x: 0.0, y: 0.0, life: 1.0 })?;
/// slots[idx].life -= 0.1;
///
/// // Freeing the highest live slot may return pages to the OS
/// slots.free(idx);
/// ```
pub struct SlotAllocator<T, P: PageProvider = DefaultPages> {
    /// Reserved range for `max_count` elements; its commit boundary is `commit_end`.
    reservation: Reservation<P>,
    /// Free/allocated state per index.
    bitmap: FreeListBitmap,
    /// Maximum number of live slots.
    max_count: usize,
    /// Number of live slots.
    len: usize,
    /// Exhaustion policy.
    config: AllocatorConfig,
    /// Marker for T.
    _phantom: PhantomData<T>,
}

impl<T: Zeroable + Copy> SlotAllocator<T, DefaultPages> {
    /// Reserves address space for `max_count` elements.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-sized `T`, a zero or oversized `max_count`,
    /// or if the address space cannot be reserved.
    pub fn new(max_count: usize, config: AllocatorConfig) -> AllocResult<Self> {
        Self::with_provider(DefaultPages::default(), max_count, config)
    }
}

impl<T: Zeroable + Copy, P: PageProvider> SlotAllocator<T, P> {
    /// Reserves space for `max_count` elements from `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidConfig`] for a zero-sized `T`, a zero
    /// `max_count`, a `max_count` beyond the `u32` index space, or a `T`
    /// aligned more strictly than a page; [`AllocError::Reserve`] if the
    /// provider cannot reserve the range.
    pub fn with_provider(provider: P, max_count: usize, config: AllocatorConfig) -> AllocResult<Self> {
        let size = mem::size_of::<T>();
        if size == 0 {
            return Err(AllocError::InvalidConfig("zero-sized slot type".into()));
        }
        if max_count == 0 || max_count > u32::MAX as usize {
            return Err(AllocError::InvalidConfig(format!(
                "max_count {max_count} outside 1..={}",
                u32::MAX
            )));
        }
        if mem::align_of::<T>() > provider.page_size() {
            return Err(AllocError::InvalidConfig(format!(
                "slot alignment {} exceeds page size {}",
                mem::align_of::<T>(),
                provider.page_size()
            )));
        }
        let bytes = max_count.checked_mul(size).ok_or_else(|| {
            AllocError::InvalidConfig(format!("{max_count} slots of {size} bytes overflow"))
        })?;

        let reservation = Reservation::new(provider, bytes)?;
        Ok(Self {
            reservation,
            bitmap: FreeListBitmap::new(),
            max_count,
            len: 0,
            config,
            _phantom: PhantomData,
        })
    }

    /// Allocates the lowest free slot and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::CapacityExceeded`] if `max_count` slots are live
    /// and the policy is [`ExhaustionPolicy::ReturnError`](crate::ExhaustionPolicy::ReturnError).
    ///
    /// # Panics
    ///
    /// Panics on exhaustion under [`ExhaustionPolicy::Panic`](crate::ExhaustionPolicy::Panic).
    pub fn alloc(&mut self) -> AllocResult<u32> {
        if self.len == self.max_count {
            return self.config.exhausted(self.len + 1, self.max_count);
        }

        // With fewer than max_count live slots, the lowest free one is below max_count.
        let idx = self.bitmap.alloc();
        self.reservation.commit_to((idx as usize + 1) * mem::size_of::<T>());
        self.len += 1;

        tracing::trace!(idx, live = self.len, "slot allocated");
        Ok(idx)
    }

    /// Allocates a slot and stores `value` in it.
    ///
    /// # Errors
    ///
    /// Same as [`alloc`](Self::alloc).
    pub fn insert(&mut self, value: T) -> AllocResult<u32> {
        let idx = self.alloc()?;
        self[idx] = value;
        Ok(idx)
    }

    /// Frees an allocated slot.
    ///
    /// If it was the highest live slot, every whole page above the new
    /// highest live slot is decommitted.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is not currently allocated.
    pub fn free(&mut self, idx: u32) {
        assert!(self.bitmap.is_allocated(idx), "free of unallocated slot {idx}");

        self.bitmap.free(idx);
        self.len -= 1;
        self.reservation.decommit_to(self.bitmap.alloc_end() * mem::size_of::<T>());

        tracing::trace!(idx, live = self.len, "slot freed");
    }

    /// Frees every slot and decommits every page.
    pub fn clear(&mut self) {
        self.bitmap.clear();
        self.len = 0;
        self.reservation.decommit_to(0);
    }

    /// Reference to an allocated slot, `None` if `idx` is not allocated.
    #[inline]
    #[must_use]
    pub fn get(&self, idx: u32) -> Option<&T> {
        // SAFETY: allocated slots lie in committed pages and hold a valid T.
        self.bitmap.is_allocated(idx).then(|| unsafe { &*self.slot_ptr(idx) })
    }

    /// Mutable reference to an allocated slot, `None` if `idx` is not allocated.
    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        if !self.bitmap.is_allocated(idx) {
            return None;
        }
        // SAFETY: as in `get`, and `&mut self` makes the reference unique.
        Some(unsafe { &mut *self.slot_ptr(idx) })
    }

    /// Whether `idx` is currently allocated.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, idx: u32) -> bool {
        self.bitmap.is_allocated(idx)
    }

    /// Iterates live slots in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        // SAFETY: every index the bitmap reports as allocated is a live slot.
        self.bitmap.iter_allocated().map(move |idx| (idx, unsafe { &*self.slot_ptr(idx) }))
    }

    /// Number of live slots.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of live slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_count
    }

    /// One past the highest live index, 0 when empty.
    #[inline]
    #[must_use]
    pub const fn alloc_end(&self) -> usize {
        self.bitmap.alloc_end()
    }

    /// The underlying free-list bitmap.
    #[inline]
    #[must_use]
    pub const fn bitmap(&self) -> &FreeListBitmap {
        &self.bitmap
    }

    /// Committed bytes.
    #[inline]
    #[must_use]
    pub const fn commit_size(&self) -> usize {
        self.reservation.committed()
    }

    /// Ratio of live bytes to committed bytes; 0.0 when nothing is committed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage(&self) -> f32 {
        let committed = self.reservation.committed();
        if committed == 0 {
            return 0.0;
        }
        (self.len * mem::size_of::<T>()) as f32 / committed as f32
    }

    /// The page provider backing this allocator.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> &P {
        self.reservation.provider()
    }

    #[inline]
    fn slot_ptr(&self, idx: u32) -> *mut T {
        self.reservation.ptr_at(idx as usize * mem::size_of::<T>()).as_ptr().cast::<T>()
    }
}

impl<T: Zeroable + Copy, P: PageProvider> Index<u32> for SlotAllocator<T, P> {
    type Output = T;

    fn index(&self, idx: u32) -> &T {
        match self.get(idx) {
            Some(value) => value,
            None => panic!("slot {idx} is not allocated"),
        }
    }
}

impl<T: Zeroable + Copy, P: PageProvider> IndexMut<u32> for SlotAllocator<T, P> {
    fn index_mut(&mut self, idx: u32) -> &mut T {
        match self.get_mut(idx) {
            Some(value) => value,
            None => panic!("slot {idx} is not allocated"),
        }
    }
}

impl<T, P: PageProvider> std::fmt::Debug for SlotAllocator<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("len", &self.len)
            .field("max_count", &self.max_count)
            .field("alloc_end", &self.bitmap.alloc_end())
            .field("committed", &self.reservation.committed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExhaustionPolicy;
    use crate::pages::HeapPages;

    fn slots<T: Zeroable + Copy>(max_count: usize) -> SlotAllocator<T, HeapPages> {
        SlotAllocator::with_provider(HeapPages::new(4096), max_count, AllocatorConfig::default())
            .unwrap()
    }

    #[test]
    fn test_alloc_free() {
        let mut pool: SlotAllocator<u32, _> = slots(10);

        let idx = pool.insert(42).unwrap();
        assert_eq!(pool[idx], 42);
        assert_eq!(pool.len(), 1);

        pool.free(idx);
        assert_eq!(pool.len(), 0);
        assert!(pool.get(idx).is_none());
    }

    #[test]
    fn test_pool_full() {
        let mut pool: SlotAllocator<u8, _> = slots(2);
        pool.alloc().unwrap();
        pool.alloc().unwrap();

        let err = pool.alloc().unwrap_err();
        assert!(matches!(err, AllocError::CapacityExceeded { requested: 3, capacity: 2 }));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    #[should_panic(expected = "reservation exceeded")]
    fn test_pool_full_panics_under_policy() {
        let config = AllocatorConfig::default().with_exhaustion(ExhaustionPolicy::Panic);
        let mut pool: SlotAllocator<u8, _> =
            SlotAllocator::with_provider(HeapPages::new(4096), 1, config).unwrap();
        pool.alloc().unwrap();
        let _ = pool.alloc();
    }

    #[test]
    fn test_reuse_keeps_contents() {
        let mut pool: SlotAllocator<u64, _> = slots(100);
        let a = pool.insert(1).unwrap();
        let b = pool.insert(2).unwrap();

        pool.free(a);
        let c = pool.alloc().unwrap();
        assert_eq!(c, a);
        // Reuse never zeroes.
        assert_eq!(pool[c], 1);
        assert_eq!(pool[b], 2);
    }

    #[test]
    fn test_fresh_slots_are_zero() {
        let mut pool: SlotAllocator<[u32; 4], _> = slots(5000);
        for _ in 0..3000 {
            let idx = pool.alloc().unwrap();
            assert_eq!(pool[idx], [0; 4]);
            pool[idx] = [7; 4];
        }
        // Free the whole tail, then climb back: decommitted pages come back zeroed.
        for idx in (0..3000).rev() {
            pool.free(idx);
        }
        assert_eq!(pool.commit_size(), 0);
        let idx = pool.alloc().unwrap();
        assert_eq!(pool[idx], [0; 4]);
    }

    #[test]
    fn test_commit_tracks_highest_live_slot() {
        // 1024 u32 per page.
        let mut pool: SlotAllocator<u32, _> = slots(1_000_000);
        for _ in 0..2000 {
            pool.alloc().unwrap();
        }
        assert_eq!(pool.commit_size(), 8192);

        // Freeing below the top releases nothing.
        pool.free(0);
        pool.free(1500);
        assert_eq!(pool.commit_size(), 8192);

        // The top slot still touches page 2.
        for idx in (1501..1999).rev() {
            pool.free(idx);
        }
        assert_eq!(pool.commit_size(), 8192);

        pool.free(1999);
        assert_eq!(pool.alloc_end(), 1500);
        assert_eq!(pool.commit_size(), 8192);
        assert_eq!(pool.pages().decommit_calls(), 0);

        for idx in (1024..1500).rev() {
            pool.free(idx);
        }
        assert_eq!(pool.commit_size(), 4096);
        assert_eq!(pool.pages().decommit_calls(), 1);
    }

    #[test]
    #[should_panic(expected = "free of unallocated slot")]
    fn test_free_unallocated_panics() {
        let mut pool: SlotAllocator<u32, _> = slots(10);
        let a = pool.alloc().unwrap();
        pool.alloc().unwrap();
        pool.free(a);
        pool.free(a);
    }

    #[test]
    #[should_panic(expected = "is not allocated")]
    fn test_index_unallocated_panics() {
        let pool: SlotAllocator<u32, _> = slots(10);
        let _ = pool[3];
    }

    #[test]
    fn test_iter_and_usage() {
        let mut pool: SlotAllocator<u32, _> = slots(10_000);
        assert_eq!(pool.usage(), 0.0);

        for value in 0..1024 {
            pool.insert(value).unwrap();
        }
        assert!((pool.usage() - 1.0).abs() < f32::EPSILON);

        for idx in (0..1024).step_by(2) {
            pool.free(idx);
        }
        assert!((pool.usage() - 0.5).abs() < f32::EPSILON);

        let live: Vec<(u32, u32)> = pool.iter().map(|(idx, &value)| (idx, value)).collect();
        assert_eq!(live.len(), 512);
        assert!(live.iter().all(|&(idx, value)| idx == value && idx % 2 == 1));
    }

    #[test]
    fn test_clear() {
        let mut pool: SlotAllocator<u32, _> = slots(10_000);
        for _ in 0..5000 {
            pool.alloc().unwrap();
        }
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.commit_size(), 0);
        assert_eq!(pool.pages().committed_bytes(), 0);
        assert_eq!(pool.alloc().unwrap(), 0);
    }

    #[test]
    fn test_invalid_configs() {
        let zst = SlotAllocator::<(), _>::with_provider(HeapPages::new(4096), 10, AllocatorConfig::default());
        assert!(matches!(zst, Err(AllocError::InvalidConfig(_))));

        let empty = SlotAllocator::<u32, _>::with_provider(HeapPages::new(4096), 0, AllocatorConfig::default());
        assert!(matches!(empty, Err(AllocError::InvalidConfig(_))));
    }
}
