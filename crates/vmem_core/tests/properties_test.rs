//! Randomized alloc/free interleavings, checking every invariant after each step.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use vmem_core::{AllocatorConfig, FreeListBitmap, HeapPages, SlotAllocator};

const PAGE: usize = 4096;

fn round_up(value: usize) -> usize {
    value.div_ceil(PAGE) * PAGE
}

/// Mirrors the bitmap with a set of live indices and compares after every step.
fn check_bitmap(bits: &FreeListBitmap, live: &BTreeSet<u32>) {
    bits.check_invariants();

    let first_free = (0..).find(|idx| !live.contains(idx)).unwrap() as usize;
    assert_eq!(bits.first_free(), first_free);

    let alloc_end = live.iter().next_back().map_or(0, |&idx| idx as usize + 1);
    assert_eq!(bits.alloc_end(), alloc_end);
    assert_eq!(bits.word_count(), alloc_end.div_ceil(64));
    assert_eq!(bits.count_allocated(), live.len());
}

#[test]
fn test_bitmap_random_interleaving() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    let mut bits = FreeListBitmap::new();
    let mut live = BTreeSet::new();

    for _ in 0..20_000 {
        // Keep a floor of live slots so frees hit the middle as well as the top.
        let grow = if live.len() < 50 { true } else { rng.gen_bool(0.55) };
        if grow {
            let idx = bits.alloc();
            assert!(live.insert(idx), "index {idx} handed out twice");
        } else {
            let pick = rng.gen_range(0..live.len());
            let idx = *live.iter().nth(pick).unwrap();
            live.remove(&idx);
            bits.free(idx);
        }
        check_bitmap(&bits, &live);
    }

    for idx in std::mem::take(&mut live) {
        bits.free(idx);
    }
    check_bitmap(&bits, &live);
    assert_eq!(bits.word_count(), 0);
}

#[test]
fn test_bitmap_drains_from_top() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut bits = FreeListBitmap::new();
    let mut live = BTreeSet::new();

    for _ in 0..1000 {
        live.insert(bits.alloc());
    }
    // Punch random holes, then drain from the top so alloc_end keeps falling.
    for _ in 0..300 {
        let idx = rng.gen_range(0..1000);
        if live.remove(&idx) {
            bits.free(idx);
        }
    }
    while let Some(&top) = live.iter().next_back() {
        live.remove(&top);
        bits.free(top);
        check_bitmap(&bits, &live);
    }
    assert_eq!(bits.word_count(), 0);
}

#[test]
fn test_slot_allocator_random_interleaving() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let config = AllocatorConfig::default().with_debug_fill(false);
    let mut slots: SlotAllocator<[u8; 24], HeapPages> =
        SlotAllocator::with_provider(HeapPages::new(PAGE), 4000, config).unwrap();
    let mut live = BTreeSet::new();

    for step in 0..20_000u32 {
        let grow = live.is_empty() || (live.len() < slots.capacity() && rng.gen_bool(0.5));
        if grow {
            let idx = slots.alloc().unwrap();
            assert!(live.insert(idx), "index {idx} handed out twice");
            slots[idx] = [step as u8; 24];
        } else {
            let pick = rng.gen_range(0..live.len());
            let idx = *live.iter().nth(pick).unwrap();
            live.remove(&idx);
            slots.free(idx);
        }

        slots.bitmap().check_invariants();
        assert_eq!(slots.len(), live.len());

        // Committed range is exactly the page-rounded live region.
        let live_end = live.iter().next_back().map_or(0, |&idx| (idx as usize + 1) * 24);
        let committed = slots.commit_size();
        assert_eq!(committed, round_up(live_end));
        assert!(committed <= round_up(4000 * 24));
        assert_eq!(slots.pages().committed_bytes(), committed);
    }
}
