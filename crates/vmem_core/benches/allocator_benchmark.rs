//! # Allocator Benchmark
//!
//! Compares the page-backed allocators against their std counterparts:
//! 1. `SlotAllocator` insert/free vs `Vec` push with a free list
//! 2. `PushArena` small pushes vs `Vec<u8>` extend
//! 3. Commit/decommit cost of oscillating across a page boundary

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vmem_core::{AllocatorConfig, PageProvider, PushArena, SlotAllocator};

#[derive(Clone, Copy, bytemuck::Zeroable)]
#[repr(C)]
struct Particle {
    position: [f32; 3],
    velocity: [f32; 3],
    life: f32,
}

fn config() -> AllocatorConfig {
    AllocatorConfig::default().with_debug_fill(false)
}

fn bench_slots(c: &mut Criterion) {
    let mut group = c.benchmark_group("slots_insert_free");

    group.bench_function("slot_allocator", |b| {
        let mut slots: SlotAllocator<Particle> = SlotAllocator::new(1_000_000, config()).unwrap();
        b.iter(|| {
            for i in 0..10_000 {
                let particle = Particle { position: [i as f32; 3], velocity: [0.0; 3], life: 1.0 };
                black_box(slots.insert(particle).unwrap());
            }
            for idx in (0..10_000).rev() {
                slots.free(idx);
            }
        });
    });

    group.bench_function("vec_free_list", |b| {
        let mut storage: Vec<Particle> = Vec::new();
        let mut free: Vec<usize> = Vec::new();
        b.iter(|| {
            for i in 0..10_000 {
                let particle = Particle { position: [i as f32; 3], velocity: [0.0; 3], life: 1.0 };
                let idx = if let Some(idx) = free.pop() {
                    storage[idx] = particle;
                    idx
                } else {
                    storage.push(particle);
                    storage.len() - 1
                };
                black_box(idx);
            }
            free.extend(0..storage.len());
        });
    });

    group.finish();
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_small_blocks");

    group.bench_function("push_arena", |b| {
        let mut arena = PushArena::new(256 << 20, config()).unwrap();
        b.iter(|| {
            for i in 0..10_000u32 {
                black_box(arena.push_copy(i).unwrap());
            }
            arena.clear();
        });
    });

    group.bench_function("vec_u8", |b| {
        let mut bytes: Vec<u8> = Vec::new();
        b.iter(|| {
            for i in 0..10_000u32 {
                bytes.extend_from_slice(&i.to_le_bytes());
            }
            black_box(bytes.len());
            bytes.clear();
        });
    });

    group.finish();
}

fn bench_page_boundary(c: &mut Criterion) {
    c.bench_function("slot_page_boundary_oscillation", |b| {
        let mut slots: SlotAllocator<u32> = SlotAllocator::new(1_000_000, config()).unwrap();
        let per_page = slots.pages().page_size() / 4;
        for _ in 0..per_page {
            slots.alloc().unwrap();
        }
        // Each iteration commits and decommits exactly one page.
        b.iter(|| {
            let idx = slots.alloc().unwrap();
            slots.free(black_box(idx));
        });
    });
}

criterion_group!(benches, bench_slots, bench_push, bench_page_boundary);
criterion_main!(benches);
