//! Property-style tests for heap allocation and rollback.
//!
//! Allocation sizes come from a seeded xorshift generator, so every run
//! exercises the same sequences.

mod common;

use blockheap_mem::{Allocation, Heap, STANDARD_BLOCK_SIZE};
use common::{XorShift, guarded_heap, unguarded_heap};

fn fill_pattern(heap: &mut Heap, alloc: &Allocation, seed: u8) {
    for (i, byte) in heap.bytes_mut(alloc).iter_mut().enumerate() {
        *byte = seed.wrapping_add(i as u8);
    }
}

fn check_pattern(heap: &Heap, alloc: &Allocation, seed: u8) {
    for (i, &byte) in heap.bytes(alloc).iter().enumerate() {
        assert_eq!(byte, seed.wrapping_add(i as u8), "payload moved or was overwritten");
    }
}

// ============================================================================
// Sequential fill
// ============================================================================

#[test]
fn test_offsets_increase_within_a_block() {
    for mut heap in [guarded_heap(0), unguarded_heap(0)] {
        let mut rng = XorShift::new(7);
        let mut allocs: Vec<Allocation> = Vec::new();

        for _ in 0..500 {
            let alloc = heap.alloc(rng.below(200)).unwrap();
            if let Some(prev) = allocs.last().filter(|prev| prev.block() == alloc.block()) {
                assert!(alloc.offset() >= prev.offset() + heap.space_needed(prev.len()));
            }
            allocs.push(alloc);
        }

        heap.validate();
    }
}

#[test]
fn test_payloads_never_move() {
    let mut heap = guarded_heap(0);
    let mut rng = XorShift::new(99);
    let mut allocs = Vec::new();

    for i in 0..300 {
        let alloc = heap.alloc(1 + rng.below(120)).unwrap();
        fill_pattern(&mut heap, &alloc, i as u8);
        allocs.push(alloc);
    }

    assert!(heap.block_count() > 1);
    for (i, alloc) in allocs.iter().enumerate() {
        check_pattern(&heap, alloc, i as u8);
    }
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn test_alloc_free_top_is_lifo_exact() {
    let mut heap = guarded_heap(0);
    let mut rng = XorShift::new(3);

    for _ in 0..200 {
        let n = rng.below(2 * STANDARD_BLOCK_SIZE);
        let before = heap.heap_top();
        let blocks = heap.block_count();

        let first = heap.alloc(n).unwrap();
        heap.free_top(n);
        assert_eq!(heap.heap_top(), before);
        assert_eq!(heap.block_count(), blocks);

        let again = heap.alloc(n).unwrap();
        assert_eq!(again.offset(), first.offset());
        if first.block() == before.block() {
            assert_eq!(again, first);
        }
        heap.free_top(n);

        // Keep some live data around so the tail moves between rounds.
        heap.alloc(rng.below(64)).unwrap();
    }
}

#[test]
fn test_nested_bookmarks() {
    let mut heap = guarded_heap(0);
    let mut rng = XorShift::new(0xB10C);
    let mut marks = Vec::new();

    for _ in 0..20 {
        marks.push((heap.heap_top(), heap.size(), heap.block_count()));
        for _ in 0..rng.below(30) {
            heap.alloc(rng.below(400)).unwrap();
        }
    }

    while let Some((mark, size, blocks)) = marks.pop() {
        heap.free_to_bookmark(mark);
        assert_eq!(heap.heap_top(), mark);
        assert_eq!(heap.size(), size);
        assert_eq!(heap.block_count(), blocks);
        heap.validate();
    }
}

#[test]
fn test_empty_twice_keeps_first_block() {
    let mut heap = unguarded_heap(128);
    let first = heap.blocks().next().unwrap().capacity();

    for n in 0..100 {
        heap.alloc(n * 3).unwrap();
    }
    heap.empty();
    heap.empty();

    let stats = heap.stats();
    assert_eq!(stats.block_count, 1);
    assert_eq!(stats.used_bytes, 0);
    assert_eq!(stats.total_size, first);
}

// ============================================================================
// Growth
// ============================================================================

#[test]
fn test_request_above_standard_size() {
    let mut heap = unguarded_heap(0);
    let first = heap.size();

    heap.alloc(STANDARD_BLOCK_SIZE + 1).unwrap();

    assert_eq!(heap.block_count(), 2);
    let grown = heap.blocks().last().unwrap().capacity();
    assert!(grown >= STANDARD_BLOCK_SIZE + 1);
    assert_eq!(heap.size(), first + grown);
}

#[test]
fn test_total_size_tracks_blocks() {
    let mut heap = guarded_heap(0);
    let mut rng = XorShift::new(42);

    for _ in 0..1_000 {
        heap.alloc(rng.below(300)).unwrap();
        let sum: usize = heap.blocks().map(|block| block.capacity()).sum();
        assert_eq!(heap.size(), sum);
    }
}

#[test]
fn test_heap_moves_across_threads() {
    let mut heap = guarded_heap(0);
    let name = heap.strdup("moved").unwrap();

    let heap = std::thread::spawn(move || {
        heap.alloc(64).unwrap();
        heap
    })
    .join()
    .unwrap();

    assert_eq!(heap.as_cstr(&name).unwrap().to_str(), Ok("moved"));
}
