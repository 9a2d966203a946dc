// Shared helpers for the heap integration tests.

#![allow(dead_code)]

use blockheap_mem::{Heap, HeapConfig};

/// Deterministic xorshift64 generator for reproducible allocation sequences.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `0..bound`.
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

pub fn guarded_heap(hint: usize) -> Heap {
    Heap::with_config(hint, HeapConfig::new().with_guards(true)).expect("heap creation failed")
}

pub fn unguarded_heap(hint: usize) -> Heap {
    Heap::with_config(hint, HeapConfig::new().with_guards(false)).expect("heap creation failed")
}
