//! Heap tuning knobs.

use crate::guard::GUARD_SIZE;

/// Smallest payload a heap's first block is created with.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Growth stops doubling once a new block would exceed this payload size.
pub const STANDARD_BLOCK_SIZE: usize = 1024;

/// Configuration for a [`Heap`](crate::Heap).
///
/// ```
/// use blockheap_mem::{Heap, HeapConfig};
///
/// let config = HeapConfig::new()
///     .with_guards(false)
///     .with_standard_block_size(4096);
/// let heap = Heap::with_config(256, config).unwrap();
///
/// assert_eq!(heap.guard_size(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Lower bound for the first block's payload.
    pub min_block_size: usize,
    /// Cap applied when doubling the tail block's capacity.
    pub standard_block_size: usize,
    /// Bracket every allocation with guard bytes.
    pub guards: bool,
}

impl HeapConfig {
    /// Whether guards are on when not configured explicitly: always in debug
    /// builds, and in release builds with the `guard-bytes` feature.
    pub const GUARDS_BY_DEFAULT: bool = cfg!(any(debug_assertions, feature = "guard-bytes"));

    /// Default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_block_size: MIN_BLOCK_SIZE,
            standard_block_size: STANDARD_BLOCK_SIZE,
            guards: Self::GUARDS_BY_DEFAULT,
        }
    }

    #[must_use]
    pub const fn with_guards(mut self, guards: bool) -> Self {
        self.guards = guards;
        self
    }

    #[must_use]
    pub const fn with_min_block_size(mut self, size: usize) -> Self {
        self.min_block_size = size;
        self
    }

    #[must_use]
    pub const fn with_standard_block_size(mut self, size: usize) -> Self {
        self.standard_block_size = size;
        self
    }

    /// Bytes of no-man's-land on each side of an allocation.
    #[must_use]
    pub const fn guard_size(&self) -> usize {
        if self.guards { GUARD_SIZE } else { 0 }
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
