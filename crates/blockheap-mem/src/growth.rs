//! Block sizing policy.
//!
//! The first block is sized from the caller's hint. Every later block doubles
//! the tail's capacity until the standard size is reached, but is never
//! smaller than the request that triggered it.

use blockheap_log::warn;

use crate::config::HeapConfig;

/// Sizing rules derived from a [`HeapConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPolicy {
    min: usize,
    standard: usize,
}

impl GrowthPolicy {
    #[must_use]
    pub const fn new(config: &HeapConfig) -> Self {
        Self {
            min: config.min_block_size,
            standard: config.standard_block_size,
        }
    }

    /// Usable size of a heap's first block.
    #[must_use]
    pub const fn initial(&self, hint: usize) -> usize {
        if hint > self.min { hint } else { self.min }
    }

    /// Usable size of the block appended after a tail of `tail_capacity`
    /// bytes when `request` bytes did not fit.
    ///
    /// ```
    /// use blockheap_mem::{GrowthPolicy, HeapConfig};
    ///
    /// let policy = GrowthPolicy::new(&HeapConfig::new());
    /// assert_eq!(policy.next(200, 10), 400);
    /// assert_eq!(policy.next(800, 10), 1024);
    /// assert_eq!(policy.next(200, 5000), 5000);
    /// ```
    #[must_use]
    pub fn next(&self, tail_capacity: usize, request: usize) -> usize {
        if request > self.standard {
            warn!(
                "request of {} bytes exceeds the standard block size {}",
                request, self.standard
            );
        }

        tail_capacity
            .saturating_mul(2)
            .min(self.standard)
            .max(request)
    }
}
