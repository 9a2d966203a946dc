//! Error type for heap operations that can fail recoverably.
//!
//! Only block acquisition can fail in a way the caller can handle. Misuse of
//! the stack discipline (freeing more than the tail holds, stale bookmarks,
//! corrupted guard bytes) is a programming error and panics instead.

use std::fmt;

/// Errors returned by [`Heap`](crate::Heap) operations that acquire memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The system allocator could not provide a block.
    OutOfMemory {
        /// Block capacity that was requested, header included.
        requested: usize,
    },
    /// The request cannot be expressed as a block size without overflowing.
    CapacityOverflow {
        /// Payload size the caller asked for.
        requested: usize,
    },
    /// A `Display` implementation failed while formatting into the heap.
    Format,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::OutOfMemory { requested } => {
                write!(f, "out of memory: cannot reserve a {requested} byte block")
            }
            HeapError::CapacityOverflow { requested } => {
                write!(f, "capacity overflow: {requested} bytes cannot be laid out")
            }
            HeapError::Format => write!(f, "formatting into the heap failed"),
        }
    }
}

impl std::error::Error for HeapError {}

/// Result type for heap operations.
pub type Result<T> = std::result::Result<T, HeapError>;
