//! Containers built on the blockheap chained-block heap.
//!
//! Every container here draws its memory from a [`Heap`] and releases it in
//! stack order:
//!
//! - [`HashTable`]: chained hash table whose key bytes live in a heap
//! - [`DynArray`]: byte array of fixed-size blocks that never moves data
//! - [`Stack`]: LIFO of fixed-size elements, one heap allocation per push
//! - [`vm::Machine`]: word-sized bytecode machine with heap-allocated frames
//!
//! # Example
//!
//! ```
//! use blockheap::{HashTable, Stack};
//!
//! let mut stack = Stack::new(8).unwrap();
//! let mut seen = HashTable::new(64);
//!
//! for word in [3u64, 1, 3, 2] {
//!     if seen.insert(&word.to_be_bytes(), ()).unwrap().is_none() {
//!         stack.push_u64(word).unwrap();
//!     }
//! }
//!
//! assert_eq!(stack.len(), 3);
//! assert_eq!(stack.pop_u64().unwrap(), 2);
//! ```
//!
//! # Features
//!
//! - `guard-bytes`: keep heap guard bytes on in release builds
//! - `guard-backtrace`: log a backtrace when a guard check fails

pub mod dyn_array;
pub mod error;
pub mod hash;
pub mod stack;
pub mod vm;

pub use blockheap_mem::{Allocation, Bookmark, Heap, HeapConfig, HeapError, HeapStats};
pub use dyn_array::{DYN_ARRAY_DATA_SIZE, DynArray};
pub use error::{Error, Result};
pub use hash::HashTable;
pub use stack::Stack;
