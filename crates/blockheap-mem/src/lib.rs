//! Chained-block memory heap.
//!
//! This crate provides the allocation substrate for the blockheap containers:
//!
//! - **[`Heap`]**: bump allocation from a chain of blocks, with rollback to the
//!   top, to a [`Bookmark`], or to empty
//! - **Guard bytes**: no-man's-land around every allocation, checked on
//!   rollback and block release (debug builds, or the `guard-bytes` feature)
//! - **[`chain`]**: the intrusive generational list the heap keeps its blocks in
//!
//! # Features
//!
//! - `guard-bytes`: guards on by default in release builds too
//! - `guard-backtrace`: log a backtrace when a guard check fails

pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod growth;
pub mod guard;
pub mod heap;

pub use block::{ALIGNMENT, BLOCK_HEADER_SIZE, Block, align_up};
pub use chain::{Chain, Link, Linked, NodeId};
pub use config::{HeapConfig, MIN_BLOCK_SIZE, STANDARD_BLOCK_SIZE};
pub use error::{HeapError, Result};
pub use growth::GrowthPolicy;
pub use guard::{AFTER_BYTE, BEFORE_BYTE, GUARD_SIZE, GuardSide};
pub use heap::{Allocation, Bookmark, Heap, HeapStats, space_needed};
