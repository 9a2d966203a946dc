//! A single contiguous region of a heap.
//!
//! Offsets inside a block are measured from the block's own base, header
//! included, so `start` is [`BLOCK_HEADER_SIZE`] and `capacity` is the header
//! plus the payload. Only the payload is backed by storage; [`Block::bytes`]
//! translates offsets into it.

use std::fmt;
use std::ptr::NonNull;

use crate::chain::{Link, Linked};
use crate::error::{HeapError, Result};

/// Alignment every allocation size is rounded up to.
pub const ALIGNMENT: usize = 8;

/// Bookkeeping bytes accounted at the front of every block.
pub const BLOCK_HEADER_SIZE: usize = align_up(std::mem::size_of::<Block>(), ALIGNMENT);

/// Rounds `n` up to a multiple of `align`, which must be a power of two.
///
/// Overflows for `n` within `align` of `usize::MAX`; see [`checked_align_up`].
#[must_use]
pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Like [`align_up`], returning `None` on overflow.
#[must_use]
pub const fn checked_align_up(n: usize, align: usize) -> Option<usize> {
    match n.checked_add(align - 1) {
        Some(padded) => Some(padded & !(align - 1)),
        None => None,
    }
}

/// A contiguous region with a bump offset.
///
/// Invariant: `start <= used <= capacity`.
pub struct Block {
    link: Link,
    data: Box<[u8]>,
    capacity: usize,
    used: usize,
    start: usize,
    /// Times the block was rewound back to `start`.
    resets: u64,
}

impl Block {
    /// Acquires a block with `payload` usable bytes.
    pub(crate) fn new(payload: usize) -> Result<Self> {
        let capacity = BLOCK_HEADER_SIZE
            .checked_add(payload)
            .ok_or(HeapError::CapacityOverflow { requested: payload })?;

        let mut data = Vec::new();
        data.try_reserve_exact(payload)
            .map_err(|_| HeapError::OutOfMemory { requested: capacity })?;
        data.resize(payload, 0);

        Ok(Block {
            link: Link::new(),
            data: data.into_boxed_slice(),
            capacity,
            used: BLOCK_HEADER_SIZE,
            start: BLOCK_HEADER_SIZE,
            resets: 0,
        })
    }

    /// Total size of the block, header included.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset of the first free byte.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Offset of the first payload byte.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Bytes still available for bump allocation.
    #[must_use]
    pub const fn free_space(&self) -> usize {
        self.capacity - self.used
    }

    /// Bytes handed out so far.
    #[must_use]
    pub const fn used_bytes(&self) -> usize {
        self.used - self.start
    }

    /// Returns true if nothing is allocated from this block.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.used == self.start
    }

    pub(crate) const fn fits(&self, space: usize) -> bool {
        space <= self.free_space()
    }

    /// Reserves `space` bytes and returns the offset where they begin.
    pub(crate) fn bump(&mut self, space: usize) -> usize {
        debug_assert!(self.fits(space));
        let at = self.used;
        self.used += space;
        at
    }

    /// Moves the bump offset back to `offset`.
    pub(crate) fn rewind(&mut self, offset: usize) {
        debug_assert!(self.start <= offset && offset <= self.used);
        if offset == self.start {
            self.resets += 1;
        }
        self.used = offset;
    }

    /// Number of times the block was emptied by a rewind.
    pub(crate) const fn resets(&self) -> u64 {
        self.resets
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        let lo = offset - self.start;
        &self.data[lo..lo + len]
    }

    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        let lo = offset - self.start;
        &mut self.data[lo..lo + len]
    }

    /// Pointer to `offset`, carrying the provenance of the whole payload so
    /// the guard bytes on both sides stay reachable.
    pub(crate) fn ptr_at(&mut self, offset: usize) -> NonNull<u8> {
        let lo = offset - self.start;
        assert!(lo <= self.data.len(), "offset {offset} past the end of the block");
        // SAFETY: `lo` is at most one past the end of `data`, and a boxed
        // slice pointer is never null.
        unsafe { NonNull::new_unchecked(self.data.as_mut_ptr().add(lo)) }
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.start <= self.used
            && self.used <= self.capacity
            && self.capacity == self.start + self.data.len()
    }
}

impl Linked for Block {
    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("start", &self.start)
            .finish()
    }
}
