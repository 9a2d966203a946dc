//! Chained-block heap with bump allocation and stack-discipline rollback.
//!
//! A [`Heap`] is a chain of [`Block`]s. Allocation bumps the tail block's
//! `used` offset; when the tail cannot fit a request a bigger block is
//! appended (see [`GrowthPolicy`]). Nothing is freed individually: callers
//! discard the most recent allocations with [`Heap::free_top`], everything
//! after a [`Bookmark`] with [`Heap::free_to_bookmark`], or everything with
//! [`Heap::empty`]. Blocks emptied by a rollback are released, except the
//! first block which lives as long as the heap.
//!
//! Allocations are addressed through [`Allocation`] handles instead of raw
//! pointers. A handle names its block by [`NodeId`], so using a handle whose
//! block was released panics instead of reading freed memory.
//!
//! # Examples
//!
//! ```
//! use blockheap_mem::Heap;
//!
//! let mut heap = Heap::new(0).unwrap();
//!
//! let name = heap.strdup("blockheap").unwrap();
//! let mark = heap.heap_top();
//!
//! for i in 0..100u8 {
//!     let scratch = heap.alloc(32).unwrap();
//!     heap.bytes_mut(&scratch).fill(i);
//! }
//! assert!(heap.block_count() > 1);
//!
//! heap.free_to_bookmark(mark);
//! assert_eq!(heap.block_count(), 1);
//! assert_eq!(heap.as_cstr(&name).unwrap().to_str(), Ok("blockheap"));
//! ```

use std::cell::Cell;
use std::ffi::CStr;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use blockheap_log::{debug, error, trace};

use crate::block::{ALIGNMENT, Block, checked_align_up};
use crate::chain::{Chain, NodeId};
use crate::config::HeapConfig;
use crate::error::{HeapError, Result};
use crate::growth::GrowthPolicy;
use crate::guard;

/// Bytes a request of `n` consumes in a block when each guard is `guard`
/// bytes wide.
///
/// ```
/// use blockheap_mem::space_needed;
///
/// assert_eq!(space_needed(10, 0), 16);
/// assert_eq!(space_needed(10, 16), 48);
/// assert_eq!(space_needed(0, 0), 0);
/// ```
#[must_use]
pub const fn space_needed(n: usize, guard: usize) -> usize {
    crate::block::align_up(n + 2 * guard, ALIGNMENT)
}

fn checked_space_needed(n: usize, guard: usize) -> Result<usize> {
    n.checked_add(2 * guard)
        .and_then(|padded| checked_align_up(padded, ALIGNMENT))
        .ok_or(HeapError::CapacityOverflow { requested: n })
}

/// A byte range handed out by a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    block: NodeId,
    offset: usize,
    len: usize,
}

impl Allocation {
    /// Block the range lives in.
    #[must_use]
    pub const fn block(&self) -> NodeId {
        self.block
    }

    /// Offset of the first user byte, measured from the block base.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Number of user bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sub-range of `len` bytes starting `start` bytes into this allocation.
    ///
    /// The result reads and writes like any other handle but is never the
    /// heap top; roll back with the original handle.
    ///
    /// # Panics
    ///
    /// Panics if the range does not lie within this allocation.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Allocation {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "slice {start}+{len} out of a {} byte allocation",
            self.len
        );
        Allocation {
            block: self.block,
            offset: self.offset + start,
            len,
        }
    }
}

/// A saved position of the heap top, see [`Heap::heap_top`].
///
/// A bookmark is only valid while the allocations below it stay live: once
/// its block has been emptied (by [`Heap::empty`] or by rolling back past
/// it) the bookmark is stale and [`Heap::free_to_bookmark`] panics on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bookmark {
    block: NodeId,
    offset: usize,
    /// Block reset count when taken; zero at the block start, where a
    /// bookmark can never go stale.
    resets: u64,
}

impl Bookmark {
    #[must_use]
    pub const fn block(&self) -> NodeId {
        self.block
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }
}

/// Heap usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Sum of all block capacities, headers included.
    pub total_size: usize,
    /// Number of blocks in the chain.
    pub block_count: usize,
    /// Bytes handed out across all blocks, guards and padding included.
    pub used_bytes: usize,
}

/// A growable arena of chained blocks.
///
/// All mutation takes `&mut self`; a heap can move between threads but is
/// not shared between them.
pub struct Heap {
    blocks: Chain<Block>,
    total_size: usize,
    config: HeapConfig,
    policy: GrowthPolicy,
    guard: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl Heap {
    /// Creates a heap whose first block can hold one `size_hint`-byte
    /// allocation. A hint of zero uses the configured minimum.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if the first block cannot be acquired.
    pub fn new(size_hint: usize) -> Result<Self> {
        Self::with_config(size_hint, HeapConfig::default())
    }

    /// Creates a heap with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if the first block cannot be acquired.
    pub fn with_config(size_hint: usize, config: HeapConfig) -> Result<Self> {
        let guard = config.guard_size();
        let policy = GrowthPolicy::new(&config);
        let block = Block::new(checked_space_needed(policy.initial(size_hint), guard)?)?;
        let total_size = block.capacity();

        let mut blocks = Chain::new();
        blocks.push_back(block);

        debug!(
            "created heap of {} bytes (guards {})",
            total_size,
            if guard > 0 { "on" } else { "off" }
        );

        Ok(Heap {
            blocks,
            total_size,
            config,
            policy,
            guard,
            _not_sync: PhantomData,
        })
    }

    /// The configuration this heap was created with.
    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Width of each guard region, zero when guards are off.
    #[must_use]
    pub const fn guard_size(&self) -> usize {
        self.guard
    }

    /// Bytes an `n`-byte allocation consumes in this heap.
    #[must_use]
    pub const fn space_needed(&self, n: usize) -> usize {
        space_needed(n, self.guard)
    }

    /// Sum of all block capacities.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.total_size
    }

    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Iterates the blocks from first to last.
    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = &Block> + '_ {
        self.blocks.iter().map(|(_, block)| block)
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            total_size: self.total_size,
            block_count: self.blocks.len(),
            used_bytes: self.blocks().map(Block::used_bytes).sum(),
        }
    }

    /// Allocates `n` bytes from the tail block, appending a block if needed.
    ///
    /// The contents are unspecified; see [`Heap::zalloc`].
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block is needed and cannot be acquired.
    pub fn alloc(&mut self, n: usize) -> Result<Allocation> {
        let space = checked_space_needed(n, self.guard)?;
        let guard = self.guard;

        let mut id = self.tail_id();
        if !self.block(id).fits(space) {
            id = self.add_block(n)?;
        }

        let block = self.block_mut(id);
        let at = block.bump(space);
        if guard > 0 {
            guard::fill(block, at, n, space);
        }

        Ok(Allocation {
            block: id,
            offset: at + guard,
            len: n,
        })
    }

    /// Allocates `n` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn zalloc(&mut self, n: usize) -> Result<Allocation> {
        let alloc = self.alloc(n)?;
        self.bytes_mut(&alloc).fill(0);
        Ok(alloc)
    }

    /// Copies `data` into a fresh allocation.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn dup(&mut self, data: &[u8]) -> Result<Allocation> {
        let alloc = self.alloc(data.len())?;
        self.bytes_mut(&alloc).copy_from_slice(data);
        Ok(alloc)
    }

    /// Copies `s` into a fresh NUL-terminated allocation of `s.len() + 1`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn strdup(&mut self, s: &str) -> Result<Allocation> {
        self.strdupl(s.as_bytes())
    }

    /// Copies a byte string that is not NUL-terminated and terminates it.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn strdupl(&mut self, bytes: &[u8]) -> Result<Allocation> {
        let len = bytes.len();
        let total = len
            .checked_add(1)
            .ok_or(HeapError::CapacityOverflow { requested: len })?;

        let alloc = self.alloc(total)?;
        let buf = self.bytes_mut(&alloc);
        buf[..len].copy_from_slice(bytes);
        buf[len] = 0;
        Ok(alloc)
    }

    /// Concatenates two strings into a NUL-terminated allocation.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn strcat(&mut self, a: &str, b: &str) -> Result<Allocation> {
        let len = a.len() + b.len();
        let total = len
            .checked_add(1)
            .ok_or(HeapError::CapacityOverflow { requested: len })?;

        let alloc = self.alloc(total)?;
        let buf = self.bytes_mut(&alloc);
        buf[..a.len()].copy_from_slice(a.as_bytes());
        buf[a.len()..len].copy_from_slice(b.as_bytes());
        buf[len] = 0;
        Ok(alloc)
    }

    /// Formats `args` into a NUL-terminated allocation.
    ///
    /// ```
    /// use blockheap_mem::Heap;
    ///
    /// let mut heap = Heap::new(0).unwrap();
    /// let msg = heap.alloc_fmt(format_args!("{}-{}", "block", 7)).unwrap();
    /// assert_eq!(heap.bytes(&msg), b"block-7\0");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Format`] if a formatting trait fails, or another
    /// [`HeapError`] if a new block cannot be acquired.
    pub fn alloc_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<Allocation> {
        let mut counter = ByteCounter(0);
        fmt::write(&mut counter, args).map_err(|_| HeapError::Format)?;
        let len = counter.0;

        let alloc = self.alloc(len + 1)?;
        let mut writer = SliceWriter {
            buf: self.bytes_mut(&alloc),
            pos: 0,
        };
        let written = fmt::write(&mut writer, args).map(|()| writer.pos);

        match written {
            Ok(pos) if pos == len => {
                self.bytes_mut(&alloc)[len] = 0;
                Ok(alloc)
            }
            _ => {
                self.free_top(alloc.len);
                Err(HeapError::Format)
            }
        }
    }

    /// Discards `top` if it is the most recent allocation, then allocates
    /// `new_size` bytes. Shrinking or growing the top element in place
    /// therefore reuses its offset.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn replace(&mut self, top: &Allocation, new_size: usize) -> Result<Allocation> {
        if self.is_top(top) {
            self.free_top(top.len);
        }
        self.alloc(new_size)
    }

    /// [`Heap::replace`] followed by copying `data` into the result.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn dup_replace(&mut self, top: &Allocation, data: &[u8]) -> Result<Allocation> {
        let alloc = self.replace(top, data.len())?;
        self.bytes_mut(&alloc).copy_from_slice(data);
        Ok(alloc)
    }

    /// [`Heap::replace`] with a NUL-terminated copy of `s`.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError`] if a new block cannot be acquired.
    pub fn strdup_replace(&mut self, top: &Allocation, s: &str) -> Result<Allocation> {
        let len = s.len();
        let alloc = self.replace(top, len + 1)?;
        let buf = self.bytes_mut(&alloc);
        buf[..len].copy_from_slice(s.as_bytes());
        buf[len] = 0;
        Ok(alloc)
    }

    /// Current top of the heap.
    #[must_use]
    pub fn heap_top(&self) -> Bookmark {
        let id = self.tail_id();
        let block = self.block(id);
        Bookmark {
            block: id,
            offset: block.used(),
            resets: if block.is_empty() { 0 } else { block.resets() },
        }
    }

    /// Handle to the topmost element, assuming it was allocated with size `n`.
    ///
    /// # Panics
    ///
    /// Panics if the tail block holds fewer than `space_needed(n)` bytes.
    #[must_use]
    pub fn get_top(&self, n: usize) -> Allocation {
        let id = self.tail_id();
        let block = self.block(id);
        let space = self.space_needed(n);

        if block.used_bytes() < space {
            error!(
                "get_top({}): tail block only holds {} bytes",
                n,
                block.used_bytes()
            );
            panic!("get_top({n}): tail block only holds {} bytes", block.used_bytes());
        }

        Allocation {
            block: id,
            offset: block.used() - space + self.guard,
            len: n,
        }
    }

    /// Returns true if `alloc` is the most recent allocation in the heap.
    #[must_use]
    pub fn is_top(&self, alloc: &Allocation) -> bool {
        let id = self.tail_id();
        if alloc.block != id {
            return false;
        }

        let Ok(space) = checked_space_needed(alloc.len, self.guard) else {
            return false;
        };
        let block = self.block(id);
        block.used_bytes() >= space && alloc.offset == block.used() - space + self.guard
    }

    /// Discards the topmost allocation of `n` bytes.
    ///
    /// If that empties a block other than the first, the block is released.
    ///
    /// # Panics
    ///
    /// Panics if the tail block holds fewer than `space_needed(n)` bytes, or
    /// if the discarded allocation's guard bytes were overwritten.
    pub fn free_top(&mut self, n: usize) {
        let guard = self.guard;
        let head = self.head_id();
        let id = self.tail_id();
        let space = space_needed(n, guard);

        let block = self.block_mut(id);
        if block.used_bytes() < space {
            error!(
                "free_top({}): tail block only holds {} bytes",
                n,
                block.used_bytes()
            );
            panic!("free_top({n}): tail block only holds {} bytes", block.used_bytes());
        }

        let at = block.used() - space;
        if guard > 0 {
            guard::check_before(block, at);
            guard::check_after(block, at, n, space);
        }
        block.rewind(at);
        let emptied = block.is_empty();

        trace!("free_top: released {} bytes", space);

        if emptied && id != head {
            self.release_block(id);
        }
    }

    /// Rolls the heap back to `bookmark`, releasing every block appended
    /// since it was taken.
    ///
    /// # Panics
    ///
    /// Panics if the bookmark is stale: its block was released, its offset
    /// lies above the block's current top, or the block was emptied since the
    /// bookmark was taken. Also panics if guard validation fails.
    pub fn free_to_bookmark(&mut self, bookmark: Bookmark) {
        let Some(block) = self.blocks.get(bookmark.block) else {
            error!("stale bookmark: {:?} was released", bookmark.block);
            panic!("stale bookmark: block {:?} was released", bookmark.block);
        };
        if bookmark.offset < block.start() || bookmark.offset > block.used() {
            error!(
                "stale bookmark: offset {} outside [{}, {}]",
                bookmark.offset,
                block.start(),
                block.used()
            );
            panic!(
                "stale bookmark: offset {} outside [{}, {}]",
                bookmark.offset,
                block.start(),
                block.used()
            );
        }
        if bookmark.offset > block.start() && bookmark.resets != block.resets() {
            error!(
                "stale bookmark: block {:?} was emptied since offset {} was marked",
                bookmark.block, bookmark.offset
            );
            panic!(
                "stale bookmark: block {:?} was emptied since offset {} was marked",
                bookmark.block, bookmark.offset
            );
        }

        let mut released = 0;
        loop {
            let tail = self.tail_id();
            if tail == bookmark.block {
                break;
            }
            self.release_block(tail);
            released += 1;
        }

        let guard = self.guard;
        let head = self.head_id();
        let block = self.block_mut(bookmark.block);
        if bookmark.offset == block.used() {
            trace!("free_to_bookmark: released {} blocks", released);
            return;
        }

        if guard > 0 {
            guard::check_before(block, bookmark.offset);
            guard::check_trailing(block, block.used());
        }
        let rolled_back = block.used() - bookmark.offset;
        block.rewind(bookmark.offset);
        let emptied = block.is_empty();

        trace!(
            "free_to_bookmark: released {} blocks and {} bytes",
            released, rolled_back
        );

        if emptied && bookmark.block != head {
            self.release_block(bookmark.block);
        }
    }

    /// Discards every allocation. The first block stays alive.
    pub fn empty(&mut self) {
        let head = self.head_id();
        let start = self.block(head).start();
        self.free_to_bookmark(Bookmark {
            block: head,
            offset: start,
            resets: 0,
        });
    }

    /// Bytes of a live allocation.
    ///
    /// # Panics
    ///
    /// Panics if the allocation's block was released or the allocation was
    /// rolled back.
    #[must_use]
    pub fn bytes(&self, alloc: &Allocation) -> &[u8] {
        self.live_block(alloc).bytes(alloc.offset, alloc.len)
    }

    /// Mutable bytes of a live allocation.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Heap::bytes`].
    #[must_use]
    pub fn bytes_mut(&mut self, alloc: &Allocation) -> &mut [u8] {
        self.live_block_mut(alloc).bytes_mut(alloc.offset, alloc.len)
    }

    /// Views a NUL-terminated allocation as a C string.
    ///
    /// Returns `None` if the allocation contains no NUL byte.
    #[must_use]
    pub fn as_cstr(&self, alloc: &Allocation) -> Option<&CStr> {
        CStr::from_bytes_until_nul(self.bytes(alloc)).ok()
    }

    /// Raw pointer to the first byte of a live allocation.
    ///
    /// The pointer carries the provenance of the whole block, so with guards
    /// on the guard bytes before and after the allocation are addressable
    /// too, which is how overruns and underruns are caught. Writes are only
    /// meaningful within `alloc.len()` bytes and while the allocation stays
    /// live.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Heap::bytes`].
    #[must_use]
    pub fn as_mut_ptr(&mut self, alloc: &Allocation) -> NonNull<u8> {
        self.live_block_mut(alloc).ptr_at(alloc.offset)
    }

    /// Checks the chain's structural invariants.
    ///
    /// # Panics
    ///
    /// Panics if a block violates `start <= used <= capacity`, a back link is
    /// broken, or the capacities do not sum to [`Heap::size`].
    pub fn validate(&self) {
        let mut prev = None;
        let mut total = 0;

        for (id, block) in self.blocks.iter() {
            assert!(block.is_consistent(), "inconsistent block {id:?}: {block:?}");
            assert_eq!(
                self.blocks.prev_of(id),
                prev,
                "broken back link at block {id:?}"
            );
            total += block.capacity();
            prev = Some(id);
        }

        assert_eq!(self.blocks.last(), prev, "chain tail is out of sync");
        assert_eq!(total, self.total_size, "total_size is out of sync");
    }

    fn add_block(&mut self, n: usize) -> Result<NodeId> {
        #[cfg(debug_assertions)]
        self.validate();

        let tail = self.tail_id();
        let size = self.policy.next(self.block(tail).capacity(), n);
        let block = Block::new(checked_space_needed(size, self.guard)?)?;
        let capacity = block.capacity();

        self.total_size += capacity;
        let id = self.blocks.insert_after(tail, block);

        debug!(
            "appended block of {} bytes for a {} byte request ({} blocks, {} bytes total)",
            capacity,
            n,
            self.blocks.len(),
            self.total_size
        );

        Ok(id)
    }

    fn release_block(&mut self, id: NodeId) {
        let Some(block) = self.blocks.remove(id) else {
            panic!("release of unlinked block {id:?}");
        };
        self.total_size -= block.capacity();

        debug!(
            "released block of {} bytes ({} blocks, {} bytes total)",
            block.capacity(),
            self.blocks.len(),
            self.total_size
        );

        if self.guard > 0 && !block.is_empty() && !std::thread::panicking() {
            guard::check_before(&block, block.start());
            guard::check_trailing(&block, block.used());
        }
    }

    fn head_id(&self) -> NodeId {
        self.blocks.first().expect("heap always owns its first block")
    }

    fn tail_id(&self) -> NodeId {
        self.blocks.last().expect("heap always owns its first block")
    }

    fn block(&self, id: NodeId) -> &Block {
        self.blocks
            .get(id)
            .unwrap_or_else(|| panic!("block {id:?} was released"))
    }

    fn block_mut(&mut self, id: NodeId) -> &mut Block {
        self.blocks
            .get_mut(id)
            .unwrap_or_else(|| panic!("block {id:?} was released"))
    }

    fn live_block(&self, alloc: &Allocation) -> &Block {
        let block = self.block(alloc.block);
        assert!(
            alloc.offset + alloc.len <= block.used(),
            "allocation at offset {} was rolled back",
            alloc.offset
        );
        block
    }

    fn live_block_mut(&mut self, alloc: &Allocation) -> &mut Block {
        let block = self.block_mut(alloc.block);
        assert!(
            alloc.offset + alloc.len <= block.used(),
            "allocation at offset {} was rolled back",
            alloc.offset
        );
        block
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        while let Some(tail) = self.blocks.last() {
            self.release_block(tail);
        }
        debug!("heap dropped");
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("total_size", &self.total_size)
            .field("guard", &self.guard)
            .field("blocks", &self.blocks().collect::<Vec<_>>())
            .finish()
    }
}

struct ByteCounter(usize);

impl fmt::Write for ByteCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.pos + s.len();
        // The buffer has one spare byte for the terminator.
        if end >= self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(s.as_bytes());
        self.pos = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_HEADER_SIZE;
    use crate::config::{MIN_BLOCK_SIZE, STANDARD_BLOCK_SIZE};
    use crate::guard::{AFTER_BYTE, BEFORE_BYTE, GUARD_SIZE};

    fn unguarded(hint: usize) -> Heap {
        Heap::with_config(hint, HeapConfig::new().with_guards(false)).unwrap()
    }

    fn guarded(hint: usize) -> Heap {
        Heap::with_config(hint, HeapConfig::new().with_guards(true)).unwrap()
    }

    fn tail(heap: &Heap) -> &Block {
        heap.blocks().next_back().unwrap()
    }

    #[test]
    fn test_new_heap_layout() {
        let heap = unguarded(0);
        let block = tail(&heap);

        assert_eq!(heap.block_count(), 1);
        assert_eq!(block.capacity(), BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE);
        assert_eq!(block.used(), block.start());
        assert_eq!(heap.size(), block.capacity());
        heap.validate();
    }

    #[test]
    fn test_size_hint_fits_one_buffer() {
        let mut heap = guarded(300);
        let before = heap.block_count();
        heap.alloc(300).unwrap();
        assert_eq!(heap.block_count(), before);
    }

    #[test]
    fn test_scenario_reuse_after_free_top() {
        let mut heap = unguarded(0);

        let p0 = heap.alloc(10).unwrap();
        let p1 = heap.alloc(20).unwrap();
        assert_eq!(p1.offset(), p0.offset() + heap.space_needed(10));

        heap.free_top(20);
        let p2 = heap.alloc(5).unwrap();
        assert_eq!(p2.offset(), p1.offset());
        assert_eq!(p2.block(), p1.block());
    }

    #[test]
    fn test_alloc_offsets_are_sequential() {
        let mut heap = guarded(1024);
        let a = heap.alloc(3).unwrap();
        let b = heap.alloc(17).unwrap();
        let c = heap.alloc(0).unwrap();

        assert_eq!(a.offset(), tail(&heap).start() + GUARD_SIZE);
        assert_eq!(b.offset(), a.offset() + heap.space_needed(3));
        assert_eq!(c.offset(), b.offset() + heap.space_needed(17));
        assert_eq!(a.offset() % ALIGNMENT, 0);
        assert_eq!(b.offset() % ALIGNMENT, 0);
    }

    #[test]
    fn test_guard_bytes_written() {
        let mut heap = guarded(0);
        let a = heap.alloc(10).unwrap();
        let block = tail(&heap);

        let before = block.bytes(a.offset() - GUARD_SIZE, GUARD_SIZE);
        assert!(before.iter().all(|&b| b == BEFORE_BYTE));
        let after = block.bytes(a.offset() + 10, heap.space_needed(10) - GUARD_SIZE - 10);
        assert!(after.iter().all(|&b| b == AFTER_BYTE));
    }

    #[test]
    fn test_growth_adds_one_block() {
        let mut heap = unguarded(0);
        let first = heap.size();

        let big = heap.alloc(STANDARD_BLOCK_SIZE + 1).unwrap();
        assert_eq!(heap.block_count(), 2);

        let grown = tail(&heap);
        assert!(grown.capacity() >= STANDARD_BLOCK_SIZE + 1);
        assert_eq!(heap.size(), first + grown.capacity());
        assert_eq!(big.block(), heap.heap_top().block());
        heap.validate();
    }

    #[test]
    fn test_growth_doubles_tail() {
        let mut heap = unguarded(0);
        let first = tail(&heap).capacity();

        heap.alloc(MIN_BLOCK_SIZE).unwrap();
        heap.alloc(8).unwrap();

        assert_eq!(heap.block_count(), 2);
        assert_eq!(tail(&heap).capacity(), BLOCK_HEADER_SIZE + 2 * first);
    }

    #[test]
    fn test_free_top_releases_empty_tail() {
        let mut heap = unguarded(0);
        heap.alloc(MIN_BLOCK_SIZE).unwrap();
        let size = heap.size();

        heap.alloc(100).unwrap();
        assert_eq!(heap.block_count(), 2);

        heap.free_top(100);
        assert_eq!(heap.block_count(), 1);
        assert_eq!(heap.size(), size);
    }

    #[test]
    fn test_free_top_keeps_first_block() {
        let mut heap = guarded(0);
        heap.alloc(8).unwrap();
        heap.free_top(8);

        assert_eq!(heap.block_count(), 1);
        assert!(tail(&heap).is_empty());
    }

    #[test]
    #[should_panic(expected = "tail block only holds")]
    fn test_free_top_too_large_panics() {
        let mut heap = unguarded(0);
        heap.alloc(8).unwrap();
        heap.free_top(64);
    }

    #[test]
    fn test_bookmark_round_trip() {
        let mut heap = guarded(0);
        heap.alloc(24).unwrap();

        let mark = heap.heap_top();
        let size = heap.size();
        let blocks = heap.block_count();

        for n in [5, 300, 17, 2000, 64] {
            heap.alloc(n).unwrap();
        }
        assert!(heap.block_count() > blocks);

        heap.free_to_bookmark(mark);
        assert_eq!(heap.heap_top(), mark);
        assert_eq!(heap.size(), size);
        assert_eq!(heap.block_count(), blocks);
        heap.validate();
    }

    #[test]
    fn test_bookmark_at_top_is_noop() {
        let mut heap = guarded(0);
        heap.alloc(24).unwrap();
        let mark = heap.heap_top();
        heap.free_to_bookmark(mark);
        assert_eq!(heap.heap_top(), mark);
    }

    #[test]
    #[should_panic(expected = "stale bookmark")]
    fn test_released_bookmark_panics() {
        let mut heap = unguarded(0);
        heap.alloc(MIN_BLOCK_SIZE).unwrap();
        heap.alloc(8).unwrap();
        let mark = heap.heap_top();

        heap.empty();
        heap.free_to_bookmark(mark);
    }

    #[test]
    #[should_panic(expected = "stale bookmark")]
    fn test_bookmark_from_before_empty_panics() {
        let mut heap = unguarded(0);
        heap.alloc(8).unwrap();
        heap.alloc(8).unwrap();
        let mark = heap.heap_top();

        heap.empty();
        for _ in 0..3 {
            heap.alloc(8).unwrap();
        }
        heap.free_to_bookmark(mark);
    }

    #[test]
    #[should_panic(expected = "stale bookmark")]
    fn test_guarded_bookmark_from_before_empty_panics() {
        let mut heap = guarded(0);
        heap.alloc(8).unwrap();
        let mark = heap.heap_top();

        heap.empty();
        heap.alloc(3).unwrap();
        heap.alloc(40).unwrap();
        heap.free_to_bookmark(mark);
    }

    #[test]
    #[should_panic(expected = "stale bookmark")]
    fn test_bookmark_past_rolled_back_top_panics() {
        let mut heap = unguarded(0);
        heap.alloc(16).unwrap();
        let mark = heap.heap_top();

        heap.free_top(16);
        heap.alloc(8).unwrap();
        heap.alloc(8).unwrap();
        heap.free_to_bookmark(mark);
    }

    #[test]
    fn test_bookmarks_survive_refill_after_empty() {
        let mut heap = unguarded(0);
        let at_start = heap.heap_top();
        heap.alloc(8).unwrap();
        heap.empty();

        let kept = heap.alloc(8).unwrap();
        let mark = heap.heap_top();
        heap.alloc(8).unwrap();
        heap.free_to_bookmark(mark);
        assert!(heap.is_top(&kept));

        heap.free_to_bookmark(at_start);
        assert_eq!(heap.heap_top(), at_start);
    }

    #[test]
    #[should_panic(expected = "stale bookmark")]
    fn test_bookmark_above_top_panics() {
        let mut heap = unguarded(0);
        heap.alloc(16).unwrap();
        let mark = heap.heap_top();

        heap.free_top(16);
        heap.free_to_bookmark(mark);
    }

    #[test]
    fn test_empty_is_idempotent() {
        let mut heap = guarded(0);
        for n in 0..40 {
            heap.alloc(n * 7).unwrap();
        }

        heap.empty();
        heap.empty();

        assert_eq!(heap.block_count(), 1);
        let block = tail(&heap);
        assert_eq!(block.used(), block.start());
        assert_eq!(heap.size(), block.capacity());
    }

    #[test]
    fn test_is_top_and_get_top() {
        let mut heap = guarded(0);
        let a = heap.alloc(12).unwrap();
        assert!(heap.is_top(&a));

        let b = heap.alloc(4).unwrap();
        assert!(!heap.is_top(&a));
        assert!(heap.is_top(&b));
        assert_eq!(heap.get_top(4), b);

        heap.free_top(4);
        assert!(heap.is_top(&a));
    }

    #[test]
    fn test_zalloc_and_dup() {
        let mut heap = guarded(0);
        let z = heap.zalloc(9).unwrap();
        assert_eq!(heap.bytes(&z), &[0; 9]);

        let d = heap.dup(b"payload").unwrap();
        assert_eq!(heap.bytes(&d), b"payload");
    }

    #[test]
    fn test_string_helpers() {
        let mut heap = guarded(0);

        let s = heap.strdup("abc").unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(heap.bytes(&s), b"abc\0");

        let l = heap.strdupl(b"xyz").unwrap();
        assert_eq!(heap.as_cstr(&l).unwrap().to_bytes(), b"xyz");

        let c = heap.strcat("block", "heap").unwrap();
        assert_eq!(heap.as_cstr(&c).unwrap().to_str(), Ok("blockheap"));

        let raw = heap.dup(b"no terminator").unwrap();
        assert!(heap.as_cstr(&raw).is_none());
    }

    #[test]
    fn test_alloc_fmt() {
        let mut heap = guarded(0);
        let empty = heap.alloc_fmt(format_args!("")).unwrap();
        assert_eq!(heap.bytes(&empty), b"\0");

        let msg = heap.alloc_fmt(format_args!("{:>4}|{:#x}", 7, 255)).unwrap();
        assert_eq!(heap.as_cstr(&msg).unwrap().to_str(), Ok("   7|0xff"));
    }

    #[test]
    fn test_replace_reuses_top() {
        let mut heap = guarded(0);
        let a = heap.strdup("short").unwrap();
        let b = heap.strdup_replace(&a, "longer text").unwrap();

        assert_eq!(b.offset(), a.offset());
        assert_eq!(heap.as_cstr(&b).unwrap().to_str(), Ok("longer text"));

        let c = heap.dup(b"below").unwrap();
        let d = heap.dup_replace(&b, b"not top").unwrap();
        assert_eq!(heap.as_cstr(&b).unwrap().to_str(), Ok("longer text"));
        assert_eq!(heap.bytes(&c), b"below");
        assert_eq!(heap.bytes(&d), b"not top");
    }

    #[test]
    #[should_panic(expected = "was released")]
    fn test_handle_into_released_block_panics() {
        let mut heap = unguarded(0);
        heap.alloc(MIN_BLOCK_SIZE).unwrap();
        let a = heap.alloc(100).unwrap();
        heap.free_top(100);
        let _ = heap.bytes(&a);
    }

    #[test]
    #[should_panic(expected = "was rolled back")]
    fn test_rolled_back_handle_panics() {
        let mut heap = unguarded(0);
        let a = heap.alloc(16).unwrap();
        heap.free_top(16);
        let _ = heap.bytes(&a);
    }

    #[test]
    fn test_slice_views_part_of_an_allocation() {
        let mut heap = guarded(0);
        let whole = heap.dup(b"0123456789").unwrap();
        let part = whole.slice(3, 4);

        assert_eq!(heap.bytes(&part), b"3456");
        heap.bytes_mut(&part).fill(b'-');
        assert_eq!(heap.bytes(&whole), b"012----789");
        assert!(!heap.is_top(&part));
    }

    #[test]
    #[should_panic(expected = "out of a 4 byte allocation")]
    fn test_slice_out_of_range_panics() {
        let mut heap = unguarded(0);
        let _ = heap.alloc(4).unwrap().slice(2, 3);
    }

    #[test]
    fn test_stats() {
        let mut heap = guarded(0);
        heap.alloc(10).unwrap();
        heap.alloc(10).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.total_size, heap.size());
        assert_eq!(stats.block_count, heap.block_count());
        assert_eq!(stats.used_bytes, 2 * heap.space_needed(10));
    }

    #[test]
    fn test_capacity_overflow_is_an_error() {
        let mut heap = unguarded(0);
        assert_eq!(
            heap.alloc(usize::MAX).unwrap_err(),
            HeapError::CapacityOverflow { requested: usize::MAX }
        );
    }
}
