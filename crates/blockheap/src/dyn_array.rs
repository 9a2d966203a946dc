//! Growable byte array built from fixed-size blocks.
//!
//! The first [`DYN_ARRAY_DATA_SIZE`] bytes live inline in the array. Once
//! they run out, further blocks of the same size are allocated from an
//! auxiliary [`Heap`] and linked through a [`Chain`]. Data never moves, so a
//! slice returned by [`DynArray::push`] stays where it is. A request never
//! straddles two blocks: if it does not fit in the last block, that block is
//! marked full and a new one is started.
//!
//! ```
//! use blockheap::DynArray;
//!
//! let mut arr = DynArray::new();
//! arr.push(4).unwrap().copy_from_slice(b"head");
//! arr.push_bytes(&[7u8; 1000]).unwrap();
//!
//! assert_eq!(arr.data_size(), 1004);
//! assert_eq!(&arr.element(0).unwrap()[..4], b"head");
//! assert!(arr.block_count() > 1);
//! ```

use std::fmt;

use blockheap_log::debug;
use blockheap_mem::{Allocation, Chain, Heap, Link, Linked};

use crate::error::{Error, Result};

/// Bytes held by each block of a [`DynArray`].
pub const DYN_ARRAY_DATA_SIZE: usize = 512;

struct DynBlock {
    link: Link,
    data: Allocation,
    used: usize,
    full: bool,
}

impl Linked for DynBlock {
    fn link(&self) -> &Link {
        &self.link
    }

    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

/// A byte array made of [`DYN_ARRAY_DATA_SIZE`]-byte blocks.
pub struct DynArray {
    inline: [u8; DYN_ARRAY_DATA_SIZE],
    inline_used: usize,
    inline_full: bool,
    heap: Option<Heap>,
    blocks: Chain<DynBlock>,
    open: Option<usize>,
}

impl DynArray {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inline: [0; DYN_ARRAY_DATA_SIZE],
            inline_used: 0,
            inline_full: false,
            heap: None,
            blocks: Chain::new(),
            open: None,
        }
    }

    /// Appends `size` bytes and returns them for the caller to fill.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChunk`] unless `0 < size <= DYN_ARRAY_DATA_SIZE`,
    /// or [`Error::Heap`] if a new block cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics while a buffer from [`DynArray::open`] is still open.
    pub fn push(&mut self, size: usize) -> Result<&mut [u8]> {
        self.assert_closed();
        check_chunk(size)?;
        self.reserve(size)?;
        self.commit(size);

        let end = self.last_used();
        Ok(&mut self.last_data_mut()[end - size..end])
    }

    /// Reserves `size` bytes without committing them; [`DynArray::close`]
    /// commits the part actually written.
    ///
    /// # Errors
    ///
    /// Same as [`DynArray::push`].
    ///
    /// # Panics
    ///
    /// Panics while another buffer is still open.
    pub fn open(&mut self, size: usize) -> Result<&mut [u8]> {
        self.assert_closed();
        check_chunk(size)?;
        self.reserve(size)?;
        self.open = Some(size);

        let used = self.last_used();
        Ok(&mut self.last_data_mut()[used..used + size])
    }

    /// Commits `written` bytes of the buffer returned by the last
    /// [`DynArray::open`].
    ///
    /// # Panics
    ///
    /// Panics if no buffer is open or `written` exceeds the opened size.
    pub fn close(&mut self, written: usize) {
        let Some(opened) = self.open.take() else {
            panic!("close without a matching open");
        };
        assert!(
            written <= opened,
            "closed {written} bytes of a {opened} byte buffer"
        );
        self.commit(written);
    }

    /// Appends `data`, split into block-sized pieces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Heap`] if a new block cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics while a buffer from [`DynArray::open`] is still open.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<()> {
        for piece in data.chunks(DYN_ARRAY_DATA_SIZE) {
            self.push(piece.len())?.copy_from_slice(piece);
        }
        Ok(())
    }

    /// Bytes from logical position `pos` to the end of the block holding it.
    #[must_use]
    pub fn element(&self, mut pos: usize) -> Option<&[u8]> {
        for chunk in self.chunks() {
            if pos < chunk.len() {
                return Some(&chunk[pos..]);
            }
            pos -= chunk.len();
        }
        None
    }

    /// Total number of committed bytes.
    #[must_use]
    pub fn data_size(&self) -> usize {
        self.chunks().map(<[u8]>::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_size() == 0
    }

    /// Number of blocks, the inline one included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        1 + self.blocks.len()
    }

    /// Number of blocks sealed because a request did not fit.
    #[must_use]
    pub fn full_blocks(&self) -> usize {
        usize::from(self.inline_full) + self.blocks.iter().filter(|(_, b)| b.full).count()
    }

    /// Iterates the committed bytes of each block in order.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let heap = self.heap.as_ref();
        std::iter::once(&self.inline[..self.inline_used]).chain(
            self.blocks
                .iter()
                .filter_map(move |(_, block)| Some(&heap?.bytes(&block.data)[..block.used])),
        )
    }

    /// Copies every committed byte into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_size());
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }

    fn assert_closed(&self) {
        if let Some(opened) = self.open {
            panic!("{opened} byte buffer still open");
        }
    }

    fn reserve(&mut self, size: usize) -> Result<()> {
        if self.last_used() + size > DYN_ARRAY_DATA_SIZE {
            self.add_block()?;
        }
        Ok(())
    }

    fn add_block(&mut self) -> Result<()> {
        let heap = match self.heap.take() {
            Some(heap) => heap,
            None => Heap::new(DYN_ARRAY_DATA_SIZE)?,
        };
        let data = self.heap.insert(heap).alloc(DYN_ARRAY_DATA_SIZE)?;

        match self.blocks.last().and_then(|id| self.blocks.get_mut(id)) {
            Some(last) => last.full = true,
            None => self.inline_full = true,
        }
        self.blocks.push_back(DynBlock {
            link: Link::new(),
            data,
            used: 0,
            full: false,
        });

        debug!("dynamic array grew to {} blocks", self.block_count());
        Ok(())
    }

    fn commit(&mut self, size: usize) {
        match self.blocks.last().and_then(|id| self.blocks.get_mut(id)) {
            Some(last) => last.used += size,
            None => self.inline_used += size,
        }
        debug_assert!(self.last_used() <= DYN_ARRAY_DATA_SIZE);
    }

    fn last_used(&self) -> usize {
        match self.blocks.last().and_then(|id| self.blocks.get(id)) {
            Some(last) => last.used,
            None => self.inline_used,
        }
    }

    fn last_data_mut(&mut self) -> &mut [u8] {
        let last = self.blocks.last().and_then(|id| self.blocks.get(id));
        match (last, self.heap.as_mut()) {
            (Some(last), Some(heap)) => heap.bytes_mut(&last.data),
            _ => &mut self.inline[..],
        }
    }
}

impl Default for DynArray {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DynArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynArray")
            .field("data_size", &self.data_size())
            .field("blocks", &self.block_count())
            .field("full_blocks", &self.full_blocks())
            .finish()
    }
}

fn check_chunk(size: usize) -> Result<()> {
    if size == 0 || size > DYN_ARRAY_DATA_SIZE {
        return Err(Error::InvalidChunk {
            size,
            max: DYN_ARRAY_DATA_SIZE,
        });
    }
    Ok(())
}
