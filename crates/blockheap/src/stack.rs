//! LIFO stack of fixed-size elements on a heap.
//!
//! Every push is one heap allocation and every pop rolls the heap back by one
//! element, so the heap never holds more than the stack's live contents.

use std::mem;

use blockheap_mem::Heap;

use crate::error::{Error, Result};

/// A stack of `elem_size`-byte elements.
///
/// ```
/// use blockheap::Stack;
///
/// let mut stack = Stack::new(8).unwrap();
/// stack.push_u64(1).unwrap();
/// stack.push_u64(2).unwrap();
///
/// assert_eq!(stack.top(), Some(&2u64.to_be_bytes()[..]));
/// assert_eq!(stack.pop_u64().unwrap(), 2);
/// assert_eq!(stack.len(), 1);
/// ```
#[derive(Debug)]
pub struct Stack {
    heap: Heap,
    elem_size: usize,
    len: usize,
}

impl Stack {
    /// Creates an empty stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Heap`] if the backing heap cannot be created.
    pub fn new(elem_size: usize) -> Result<Self> {
        Ok(Self {
            heap: Heap::new(elem_size)?,
            elem_size,
            len: 0,
        })
    }

    #[must_use]
    pub const fn elem_size(&self) -> usize {
        self.elem_size
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pushes a copy of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementSize`] if `value` is not `elem_size` bytes, or
    /// [`Error::Heap`] if the heap cannot grow.
    pub fn push(&mut self, value: &[u8]) -> Result<()> {
        self.check_size(value.len())?;
        self.heap.dup(value)?;
        self.len += 1;
        Ok(())
    }

    /// The topmost element.
    #[must_use]
    pub fn top(&self) -> Option<&[u8]> {
        if self.is_empty() {
            return None;
        }
        Some(self.heap.bytes(&self.heap.get_top(self.elem_size)))
    }

    /// Copies the topmost element into the front of `out` and pops it.
    /// Returns false if the stack is empty.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than `elem_size`.
    pub fn pop_into(&mut self, out: &mut [u8]) -> bool {
        let Some(top) = self.top() else {
            return false;
        };
        out[..self.elem_size].copy_from_slice(top);
        self.pop()
    }

    /// Discards the topmost element. Returns false if the stack is empty.
    pub fn pop(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.heap.free_top(self.elem_size);
        self.len -= 1;
        true
    }

    /// Discards every element.
    pub fn clear(&mut self) {
        self.heap.empty();
        self.len = 0;
    }

    /// Exchanges the contents of two stacks.
    pub fn swap(&mut self, other: &mut Stack) {
        mem::swap(self, other);
    }

    /// Pushes an 8-byte word in big-endian order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementSize`] unless the element size is 8, or
    /// [`Error::Heap`] if the heap cannot grow.
    pub fn push_u64(&mut self, value: u64) -> Result<()> {
        self.push(&value.to_be_bytes())
    }

    /// Pops an 8-byte big-endian word.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ElementSize`] unless the element size is 8, or
    /// [`Error::EmptyStack`] if there is nothing to pop.
    pub fn pop_u64(&mut self) -> Result<u64> {
        self.check_size(mem::size_of::<u64>())?;
        let mut word = [0u8; 8];
        if !self.pop_into(&mut word) {
            return Err(Error::EmptyStack);
        }
        Ok(u64::from_be_bytes(word))
    }

    fn check_size(&self, got: usize) -> Result<()> {
        if got != self.elem_size {
            return Err(Error::ElementSize {
                expected: self.elem_size,
                got,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_top_pop() {
        let mut stack = Stack::new(3).unwrap();
        assert!(stack.top().is_none());
        assert!(!stack.pop());

        stack.push(b"abc").unwrap();
        stack.push(b"def").unwrap();
        assert_eq!(stack.top(), Some(&b"def"[..]));

        let mut out = [0u8; 3];
        assert!(stack.pop_into(&mut out));
        assert_eq!(&out, b"def");
        assert_eq!(stack.top(), Some(&b"abc"[..]));
        assert!(stack.pop());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_element_size_checked() {
        let mut stack = Stack::new(4).unwrap();
        assert_eq!(
            stack.push(b"toolong").unwrap_err(),
            Error::ElementSize { expected: 4, got: 7 }
        );
        assert_eq!(
            stack.push_u64(1).unwrap_err(),
            Error::ElementSize { expected: 4, got: 8 }
        );
        assert!(stack.pop_u64().is_err());
    }

    #[test]
    fn test_words_are_big_endian() {
        let mut stack = Stack::new(8).unwrap();
        stack.push_u64(0x0102_0304_0506_0708).unwrap();
        assert_eq!(stack.top(), Some(&[1, 2, 3, 4, 5, 6, 7, 8][..]));
        assert_eq!(stack.pop_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(stack.pop_u64().unwrap_err(), Error::EmptyStack);
    }

    #[test]
    fn test_deep_stack_spans_blocks() {
        let mut stack = Stack::new(8).unwrap();
        for i in 0..10_000u64 {
            stack.push_u64(i).unwrap();
        }
        for i in (0..10_000u64).rev() {
            assert_eq!(stack.pop_u64().unwrap(), i);
        }
        assert!(stack.is_empty());
        assert_eq!(stack.heap.block_count(), 1);
    }

    #[test]
    fn test_swap_and_clear() {
        let mut a = Stack::new(1).unwrap();
        let mut b = Stack::new(2).unwrap();
        a.push(b"x").unwrap();

        a.swap(&mut b);
        assert_eq!(a.elem_size(), 2);
        assert!(a.is_empty());
        assert_eq!(b.top(), Some(&b"x"[..]));

        b.push(b"y").unwrap();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.heap.stats().used_bytes, 0);
    }
}
