//! Intrusive doubly-linked chain addressed by generational ids.
//!
//! Elements carry their own [`Link`] (previous/next ids) and expose it through
//! the [`Linked`] trait, so linking a node never allocates anything beyond the
//! node's slot. Slots are recycled; every recycle bumps the slot's generation,
//! which makes a [`NodeId`] of a removed node permanently stale instead of
//! silently aliasing whatever occupies the slot next.
//!
//! The heap uses a `Chain<Block>` for its block list and the dynamic array
//! uses one for its overflow blocks.
//!
//! # Examples
//!
//! ```
//! use blockheap_mem::chain::{Chain, Link, Linked};
//!
//! struct Page {
//!     link: Link,
//!     number: u32,
//! }
//!
//! impl Linked for Page {
//!     fn link(&self) -> &Link {
//!         &self.link
//!     }
//!
//!     fn link_mut(&mut self) -> &mut Link {
//!         &mut self.link
//!     }
//! }
//!
//! let mut chain = Chain::new();
//! let first = chain.push_back(Page { link: Link::new(), number: 1 });
//! chain.push_back(Page { link: Link::new(), number: 3 });
//! chain.insert_after(first, Page { link: Link::new(), number: 2 });
//!
//! let numbers: Vec<u32> = chain.iter().map(|(_, page)| page.number).collect();
//! assert_eq!(numbers, [1, 2, 3]);
//!
//! chain.remove(first);
//! assert!(!chain.contains(first));
//! assert_eq!(chain.len(), 2);
//! ```

/// Stable identifier of a node in a [`Chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index of the node. Slots are reused after removal.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Number of times the slot had been vacated before this node claimed it.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// Previous/next pointers embedded in every chained node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl Link {
    /// An unlinked link.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }

    /// The node before this one, if any.
    #[must_use]
    pub const fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    /// The node after this one, if any.
    #[must_use]
    pub const fn next(&self) -> Option<NodeId> {
        self.next
    }
}

/// Access to the [`Link`] a node embeds.
pub trait Linked {
    /// Returns the node's link.
    fn link(&self) -> &Link;

    /// Returns the node's link mutably. Only [`Chain`] should write through it.
    fn link_mut(&mut self) -> &mut Link;
}

struct Slot<T> {
    generation: u32,
    node: Option<T>,
}

/// Doubly-linked list of `T` with O(1) insertion and removal.
pub struct Chain<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    first: Option<NodeId>,
    last: Option<NodeId>,
    len: usize,
}

impl<T: Linked> Chain<T> {
    /// Creates an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Creates an empty chain with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Number of linked nodes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no node is linked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id of the first node.
    #[must_use]
    pub const fn first(&self) -> Option<NodeId> {
        self.first
    }

    /// Id of the last node.
    #[must_use]
    pub const fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Returns true if `id` names a node that is still linked.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the node for `id`, or `None` if it was removed.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Returns the node for `id` mutably, or `None` if it was removed.
    #[must_use]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Id of the node after `id`.
    #[must_use]
    pub fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.link().next
    }

    /// Id of the node before `id`.
    #[must_use]
    pub fn prev_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.link().prev
    }

    /// Links `node` at the end of the chain.
    pub fn push_back(&mut self, mut node: T) -> NodeId {
        *node.link_mut() = Link {
            prev: self.last,
            next: None,
        };
        let id = self.claim(node);

        match self.last {
            Some(last) => self.linked_mut(last).link_mut().next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;

        id
    }

    /// Links `node` at the front of the chain.
    pub fn push_front(&mut self, mut node: T) -> NodeId {
        *node.link_mut() = Link {
            prev: None,
            next: self.first,
        };
        let id = self.claim(node);

        match self.first {
            Some(first) => self.linked_mut(first).link_mut().prev = Some(id),
            None => self.last = Some(id),
        }
        self.first = Some(id);
        self.len += 1;

        id
    }

    /// Links `node` directly after `anchor`.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not linked in this chain.
    pub fn insert_after(&mut self, anchor: NodeId, mut node: T) -> NodeId {
        let next = self
            .get(anchor)
            .map(|anchor| anchor.link().next)
            .unwrap_or_else(|| panic!("insert_after: {anchor:?} is not linked"));

        *node.link_mut() = Link {
            prev: Some(anchor),
            next,
        };
        let id = self.claim(node);

        self.linked_mut(anchor).link_mut().next = Some(id);
        match next {
            Some(next) => self.linked_mut(next).link_mut().prev = Some(id),
            None => self.last = Some(id),
        }
        self.len += 1;

        id
    }

    /// Unlinks and returns the node for `id`, or `None` if it is not linked.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let mut node = {
            let slot = self.slots.get_mut(id.index())?;
            if slot.generation != id.generation {
                return None;
            }
            let node = slot.node.take()?;
            slot.generation = slot.generation.wrapping_add(1);
            node
        };
        self.vacant.push(id.index);

        let Link { prev, next } = *node.link();
        match prev {
            Some(prev) => self.linked_mut(prev).link_mut().next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.linked_mut(next).link_mut().prev = prev,
            None => self.last = prev,
        }
        *node.link_mut() = Link::new();
        self.len -= 1;

        Some(node)
    }

    /// Unlinks and returns the last node.
    pub fn pop_back(&mut self) -> Option<T> {
        let last = self.last?;
        self.remove(last)
    }

    /// Unlinks every node, last to first.
    pub fn clear(&mut self) {
        while self.pop_back().is_some() {}
    }

    /// Iterates `(id, node)` pairs from first to last.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            chain: self,
            front: self.first,
            back: self.last,
            remaining: self.len,
        }
    }

    /// Iterates `(id, node)` pairs from last to first.
    pub fn iter_rev(&self) -> std::iter::Rev<Iter<'_, T>> {
        self.iter().rev()
    }

    fn claim(&mut self, node: T) -> NodeId {
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len())
            .expect("chain cannot hold more than u32::MAX nodes");
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });

        NodeId {
            index,
            generation: 0,
        }
    }

    fn linked_mut(&mut self, id: NodeId) -> &mut T {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("chain link points at unlinked {id:?}"))
    }
}

impl<T: Linked> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a [`Chain`], see [`Chain::iter`].
pub struct Iter<'a, T> {
    chain: &'a Chain<T>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<'a, T: Linked> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front?;
        let node = self.chain.get(id)?;
        self.front = node.link().next;
        self.remaining -= 1;
        Some((id, node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Linked> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back?;
        let node = self.chain.get(id)?;
        self.back = node.link().prev;
        self.remaining -= 1;
        Some((id, node))
    }
}

impl<T: Linked> ExactSizeIterator for Iter<'_, T> {}
