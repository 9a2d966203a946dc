//! Chained hash table keyed by byte strings.
//!
//! The table has a fixed number of cells chosen by [`find_prime`]. Each cell
//! heads a singly-linked chain of entries; the `next` index lives in the
//! entry itself, so collisions cost no extra allocation. New entries are
//! appended at the tail of their chain.
//!
//! Key bytes are copied into an auxiliary [`Heap`] that is created on the
//! first insert. Removing the most recently inserted key hands its bytes
//! straight back to the heap; the bytes of other removed keys are reclaimed
//! by [`HashTable::clear`].
//!
//! # Examples
//!
//! ```
//! use blockheap::HashTable;
//!
//! let mut table = HashTable::new(16);
//! table.insert(b"alpha", 1).unwrap();
//! table.insert(b"beta", 2).unwrap();
//!
//! assert_eq!(table.get(b"alpha"), Some(&1));
//! assert_eq!(table.insert(b"alpha", 10).unwrap(), Some(1));
//! assert_eq!(table.remove(b"beta"), Some(2));
//! assert_eq!(table.len(), 1);
//! ```

use std::fmt;
use std::hash::BuildHasher;

use blockheap_log::trace;
use blockheap_mem::{Allocation, Heap};
use fxhash::FxBuildHasher;

use crate::error::Result;

/// Picks a prime cell count for a table expected to hold about `n` entries.
///
/// The result keeps clear of powers of two, which would otherwise make
/// `hash % cells` sensitive to regular low bits in the hash.
///
/// ```
/// use blockheap::hash::find_prime;
///
/// let cells = find_prime(1000);
/// assert!(cells > 1000);
/// assert!((2..cells).take_while(|i| i * i <= cells).all(|i| cells % i != 0));
/// ```
#[must_use]
pub fn find_prime(n: u64) -> u64 {
    const RANDOM1: f64 = 1.041_232_1;
    const RANDOM2: f64 = 1.113_134_7;
    const RANDOM3: f64 = 1.013_267_7;

    let mut n = n.saturating_add(100);

    let mut pow2: u64 = 1;
    while pow2.saturating_mul(2) < n {
        pow2 *= 2;
    }

    if (n as f64) < 1.05 * pow2 as f64 {
        n = (n as f64 * RANDOM1) as u64;
    }

    let pow2 = pow2.saturating_mul(2);

    if n as f64 > 0.95 * pow2 as f64 {
        n = (n as f64 * RANDOM2) as u64;
    }

    if n > pow2 - 20 {
        n = n.saturating_add(30);
    }

    n = (n as f64 * RANDOM3) as u64;

    while !is_prime(n) {
        n += 1;
    }
    n
}

fn is_prime(n: u64) -> bool {
    let mut i: u64 = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

struct Entry<V> {
    hash: u64,
    key: Allocation,
    value: V,
    next: Option<usize>,
}

/// A hash table mapping byte-string keys to `V`.
pub struct HashTable<V, S = FxBuildHasher> {
    cells: Vec<Option<usize>>,
    entries: Vec<Option<Entry<V>>>,
    vacant: Vec<usize>,
    heap: Option<Heap>,
    len: usize,
    hasher: S,
}

impl<V> HashTable<V> {
    /// Creates a table sized for about `n` entries, hashing with `FxHash`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self::with_hasher(n, FxBuildHasher::default())
    }
}

impl<V, S: BuildHasher> HashTable<V, S> {
    /// Creates a table sized for about `n` entries with a custom hasher.
    #[must_use]
    pub fn with_hasher(n: usize, hasher: S) -> Self {
        let cells = usize::try_from(find_prime(n as u64)).unwrap_or(usize::MAX);

        Self {
            cells: vec![None; cells],
            entries: Vec::new(),
            vacant: Vec::new(),
            heap: None,
            len: 0,
            hasher,
        }
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of cells, fixed at construction.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// The heap holding key bytes, if any key was ever inserted.
    #[must_use]
    pub const fn key_heap(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }

    /// Inserts `value` under `key`, returning the previous value if the key
    /// was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Heap`](crate::Error::Heap) if the key bytes cannot be
    /// copied into the key heap.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<Option<V>> {
        let hash = self.hasher.hash_one(key);

        if let Some(index) = self.search(hash, key) {
            let entry = self.entry_mut(index);
            return Ok(Some(std::mem::replace(&mut entry.value, value)));
        }

        let heap = match self.heap.take() {
            Some(heap) => heap,
            None => Heap::new(0)?,
        };
        let key = self.heap.insert(heap).dup(key)?;

        let entry = Entry {
            hash,
            key,
            value,
            next: None,
        };
        let index = match self.vacant.pop() {
            Some(index) => {
                self.entries[index] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };

        let cell = self.cell_of(hash);
        let tail = self.chain(self.cells[cell]).last();
        match tail {
            Some(tail) => self.entry_mut(tail).next = Some(index),
            None => self.cells[cell] = Some(index),
        }
        self.len += 1;

        Ok(None)
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let index = self.search(self.hasher.hash_one(key), key)?;
        Some(&self.entry(index).value)
    }

    #[must_use]
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let index = self.search(self.hasher.hash_one(key), key)?;
        Some(&mut self.entry_mut(index).value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.search(self.hasher.hash_one(key), key).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let hash = self.hasher.hash_one(key);
        let index = self.search(hash, key)?;
        let cell = self.cell_of(hash);

        let next = self.entry(index).next;
        if self.cells[cell] == Some(index) {
            self.cells[cell] = next;
        } else {
            let prev = self
                .chain(self.cells[cell])
                .find(|&i| self.entry(i).next == Some(index))?;
            self.entry_mut(prev).next = next;
        }

        let entry = self.entries[index].take()?;
        self.vacant.push(index);
        self.len -= 1;

        if let Some(heap) = &mut self.heap {
            if heap.is_top(&entry.key) {
                heap.free_top(entry.key.len());
                trace!("reclaimed {} key bytes", entry.key.len());
            }
        }

        Some(entry.value)
    }

    /// Returns the first entry satisfying `pred`, scanning cells from last to
    /// first and each chain from head to tail.
    pub fn find<F>(&self, mut pred: F) -> Option<(&[u8], &V)>
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        self.cells.iter().rev().find_map(|&head| {
            self.chain(head).find_map(|index| {
                let (key, value) = self.pair(index);
                pred(key, value).then_some((key, value))
            })
        })
    }

    /// Removes every entry and empties the key heap.
    pub fn clear(&mut self) {
        self.cells.fill(None);
        self.entries.clear();
        self.vacant.clear();
        self.len = 0;

        if let Some(heap) = &mut self.heap {
            heap.empty();
        }
    }

    /// Iterates entries cell by cell.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> + '_ {
        self.cells
            .iter()
            .flat_map(move |&head| self.chain(head).map(move |index| self.pair(index)))
    }

    fn cell_of(&self, hash: u64) -> usize {
        (hash % self.cells.len() as u64) as usize
    }

    fn search(&self, hash: u64, key: &[u8]) -> Option<usize> {
        self.chain(self.cells[self.cell_of(hash)]).find(|&index| {
            let entry = self.entry(index);
            entry.hash == hash && self.key_bytes(entry) == key
        })
    }

    fn chain(&self, head: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(head, move |&index| self.entry(index).next)
    }

    fn pair(&self, index: usize) -> (&[u8], &V) {
        let entry = self.entry(index);
        (self.key_bytes(entry), &entry.value)
    }

    fn key_bytes(&self, entry: &Entry<V>) -> &[u8] {
        match &self.heap {
            Some(heap) => heap.bytes(&entry.key),
            None => &[],
        }
    }

    fn entry(&self, index: usize) -> &Entry<V> {
        self.entries[index]
            .as_ref()
            .unwrap_or_else(|| panic!("hash chain points at vacant entry {index}"))
    }

    fn entry_mut(&mut self, index: usize) -> &mut Entry<V> {
        self.entries[index]
            .as_mut()
            .unwrap_or_else(|| panic!("hash chain points at vacant entry {index}"))
    }
}

impl<V: fmt::Debug, S: BuildHasher> fmt::Debug for HashTable<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(key, value)| (String::from_utf8_lossy(key), value)))
            .finish()
    }
}
