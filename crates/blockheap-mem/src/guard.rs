//! No-man's-land bytes around allocations.
//!
//! With guards on, every allocation of `n` bytes occupies
//! `align_up(n + 2 * GUARD_SIZE, ALIGNMENT)` bytes laid out as
//!
//! ```text
//! | before: GUARD_SIZE x 0xCE | user: n bytes | after: 0xDF up to the end |
//! ```
//!
//! The after region swallows the alignment padding, so a write one byte past
//! the user region is always caught. Corruption is fatal: the offending byte
//! is logged and the heap panics.

use blockheap_log::error;

use crate::block::Block;

/// Bytes of no-man's-land on each side of an allocation.
pub const GUARD_SIZE: usize = 16;

/// Fill byte in front of every allocation.
pub const BEFORE_BYTE: u8 = 0xCE;

/// Fill byte behind every allocation, padding included.
pub const AFTER_BYTE: u8 = 0xDF;

/// Which side of an allocation a guard region sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSide {
    Before,
    After,
}

impl GuardSide {
    #[must_use]
    pub const fn fill_byte(self) -> u8 {
        match self {
            GuardSide::Before => BEFORE_BYTE,
            GuardSide::After => AFTER_BYTE,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            GuardSide::Before => "before",
            GuardSide::After => "after",
        }
    }
}

/// Writes both guard regions of the `space` bytes reserved at `at` for an
/// allocation of `len` user bytes.
pub(crate) fn fill(block: &mut Block, at: usize, len: usize, space: usize) {
    block.bytes_mut(at, GUARD_SIZE).fill(BEFORE_BYTE);
    let tail = at + GUARD_SIZE + len;
    block.bytes_mut(tail, at + space - tail).fill(AFTER_BYTE);
}

/// Checks the before guard of the allocation reserved at `at`.
pub(crate) fn check_before(block: &Block, at: usize) {
    check(block, at, GUARD_SIZE, GuardSide::Before);
}

/// Checks the full after region of an allocation whose size is known.
pub(crate) fn check_after(block: &Block, at: usize, len: usize, space: usize) {
    let tail = at + GUARD_SIZE + len;
    check(block, tail, at + space - tail, GuardSide::After);
}

/// Checks the last `GUARD_SIZE` bytes below `end`, the part of the after
/// region every allocation has regardless of its size.
pub(crate) fn check_trailing(block: &Block, end: usize) {
    check(block, end - GUARD_SIZE, GUARD_SIZE, GuardSide::After);
}

fn check(block: &Block, offset: usize, len: usize, side: GuardSide) {
    let expected = side.fill_byte();
    let region = block.bytes(offset, len);

    let Some(pos) = region.iter().position(|&byte| byte != expected) else {
        return;
    };

    let found = region[pos];
    error!(
        "no-man's-land {} allocation corrupted at block offset {}: expected {:#04x}, found {:#04x}",
        side.as_str(),
        offset + pos,
        expected,
        found
    );
    report_backtrace();

    panic!(
        "no-man's-land {} allocation corrupted at block offset {}: expected {:#04x}, found {:#04x}",
        side.as_str(),
        offset + pos,
        expected,
        found
    );
}

#[cfg(feature = "guard-backtrace")]
fn report_backtrace() {
    let trace = backtrace::Backtrace::new();
    error!("guard violation detected at:\n{:?}", trace);
}

#[cfg(not(feature = "guard-backtrace"))]
fn report_backtrace() {}
