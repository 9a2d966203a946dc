//! A small word-sized stack machine.
//!
//! The operand stack is a [`Stack`] of 8-byte words and every call frame is
//! one allocation on a separate frame [`Heap`], so entering and leaving
//! frames is a heap `alloc` / `free_top` pair.
//!
//! Programs are byte strings: a one-byte opcode followed by the operand, if
//! any. `Push` carries an 8-byte big-endian immediate; `Load`, `Store` and
//! `Enter` carry a one-byte operand.
//!
//! ```
//! use blockheap::vm::{Machine, Op, assemble};
//!
//! let code = assemble(&[
//!     Op::Enter(1),
//!     Op::Push(6),
//!     Op::Store(0),
//!     Op::Load(0),
//!     Op::Push(7),
//!     Op::Mul,
//!     Op::Leave,
//!     Op::Halt,
//! ]);
//!
//! let mut machine = Machine::new().unwrap();
//! assert_eq!(machine.run(&code).unwrap(), Some(42));
//! ```

use blockheap_log::trace;
use blockheap_mem::{Allocation, Heap};

use crate::error::{Error, Result};
use crate::stack::Stack;

const WORD: usize = std::mem::size_of::<i64>();

/// One instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nop,
    /// Push an immediate.
    Push(i64),
    Pop,
    Dup,
    /// Push local `n` of the current frame.
    Load(u8),
    /// Pop into local `n` of the current frame.
    Store(u8),
    Add,
    Sub,
    Mul,
    /// Open a frame of `n` zeroed locals.
    Enter(u8),
    /// Close the current frame.
    Leave,
    /// Stop and return the top of the stack.
    Halt,
}

impl Op {
    const fn opcode(self) -> u8 {
        match self {
            Op::Nop => 0x00,
            Op::Push(_) => 0x01,
            Op::Pop => 0x02,
            Op::Dup => 0x03,
            Op::Load(_) => 0x04,
            Op::Store(_) => 0x05,
            Op::Add => 0x06,
            Op::Sub => 0x07,
            Op::Mul => 0x08,
            Op::Enter(_) => 0x09,
            Op::Leave => 0x0a,
            Op::Halt => 0x0b,
        }
    }

    /// Encoded length in bytes.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Op::Push(_) => 1 + WORD,
            Op::Load(_) | Op::Store(_) | Op::Enter(_) => 2,
            _ => 1,
        }
    }

    /// Appends the encoding of `self` to `out`.
    pub fn encode(self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match self {
            Op::Push(value) => out.extend_from_slice(&value.to_be_bytes()),
            Op::Load(n) | Op::Store(n) | Op::Enter(n) => out.push(n),
            _ => {}
        }
    }

    /// Decodes the instruction at the front of `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOpcode`] for an invalid first byte and
    /// [`Error::Truncated`] if the operand is cut short.
    pub fn decode(code: &[u8]) -> Result<Op> {
        let (&opcode, operand) = code.split_first().ok_or(Error::Truncated)?;
        let byte = || operand.first().copied().ok_or(Error::Truncated);

        let op = match opcode {
            0x00 => Op::Nop,
            0x01 => {
                let imm: [u8; WORD] = operand
                    .get(..WORD)
                    .and_then(|bytes| bytes.try_into().ok())
                    .ok_or(Error::Truncated)?;
                Op::Push(i64::from_be_bytes(imm))
            }
            0x02 => Op::Pop,
            0x03 => Op::Dup,
            0x04 => Op::Load(byte()?),
            0x05 => Op::Store(byte()?),
            0x06 => Op::Add,
            0x07 => Op::Sub,
            0x08 => Op::Mul,
            0x09 => Op::Enter(byte()?),
            0x0a => Op::Leave,
            0x0b => Op::Halt,
            other => return Err(Error::UnknownOpcode(other)),
        };
        Ok(op)
    }
}

/// Packs a program into bytecode.
#[must_use]
pub fn assemble(ops: &[Op]) -> Vec<u8> {
    let mut code = Vec::with_capacity(ops.iter().map(|op| op.len()).sum());
    for op in ops {
        op.encode(&mut code);
    }
    code
}

/// The machine state: operand stack and frame stack.
#[derive(Debug)]
pub struct Machine {
    stack: Stack,
    frames: Heap,
    locals: Vec<Allocation>,
}

impl Machine {
    /// Creates a machine with empty stacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Heap`] if the backing heaps cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            stack: Stack::new(WORD)?,
            frames: Heap::new(0)?,
            locals: Vec::new(),
        })
    }

    /// Number of words on the operand stack.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of open frames.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.locals.len()
    }

    /// Drops every operand and frame.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.empty();
        self.locals.clear();
    }

    /// Executes `code` until `Halt` or the end of the program and returns
    /// the top of the operand stack.
    ///
    /// State carries over between runs; call [`Machine::reset`] to start
    /// from scratch.
    ///
    /// # Errors
    ///
    /// Returns the first decoding or execution error. The failing instruction
    /// has no effect: the machine keeps the operands and frames it had just
    /// before it.
    pub fn run(&mut self, code: &[u8]) -> Result<Option<i64>> {
        let mut ip = 0;

        while ip < code.len() {
            let op = Op::decode(&code[ip..])?;
            trace!("{:04x}: {:?}", ip, op);
            ip += op.len();

            if op == Op::Halt {
                break;
            }
            self.step(op)?;
        }

        Ok(self.peek())
    }

    fn step(&mut self, op: Op) -> Result<()> {
        match op {
            Op::Nop | Op::Halt => {}
            Op::Push(value) => self.push(value)?,
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let value = self.peek().ok_or(Error::StackUnderflow)?;
                self.push(value)?;
            }
            Op::Load(n) => {
                let slot = self.local(n)?;
                let value = i64::from_be_bytes(self.read_local(slot));
                self.push(value)?;
            }
            Op::Store(n) => {
                let slot = self.local(n)?;
                let value = self.pop()?;
                self.frames.bytes_mut(&slot).copy_from_slice(&value.to_be_bytes());
            }
            Op::Add => self.binary(i64::checked_add)?,
            Op::Sub => self.binary(i64::checked_sub)?,
            Op::Mul => self.binary(i64::checked_mul)?,
            Op::Enter(n) => {
                let frame = self.frames.zalloc(usize::from(n) * WORD)?;
                self.locals.push(frame);
            }
            Op::Leave => {
                let frame = self.locals.pop().ok_or(Error::NoFrame)?;
                self.frames.free_top(frame.len());
            }
        }
        Ok(())
    }

    fn binary(&mut self, f: fn(i64, i64) -> Option<i64>) -> Result<()> {
        if self.depth() < 2 {
            return Err(Error::StackUnderflow);
        }
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        match f(lhs, rhs) {
            Some(value) => self.push(value),
            None => {
                // Put the operands back so the failing instruction has no effect.
                self.push(lhs)?;
                self.push(rhs)?;
                Err(Error::Overflow)
            }
        }
    }

    fn push(&mut self, value: i64) -> Result<()> {
        self.stack.push(&value.to_be_bytes())
    }

    fn pop(&mut self) -> Result<i64> {
        match self.stack.pop_u64() {
            Ok(word) => Ok(word as i64),
            Err(Error::EmptyStack) => Err(Error::StackUnderflow),
            Err(err) => Err(err),
        }
    }

    fn peek(&self) -> Option<i64> {
        self.stack.top().map(|top| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(top);
            i64::from_be_bytes(word)
        })
    }

    /// Handle to the 8 bytes of local `n` in the current frame.
    fn local(&self, n: u8) -> Result<Allocation> {
        let frame = self.locals.last().ok_or(Error::NoFrame)?;
        let locals = frame.len() / WORD;
        if usize::from(n) >= locals {
            return Err(Error::BadVariable { index: n, locals });
        }
        Ok(slot_of(frame, n))
    }

    fn read_local(&self, slot: Allocation) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        word.copy_from_slice(self.frames.bytes(&slot));
        word
    }
}

fn slot_of(frame: &Allocation, n: u8) -> Allocation {
    frame.slice(usize::from(n) * WORD, WORD)
}
