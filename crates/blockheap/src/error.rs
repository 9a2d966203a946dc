//! Error types for the blockheap containers.
//!
//! Heap failures are wrapped in [`Error::Heap`]; the remaining variants are
//! recoverable misuse of a container or a malformed bytecode program.

use std::fmt;

use blockheap_mem::HeapError;

/// Errors that can occur in the blockheap containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The underlying heap could not provide memory.
    Heap(HeapError),

    /// Pop from an empty stack.
    EmptyStack,

    /// Element does not match the stack's element size.
    ElementSize {
        /// The stack's element size.
        expected: usize,
        /// Size of the element provided.
        got: usize,
    },

    /// Dynamic array request outside `1..=max` bytes.
    InvalidChunk {
        /// The requested size.
        size: usize,
        /// Largest size a single block can hold.
        max: usize,
    },

    /// Byte that does not encode an instruction.
    UnknownOpcode(u8),

    /// Instruction operand runs past the end of the program.
    Truncated,

    /// Instruction needs more operands than the stack holds.
    StackUnderflow,

    /// `Load`, `Store` or `Leave` without an active frame.
    NoFrame,

    /// Local variable index outside the current frame.
    BadVariable {
        /// The index used.
        index: u8,
        /// Number of locals in the current frame.
        locals: usize,
    },

    /// Arithmetic overflow.
    Overflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Heap(err) => write!(f, "Heap error: {err}"),
            Error::EmptyStack => write!(f, "Stack is empty"),
            Error::ElementSize { expected, got } => {
                write!(f, "Element size mismatch: expected {expected} bytes, got {got}")
            }
            Error::InvalidChunk { size, max } => {
                write!(f, "Invalid chunk size {size}: must be between 1 and {max} bytes")
            }
            Error::UnknownOpcode(byte) => write!(f, "Unknown opcode {byte:#04x}"),
            Error::Truncated => write!(f, "Truncated instruction"),
            Error::StackUnderflow => write!(f, "Operand stack underflow"),
            Error::NoFrame => write!(f, "No active frame"),
            Error::BadVariable { index, locals } => {
                write!(f, "Variable {index} out of range for a frame of {locals} locals")
            }
            Error::Overflow => write!(f, "Arithmetic overflow"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Heap(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HeapError> for Error {
    fn from(err: HeapError) -> Self {
        Error::Heap(err)
    }
}

/// Result type for blockheap container operations.
pub type Result<T> = std::result::Result<T, Error>;
