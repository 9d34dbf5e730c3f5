use thiserror::Error;

use crate::bytecode::ir::Address;
use crate::token::Location;

/// Errors raised while executing a resolved program.
///
/// A failing instruction leaves the stack and program counter untouched, so
/// the machine can still be inspected after any of these.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("stack underflow in {location} when executing '{instruction}'")]
    StackUnderflow {
        location: Location,
        instruction: String,
    },

    #[error("division by zero in {location}")]
    DivisionByZero { location: Location },

    #[error("invalid stack index {index} (stack size {size}) in {location}")]
    InvalidIndex {
        location: Location,
        index: i64,
        size: usize,
    },

    #[error("invalid input in {location}: {message}")]
    InvalidInput { location: Location, message: String },

    #[error("end of program reached (pc = {pc})")]
    EndOfProgram { pc: Address },

    #[error("program resolved at address {start} cannot be loaded at address {expected}")]
    AddressMismatch { start: Address, expected: Address },

    #[error("program of {len} instructions at address {start} overflows the address space")]
    AddressOverflow { start: Address, len: usize },

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Source location of the failing instruction, when there is one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            RuntimeError::StackUnderflow { location, .. }
            | RuntimeError::DivisionByZero { location }
            | RuntimeError::InvalidIndex { location, .. }
            | RuntimeError::InvalidInput { location, .. } => Some(location),
            RuntimeError::EndOfProgram { .. }
            | RuntimeError::AddressMismatch { .. }
            | RuntimeError::AddressOverflow { .. }
            | RuntimeError::StepLimitExceeded(_)
            | RuntimeError::Io(_) => None,
        }
    }
}
