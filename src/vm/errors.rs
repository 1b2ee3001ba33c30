//! Runtime error types for the WendyScript VM
//!
//! This module defines [`VmError`], which represents every error the memory
//! subsystem and its host can report. Each variant carries the source line of
//! the instruction that requested the operation so the reporter can show the
//! surrounding source.
//!
//! [`VmError::is_fatal`] separates resource exhaustion and broken invariants,
//! which always end the run, from user-script errors a REPL may recover from.

use crate::memory::closure::ClosureIndex;
use crate::memory::value::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VmError>;

/// Errors raised by memory, frame and operand-stack operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("Address {address} is out of range (capacity {capacity})")]
    AddressOutOfRange {
        address: Address,
        capacity: usize,
        line: u32,
    },

    #[error("Out of memory: requested {requested} cells, no block large enough after collection")]
    OutOfMemory { requested: usize, line: u32 },

    #[error("Stack overflow: call stack capacity of {capacity} entries exceeded")]
    StackOverflow { capacity: usize, line: u32 },

    #[error("Stack underflow: cannot pop the main frame")]
    StackUnderflow { line: u32 },

    #[error("Identifier '{name}' is not defined")]
    UndefinedIdentifier { name: String, line: u32 },

    #[error("Argument stack underflow")]
    ArgStackUnderflow { line: u32 },

    #[error("Argument stack overflow: capacity of {capacity} values exceeded")]
    ArgStackOverflow { capacity: usize, line: u32 },

    #[error("Closure {index} does not exist")]
    UnknownClosure { index: ClosureIndex, line: u32 },

    #[error("Internal error: {message}")]
    InternalInvariantViolation { message: String, line: u32 },

    #[error("Native function '{name}' does not exist")]
    InvalidNativeCall { name: String, line: u32 },

    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
        line: u32,
    },

    #[error("Syntax error: {message}")]
    Syntax { message: String, line: u32 },
}

impl VmError {
    /// Source line of the instruction that raised the error
    pub fn line(&self) -> u32 {
        match self {
            VmError::AddressOutOfRange { line, .. }
            | VmError::OutOfMemory { line, .. }
            | VmError::StackOverflow { line, .. }
            | VmError::StackUnderflow { line }
            | VmError::UndefinedIdentifier { line, .. }
            | VmError::ArgStackUnderflow { line }
            | VmError::ArgStackOverflow { line, .. }
            | VmError::UnknownClosure { line, .. }
            | VmError::InternalInvariantViolation { line, .. }
            | VmError::InvalidNativeCall { line, .. }
            | VmError::TypeMismatch { line, .. }
            | VmError::Syntax { line, .. } => *line,
        }
    }

    /// Fatal errors cannot be continued from, even in a REPL
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::StackOverflow { .. }
                | VmError::OutOfMemory { .. }
                | VmError::InternalInvariantViolation { .. }
        )
    }

    pub(crate) fn invariant(message: impl Into<String>, line: u32) -> Self {
        VmError::InternalInvariantViolation {
            message: message.into(),
            line,
        }
    }
}
