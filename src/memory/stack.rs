//! Call stack implementation
//!
//! This module provides the frame-structured call stack:
//! - [`CallStack`]: A flat vector of entries plus frame and stack pointers
//! - [`StackEntry`]: One entry, either a variable binding or a frame sentinel
//! - [`FrameKind`]: Function frames (callable context) or automatic frames
//!   (block scoping for loops and bracketed blocks)
//!
//! # Layout
//!
//! ```text
//! [main] [x] [y] | [<fn f>] [a] | [<auto while>] [i]
//!  ^0             ^ saved fp      ^ sentinel      ^ frame_pointer
//! ```
//!
//! Each frame starts with a sentinel that remembers the enclosing frame
//! pointer. `frame_pointer` is the index just above the current sentinel, so
//! `[frame_pointer, stack_pointer)` holds the current frame's bindings. The
//! main sentinel at index 0 is never popped.

use super::value::Address;
use crate::vm::constants::{MAIN_FRAME, MAX_IDENTIFIER_LEN};
use crate::vm::errors::{Result, VmError};
use std::fmt;

/// Bytecode address a frame returns to
pub type ReturnAddress = u32;

/// Variable name, truncated to [`MAX_IDENTIFIER_LEN`] bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(MAX_IDENTIFIER_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Identifier(name[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of frame a sentinel opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function { return_address: ReturnAddress },
    Auto { return_address: ReturnAddress },
}

impl FrameKind {
    pub fn return_address(self) -> ReturnAddress {
        match self {
            FrameKind::Function { return_address } | FrameKind::Auto { return_address } => {
                return_address
            }
        }
    }

    pub fn is_function(self) -> bool {
        matches!(self, FrameKind::Function { .. })
    }
}

/// What a stack entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Variable bound to a memory cell
    Binding(Address),
    /// Frame sentinel; `saved_fp` is the enclosing frame pointer
    Frame { kind: FrameKind, saved_fp: usize },
}

/// One call-stack entry
#[derive(Debug, Clone, PartialEq)]
pub struct StackEntry {
    pub id: Identifier,
    pub kind: EntryKind,
    /// Set on entries copied in from a closure
    pub is_closure: bool,
}

impl StackEntry {
    pub fn binding(id: Identifier, addr: Address) -> Self {
        StackEntry {
            id,
            kind: EntryKind::Binding(addr),
            is_closure: false,
        }
    }

    pub fn address(&self) -> Option<Address> {
        match self.kind {
            EntryKind::Binding(addr) => Some(addr),
            EntryKind::Frame { .. } => None,
        }
    }

    pub fn frame_kind(&self) -> Option<FrameKind> {
        match self.kind {
            EntryKind::Frame { kind, .. } => Some(kind),
            EntryKind::Binding(_) => None,
        }
    }
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::Binding(addr) => {
                write!(f, "{} -> {}", self.id, addr)?;
                if self.is_closure {
                    write!(f, " (closure)")?;
                }
                Ok(())
            }
            EntryKind::Frame {
                kind: FrameKind::Function { return_address },
                ..
            } => write!(f, "<fn {}> ret 0x{:X}", self.id, return_address),
            EntryKind::Frame {
                kind: FrameKind::Auto { return_address },
                ..
            } => write!(f, "<auto {}> ret 0x{:X}", self.id, return_address),
        }
    }
}

/// Scope searched by [`CallStack::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Stop at the frame pointer
    CurrentFrame,
    /// Continue through every enclosing frame down to main
    AllFrames,
}

/// The call stack
#[derive(Debug, Clone)]
pub struct CallStack {
    entries: Vec<StackEntry>,
    frame_pointer: usize,
    capacity: usize,
}

impl CallStack {
    /// Create a call stack holding only the main frame
    pub fn new(capacity: usize) -> Self {
        let main = StackEntry {
            id: Identifier::new(MAIN_FRAME),
            kind: EntryKind::Frame {
                kind: FrameKind::Function { return_address: 0 },
                saved_fp: 0,
            },
            is_closure: false,
        };
        CallStack {
            entries: vec![main],
            frame_pointer: 1,
            capacity: capacity.max(1),
        }
    }

    pub fn frame_pointer(&self) -> usize {
        self.frame_pointer
    }

    pub fn stack_pointer(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Bindings of the innermost frame
    pub fn current_frame(&self) -> &[StackEntry] {
        &self.entries[self.frame_pointer..]
    }

    /// Number of frames including main
    pub fn depth(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.kind, EntryKind::Frame { .. }))
            .count()
    }

    /// Addresses bound anywhere on the stack
    pub fn bound_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.iter().filter_map(StackEntry::address)
    }

    /// Append an entry, failing when the stack is full
    pub fn push(&mut self, entry: StackEntry, line: u32) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(VmError::StackOverflow {
                capacity: self.capacity,
                line,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    fn push_sentinel(&mut self, id: Identifier, kind: FrameKind, line: u32) -> Result<()> {
        self.push(
            StackEntry {
                id,
                kind: EntryKind::Frame {
                    kind,
                    saved_fp: self.frame_pointer,
                },
                is_closure: false,
            },
            line,
        )?;
        self.frame_pointer = self.entries.len();
        Ok(())
    }

    /// Open a function frame
    pub fn push_function_frame(
        &mut self,
        name: &str,
        return_address: ReturnAddress,
        line: u32,
    ) -> Result<()> {
        self.push_sentinel(
            Identifier::new(name),
            FrameKind::Function { return_address },
            line,
        )
    }

    /// Open an automatic frame for block scoping; `block` names the block kind
    pub fn push_auto_frame(
        &mut self,
        return_address: ReturnAddress,
        block: &str,
        line: u32,
    ) -> Result<()> {
        self.push_sentinel(Identifier::new(block), FrameKind::Auto { return_address }, line)
    }

    fn pop_one(&mut self, line: u32) -> Result<FrameKind> {
        let sentinel = self.frame_pointer - 1;
        if sentinel == 0 {
            return Err(VmError::StackUnderflow { line });
        }
        match self.entries[sentinel].kind {
            EntryKind::Frame { kind, saved_fp } => {
                self.entries.truncate(sentinel);
                self.frame_pointer = saved_fp;
                Ok(kind)
            }
            EntryKind::Binding(_) => Err(VmError::invariant(
                format!("entry {} below the frame pointer is not a frame", sentinel),
                line,
            )),
        }
    }

    /// Index of the innermost function sentinel above main, walking the
    /// saved frame pointers
    fn innermost_function_sentinel(&self) -> Option<usize> {
        let mut sentinel = self.frame_pointer - 1;
        while sentinel > 0 {
            match self.entries[sentinel].kind {
                EntryKind::Frame {
                    kind: FrameKind::Function { .. },
                    ..
                } => return Some(sentinel),
                EntryKind::Frame { saved_fp, .. } => sentinel = saved_fp - 1,
                EntryKind::Binding(_) => return None,
            }
        }
        None
    }

    /// Pop the innermost frame, or with `is_return` every automatic frame up
    /// to and including the innermost function frame.
    ///
    /// Returns whether the last popped frame was a function frame, and its
    /// return address.
    pub fn pop_frame(&mut self, is_return: bool, line: u32) -> Result<(bool, ReturnAddress)> {
        if !is_return {
            let kind = self.pop_one(line)?;
            return Ok((kind.is_function(), kind.return_address()));
        }

        // Check first so a failed return leaves the stack untouched
        if self.innermost_function_sentinel().is_none() {
            return Err(VmError::StackUnderflow { line });
        }
        loop {
            let kind = self.pop_one(line)?;
            if kind.is_function() {
                return Ok((true, kind.return_address()));
            }
        }
    }

    /// Declare a binding in the current frame. Redeclaration shadows.
    pub fn declare(&mut self, id: &str, addr: Address, line: u32) -> Result<()> {
        self.push(StackEntry::binding(Identifier::new(id), addr), line)
    }

    /// Position of the nearest binding named `id`
    fn position(&self, id: &str, lookup: Lookup) -> Option<usize> {
        let id = Identifier::new(id);
        let floor = match lookup {
            Lookup::CurrentFrame => self.frame_pointer,
            Lookup::AllFrames => 0,
        };
        (floor..self.entries.len())
            .rev()
            .find(|&pos| self.entries[pos].id == id && self.entries[pos].address().is_some())
    }

    fn find(&self, id: &str, lookup: Lookup) -> Option<Address> {
        self.position(id, lookup)
            .and_then(|pos| self.entries[pos].address())
    }

    /// Point the nearest binding of `id` at another cell. Closures hold their
    /// own copies of entries, so they keep seeing the old cell.
    pub fn rebind(&mut self, id: &str, addr: Address, lookup: Lookup, line: u32) -> Result<()> {
        let pos = self
            .position(id, lookup)
            .ok_or_else(|| VmError::UndefinedIdentifier {
                name: id.to_string(),
                line,
            })?;
        self.entries[pos].kind = EntryKind::Binding(addr);
        Ok(())
    }

    /// Resolve an identifier to its cell, nearest declaration first
    pub fn resolve(&self, id: &str, lookup: Lookup, line: u32) -> Result<Address> {
        self.find(id, lookup)
            .ok_or_else(|| VmError::UndefinedIdentifier {
                name: id.to_string(),
                line,
            })
    }

    pub fn exists(&self, id: &str, lookup: Lookup) -> bool {
        self.find(id, lookup).is_some()
    }

    /// Pop every frame above main
    pub fn unwind(&mut self) {
        self.entries.truncate(1);
        self.frame_pointer = 1;
    }

    pub fn check(&self, line: u32) -> Result<()> {
        let sp = self.entries.len();
        if self.frame_pointer == 0 || self.frame_pointer > sp || sp > self.capacity {
            return Err(VmError::invariant(
                format!(
                    "frame pointer {} / stack pointer {} / capacity {} out of order",
                    self.frame_pointer, sp, self.capacity
                ),
                line,
            ));
        }
        if self.entries[self.frame_pointer - 1].frame_kind().is_none() {
            return Err(VmError::invariant("frame pointer is not above a sentinel", line));
        }
        if self.entries[0].frame_kind().is_none() {
            return Err(VmError::invariant("main frame sentinel is missing", line));
        }
        Ok(())
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new(crate::vm::constants::STACK_SIZE)
    }
}
