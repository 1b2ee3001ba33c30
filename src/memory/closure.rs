//! Closure table
//!
//! A closure is a copy of one frame's bindings taken at creation time. The
//! table only grows: entries are never mutated or removed, so a
//! [`ClosureIndex`] stays valid for the lifetime of the VM.

use super::stack::StackEntry;
use super::value::Address;
use std::fmt;

/// Index of a closure in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureIndex(u32);

impl ClosureIndex {
    pub const fn new(index: u32) -> Self {
        ClosureIndex(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClosureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Captured frame entries
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    entries: Vec<StackEntry>,
}

impl Closure {
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bound_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.iter().filter_map(StackEntry::address)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClosureTable {
    closures: Vec<Closure>,
}

impl ClosureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `frame` and return its index
    pub fn capture(&mut self, frame: &[StackEntry]) -> ClosureIndex {
        let index = ClosureIndex(self.closures.len() as u32);
        self.closures.push(Closure {
            entries: frame.to_vec(),
        });
        index
    }

    pub fn get(&self, index: ClosureIndex) -> Option<&Closure> {
        self.closures.get(index.index())
    }

    pub fn len(&self) -> usize {
        self.closures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Closure> {
        self.closures.iter()
    }

    /// Addresses bound by every stored closure
    pub fn bound_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.closures.iter().flat_map(Closure::bound_addresses)
    }
}
