//! Runtime value representation
//!
//! This module defines the [`Value`] enum, the single storable unit of the VM's
//! address space, and the [`Address`] index type used to name a cell.
//!
//! # Value Types
//!
//! - [`Value::None`]: The empty value (address 0 always holds it)
//! - [`Value::Number`]: 64-bit float
//! - [`Value::String`]: Owned text
//! - [`Value::Reference`]: Address of another cell
//! - [`Value::ListHeader`]: Length and element address of a list payload
//! - [`Value::Closure`]: Index into the closure table
//!
//! Values own their payloads and are cloned whenever they move between the
//! address space, the argument stack and the host.

use super::closure::ClosureIndex;
use std::fmt;

/// Runtime values stored in memory cells
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Number(f64),
    String(String),
    Reference(Address),
    ListHeader { len: usize, start: Address },
    Closure(ClosureIndex),
}

/// Index of a cell in the address space. Never a native pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u32);

impl Address {
    /// Address 0, permanently holding [`Value::None`]
    pub const NONE: Address = Address(0);

    pub const fn new(index: u32) -> Self {
        Address(index)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Address)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Address `n` cells further on, saturating at `u32::MAX`
    pub fn offset(self, n: usize) -> Address {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        Address(self.0.saturating_add(n))
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl Value {
    /// Short tag name used in diagnostics and type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Reference(_) => "reference",
            Value::ListHeader { .. } => "list",
            Value::Closure(_) => "closure",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Address> {
        match self {
            Value::Reference(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<ClosureIndex> {
        match self {
            Value::Closure(index) => Some(*index),
            _ => None,
        }
    }

    /// Addresses this value points at directly, as seen by the collector.
    ///
    /// Closure references are not expanded here; the collector resolves them
    /// through the closure table.
    pub fn referenced_addresses(&self) -> impl Iterator<Item = Address> {
        let (start, len) = match self {
            Value::Reference(addr) => (*addr, 1),
            Value::ListHeader { len, start } => (*start, *len),
            Value::None | Value::Number(_) | Value::String(_) | Value::Closure(_) => {
                (Address::NONE, 0)
            }
        };
        (0..len).map(move |i| start.offset(i))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "<none>"),
            // Integral numbers print without a fraction
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Reference(addr) => write!(f, "<ref {}>", addr),
            Value::ListHeader { len, start } => write!(f, "<list {} @ {}>", len, start),
            Value::Closure(index) => write!(f, "<closure {}>", index),
        }
    }
}
