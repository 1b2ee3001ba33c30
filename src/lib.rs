//! # Introduction
//!
//! Wendy is the memory subsystem of the WendyScript virtual machine: a
//! fixed-size, cell-addressed value store with a free-list allocator, a
//! reachability collector, a frame-structured call stack, closures, and the
//! argument and memory-register stacks the interpreter uses to pass values
//! around.
//!
//! ## Layout
//!
//! ```text
//! trace source → vm::trace::Host → memory::Memory → snapshots → inspector TUI
//! ```
//!
//! 1. [`memory`]: cells, allocator, collector, call stack, closures and
//!    operand stacks, gathered in [`memory::Memory`].
//! 2. [`vm`]: errors, limits and settings, natives, error reports and the
//!    trace host that drives the memory operations line by line.
//! 3. [`snapshot`]: per-line copies of the memory state, bounded by a byte
//!    limit, plus the [`snapshot::Transcript`] of program output.
//! 4. [`ui`]: ratatui-based inspector; not part of the stable library API.
//!
//! ## Example
//!
//! ```
//! use wendy::memory::stack::Lookup;
//! use wendy::memory::value::Value;
//! use wendy::memory::Memory;
//!
//! let mut memory = Memory::default();
//! let addr = memory.push_value(Value::Number(10.0), 1).unwrap();
//! memory.declare("x", addr, 1).unwrap();
//! memory.push_function_frame("f", 0x20, 2).unwrap();
//!
//! let found = memory.resolve("x", Lookup::AllFrames, 3).unwrap();
//! assert_eq!(memory.read(found, 3).unwrap(), &Value::Number(10.0));
//! assert!(memory.resolve("x", Lookup::CurrentFrame, 3).is_err());
//! ```

pub mod memory;
pub mod snapshot;
pub mod ui;
pub mod vm;
