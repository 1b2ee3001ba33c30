//! Host configuration
//!
//! [`Settings`] gathers the VM-wide switches together with the [`Limits`]
//! used to size a [`Memory`](crate::memory::Memory).

use super::constants::{ARGSTACK_SIZE, MEMORY_SIZE, MEMREGSTACK_SIZE, STACK_SIZE};

/// Capacities of the VM's storage regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub memory_size: usize,
    pub stack_size: usize,
    pub arg_stack_size: usize,
    pub reg_stack_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            memory_size: MEMORY_SIZE,
            stack_size: STACK_SIZE,
            arg_stack_size: ARGSTACK_SIZE,
            reg_stack_size: MEMREGSTACK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Dump limits, pointers and free blocks with every error
    pub verbose: bool,
    /// Stop at the first error instead of recovering
    pub strict: bool,
    /// Interactive host; call stacks are only printed when verbose
    pub repl: bool,
    /// Collect when an allocation cannot be satisfied
    pub gc_enabled: bool,
    pub limits: Limits,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            verbose: false,
            strict: false,
            repl: false,
            gc_enabled: true,
            limits: Limits::default(),
        }
    }
}
