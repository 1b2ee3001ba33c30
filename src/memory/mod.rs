//! Memory model for the WendyScript VM
//!
//! This module provides the core memory abstractions:
//! - [`value`]: Runtime value representation and the [`Address`] index type
//! - [`heap`]: Fixed-capacity address space with a bump region and free list
//! - [`gc`]: Non-moving reachability collector
//! - [`stack`]: Call stack with function and automatic frames
//! - [`closure`]: Table of captured frames
//! - [`operand`]: Bounded argument and memory-register stacks
//!
//! [`Memory`] owns one of each and is the context every operation goes
//! through. Each method takes the source line of the requesting instruction,
//! which ends up in any [`VmError`] it returns.
//!
//! # Collection roots
//!
//! - Every binding on the call stack
//! - Every binding stored in a closure
//! - Every value on the argument stack
//! - Every address on the memory-register stack
//!
//! Values that a caller is about to store are pinned for the duration of the
//! allocation that makes room for them.

pub mod closure;
pub mod gc;
pub mod heap;
pub mod operand;
pub mod stack;
pub mod value;

use crate::vm::errors::{Result, VmError};
use crate::vm::settings::Limits;
use closure::{ClosureIndex, ClosureTable};
use heap::{FreeBlock, Heap};
use operand::OperandStack;
use stack::{CallStack, Lookup, ReturnAddress};
use value::{Address, Value};

/// Register values reported in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointers {
    pub frame_pointer: usize,
    pub stack_pointer: usize,
    pub arg_pointer: usize,
    pub register_pointer: usize,
    pub memory_pointer: usize,
    pub closures: usize,
}

/// The VM memory context
#[derive(Debug, Clone)]
pub struct Memory {
    heap: Heap,
    stack: CallStack,
    closures: ClosureTable,
    args: OperandStack<Value>,
    registers: OperandStack<Address>,
    gc_enabled: bool,
}

impl Memory {
    pub fn new(limits: &Limits) -> Self {
        Memory {
            heap: Heap::new(limits.memory_size),
            stack: CallStack::new(limits.stack_size),
            closures: ClosureTable::new(),
            args: OperandStack::new(limits.arg_stack_size),
            registers: OperandStack::new(limits.reg_stack_size),
            gc_enabled: true,
        }
    }

    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.gc_enabled = enabled;
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn closures(&self) -> &ClosureTable {
        &self.closures
    }

    pub fn args(&self) -> &OperandStack<Value> {
        &self.args
    }

    pub fn registers(&self) -> &OperandStack<Address> {
        &self.registers
    }

    // --- allocation ---

    pub fn has_space(&self, size: usize) -> bool {
        self.heap.has_space(size)
    }

    /// Allocate `size` contiguous cells, collecting once if needed
    pub fn allocate(&mut self, size: usize, line: u32) -> Result<Address> {
        self.allocate_pinned(size, &[], line)
    }

    fn allocate_pinned(&mut self, size: usize, pinned: &[Value], line: u32) -> Result<Address> {
        if let Some(addr) = self.heap.try_allocate(size) {
            return Ok(addr);
        }
        if self.gc_enabled && self.collect_pinned(size, pinned, line)? {
            if let Some(addr) = self.heap.try_allocate(size) {
                return Ok(addr);
            }
        }
        log::warn!(
            "out of memory on line {}: {} cells requested, memory pointer at {}",
            line,
            size,
            self.heap.memory_pointer()
        );
        Err(VmError::OutOfMemory {
            requested: size,
            line,
        })
    }

    pub fn release(&mut self, addr: Address, size: usize, line: u32) -> Result<()> {
        self.heap.release(addr, size, line)
    }

    pub fn read(&self, addr: Address, line: u32) -> Result<&Value> {
        self.heap.read(addr, line)
    }

    pub fn write(&mut self, addr: Address, value: Value, line: u32) -> Result<()> {
        self.heap.write(addr, value, line)
    }

    /// Store one value in a fresh cell
    pub fn push_value(&mut self, value: Value, line: u32) -> Result<Address> {
        let addr = self.allocate_pinned(1, std::slice::from_ref(&value), line)?;
        self.heap.write(addr, value, line)?;
        Ok(addr)
    }

    /// Store values in consecutive fresh cells, returning the first address
    pub fn push_array(&mut self, values: Vec<Value>, line: u32) -> Result<Address> {
        let start = self.allocate_pinned(values.len(), &values, line)?;
        for (i, value) in values.into_iter().enumerate() {
            self.heap.write(start.offset(i), value, line)?;
        }
        Ok(start)
    }

    /// Build a list from the top `len` arguments (the deepest becomes element
    /// 0) and return the address of its header cell.
    ///
    /// The header address is held on the register stack while the elements
    /// are popped.
    pub fn push_list(&mut self, len: usize, line: u32) -> Result<Address> {
        if self.args.len() < len {
            return Err(VmError::ArgStackUnderflow { line });
        }
        let header = self.allocate(len + 1, line)?;
        self.heap.write(
            header,
            Value::ListHeader {
                len,
                start: header.offset(1),
            },
            line,
        )?;
        self.push_reg(header, line)?;
        for i in (0..len).rev() {
            let value = self.pop_arg(line)?;
            let dest = match self.registers.top() {
                Some(base) => base.offset(1 + i),
                None => return Err(VmError::invariant("memory register lost", line)),
            };
            self.heap.write(dest, value, line)?;
        }
        self.pop_reg(line)
    }

    // --- collection ---

    fn roots(&self, pinned: &[Value]) -> Vec<Address> {
        let mut roots: Vec<Address> = self
            .stack
            .bound_addresses()
            .chain(self.closures.bound_addresses())
            .chain(self.registers.iter().copied())
            .collect();
        for value in self.args.iter().chain(pinned) {
            match value {
                Value::Closure(index) => {
                    if let Some(closure) = self.closures.get(*index) {
                        roots.extend(closure.bound_addresses());
                    }
                }
                other => roots.extend(other.referenced_addresses()),
            }
        }
        roots
    }

    /// Reclaim every unreachable extent. Returns whether `min_size` cells can
    /// now be allocated.
    pub fn collect(&mut self, min_size: usize, line: u32) -> Result<bool> {
        self.collect_pinned(min_size, &[], line)
    }

    fn collect_pinned(&mut self, min_size: usize, pinned: &[Value], line: u32) -> Result<bool> {
        let roots = self.roots(pinned);
        let root_count = roots.len();
        let stats = gc::collect(&mut self.heap, &self.closures, roots);
        log::debug!(
            "gc on line {}: {} roots, kept {} extents, reclaimed {} extents ({} cells), {} free blocks",
            line,
            root_count,
            stats.kept_extents,
            stats.reclaimed_extents,
            stats.reclaimed_cells,
            self.heap.free_blocks().len()
        );
        self.debug_check(line)?;
        Ok(self.heap.has_space(min_size))
    }

    // --- frames ---

    pub fn push_function_frame(
        &mut self,
        name: &str,
        return_address: ReturnAddress,
        line: u32,
    ) -> Result<()> {
        self.stack.push_function_frame(name, return_address, line)
    }

    pub fn push_auto_frame(
        &mut self,
        return_address: ReturnAddress,
        block: &str,
        line: u32,
    ) -> Result<()> {
        self.stack.push_auto_frame(return_address, block, line)
    }

    pub fn pop_frame(&mut self, is_return: bool, line: u32) -> Result<(bool, ReturnAddress)> {
        let popped = self.stack.pop_frame(is_return, line)?;
        log::debug!(
            "popped {} frame on line {}, return to 0x{:X}",
            if popped.0 { "function" } else { "auto" },
            line,
            popped.1
        );
        self.debug_check(line)?;
        Ok(popped)
    }

    pub fn declare(&mut self, id: &str, addr: Address, line: u32) -> Result<()> {
        self.stack.declare(id, addr, line)
    }

    /// Store `value` in a fresh cell and point the nearest binding of `id` at
    /// it. Closures captured earlier keep the old cell and so the old value.
    pub fn assign(&mut self, id: &str, value: Value, line: u32) -> Result<Address> {
        self.stack.resolve(id, Lookup::AllFrames, line)?;
        let addr = self.push_value(value, line)?;
        self.stack.rebind(id, addr, Lookup::AllFrames, line)?;
        Ok(addr)
    }

    pub fn resolve(&self, id: &str, lookup: Lookup, line: u32) -> Result<Address> {
        self.stack.resolve(id, lookup, line)
    }

    pub fn exists(&self, id: &str, lookup: Lookup) -> bool {
        self.stack.exists(id, lookup)
    }

    /// Pop every frame above main
    pub fn unwind(&mut self) {
        self.stack.unwind();
    }

    // --- closures ---

    /// Capture the current frame's bindings
    pub fn capture(&mut self) -> ClosureIndex {
        let frame = self.stack.current_frame();
        debug_assert!(frame.iter().all(|entry| entry.address().is_some()));
        self.closures.capture(frame)
    }

    /// Copy a closure's bindings onto the stack. Call right after
    /// [`push_function_frame`](Self::push_function_frame), before binding
    /// parameters.
    pub fn invoke(&mut self, index: ClosureIndex, line: u32) -> Result<()> {
        let closure = self
            .closures
            .get(index)
            .ok_or(VmError::UnknownClosure { index, line })?;
        for entry in closure.entries() {
            let mut entry = entry.clone();
            entry.is_closure = true;
            self.stack.push(entry, line)?;
        }
        Ok(())
    }

    // --- operand stacks ---

    pub fn push_arg(&mut self, value: Value, line: u32) -> Result<()> {
        self.args.push(value).map_err(|_| VmError::ArgStackOverflow {
            capacity: self.args.capacity(),
            line,
        })
    }

    pub fn pop_arg(&mut self, line: u32) -> Result<Value> {
        self.args.pop().ok_or(VmError::ArgStackUnderflow { line })
    }

    pub fn top_arg(&self, line: u32) -> Result<&Value> {
        self.args.top().ok_or(VmError::ArgStackUnderflow { line })
    }

    pub fn clear_args(&mut self) {
        self.args.clear();
    }

    pub fn push_reg(&mut self, addr: Address, line: u32) -> Result<()> {
        self.registers
            .push(addr)
            .map_err(|_| VmError::invariant("memory register stack overflow", line))
    }

    pub fn pop_reg(&mut self, line: u32) -> Result<Address> {
        self.registers
            .pop()
            .ok_or_else(|| VmError::invariant("memory register stack underflow", line))
    }

    pub fn clear_registers(&mut self) {
        self.registers.clear();
    }

    /// Every instruction must leave the register stack empty
    pub fn check_registers_balanced(&self, line: u32) -> Result<()> {
        if self.registers.is_empty() {
            Ok(())
        } else {
            Err(VmError::invariant(
                format!("{} memory registers left on the stack", self.registers.len()),
                line,
            ))
        }
    }

    // --- diagnostics ---

    pub fn pointers(&self) -> Pointers {
        Pointers {
            frame_pointer: self.stack.frame_pointer(),
            stack_pointer: self.stack.stack_pointer(),
            arg_pointer: self.args.len(),
            register_pointer: self.registers.len(),
            memory_pointer: self.heap.memory_pointer(),
            closures: self.closures.len(),
        }
    }

    pub fn free_blocks(&self) -> &[FreeBlock] {
        self.heap.free_blocks()
    }

    /// One line per live call-stack entry, innermost first
    pub fn call_stack_dump(&self) -> Vec<String> {
        self.stack
            .entries()
            .iter()
            .enumerate()
            .rev()
            .map(|(pos, entry)| format!("[0x{:04X}] {}", pos, entry))
            .collect()
    }

    pub fn check_invariants(&self, line: u32) -> Result<()> {
        self.stack.check(line)?;
        if self.args.len() > self.args.capacity() {
            return Err(VmError::invariant("argument pointer past capacity", line));
        }
        if self.registers.len() > self.registers.capacity() {
            return Err(VmError::invariant("register pointer past capacity", line));
        }
        self.heap.check(line)
    }

    fn debug_check(&self, line: u32) -> Result<()> {
        if cfg!(debug_assertions) {
            self.check_invariants(line)?;
        }
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(&Limits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Memory {
        Memory::new(&Limits {
            memory_size: 16,
            stack_size: 32,
            arg_stack_size: 8,
            reg_stack_size: 4,
        })
    }

    #[test]
    fn test_allocation_collects_before_failing() {
        let mut memory = small();
        let kept = memory.push_value(Value::Number(1.0), 1).unwrap();
        memory.declare("kept", kept, 1).unwrap();
        memory.allocate(10, 2).unwrap(); // unreferenced

        // 15 usable cells: 1 kept + 10 garbage leaves 4, so 8 needs a collection
        let addr = memory.allocate(8, 3).unwrap();
        assert_ne!(addr, kept);
        assert_eq!(memory.read(kept, 3).unwrap(), &Value::Number(1.0));
    }

    #[test]
    fn test_out_of_memory_after_collection() {
        let mut memory = small();
        let addr = memory.allocate(12, 1).unwrap();
        memory.declare("big", addr, 1).unwrap();
        assert!(matches!(
            memory.allocate(8, 2),
            Err(VmError::OutOfMemory { requested: 8, line: 2 })
        ));
    }

    #[test]
    fn test_disabled_collector_fails_fast() {
        let mut memory = small();
        memory.set_gc_enabled(false);
        memory.allocate(12, 1).unwrap();
        assert!(memory.allocate(8, 2).is_err());
        memory.set_gc_enabled(true);
        assert!(memory.allocate(8, 3).is_ok());
    }

    #[test]
    fn test_push_value_pins_referenced_cell() {
        let mut memory = small();
        let target = memory.push_value(Value::String("hi".into()), 1).unwrap();
        memory.allocate(14, 1).unwrap(); // fills the address space
        // The reference is only held by the caller while the allocation runs
        let holder = memory.push_value(Value::Reference(target), 2).unwrap();
        memory.declare("holder", holder, 2).unwrap();
        assert_eq!(memory.read(target, 3).unwrap(), &Value::String("hi".into()));
    }

    #[test]
    fn test_push_list_from_args() {
        let mut memory = small();
        for n in [1.0, 2.0, 3.0] {
            memory.push_arg(Value::Number(n), 1).unwrap();
        }
        let header = memory.push_list(3, 1).unwrap();
        assert_eq!(
            memory.read(header, 1).unwrap(),
            &Value::ListHeader {
                len: 3,
                start: header.offset(1)
            }
        );
        assert_eq!(memory.read(header.offset(1), 1).unwrap(), &Value::Number(1.0));
        assert_eq!(memory.read(header.offset(3), 1).unwrap(), &Value::Number(3.0));
        assert!(memory.args().is_empty());
        memory.check_registers_balanced(1).unwrap();
    }

    #[test]
    fn test_register_stack_imbalance_is_internal() {
        let mut memory = small();
        memory.push_reg(Address::new(3), 1).unwrap();
        assert!(matches!(
            memory.check_registers_balanced(2),
            Err(VmError::InternalInvariantViolation { line: 2, .. })
        ));
        memory.pop_reg(2).unwrap();
        assert!(memory.pop_reg(3).unwrap_err().is_fatal());
    }

    #[test]
    fn test_arg_stack_bounds() {
        let mut memory = small();
        assert!(matches!(
            memory.top_arg(4),
            Err(VmError::ArgStackUnderflow { line: 4 })
        ));
        for _ in 0..8 {
            memory.push_arg(Value::None, 1).unwrap();
        }
        assert!(matches!(
            memory.push_arg(Value::None, 5),
            Err(VmError::ArgStackOverflow { capacity: 8, line: 5 })
        ));
        memory.clear_args();
        assert_eq!(memory.pointers().arg_pointer, 0);
    }

    #[test]
    fn test_closure_keeps_value_from_before_assignment() {
        let mut memory = small();
        memory.push_function_frame("outer", 1, 1).unwrap();
        let a = memory.push_value(Value::Number(1.0), 1).unwrap();
        memory.declare("a", a, 1).unwrap();
        let closure = memory.capture();

        memory.assign("a", Value::Number(2.0), 3).unwrap();
        let live = memory.resolve("a", Lookup::CurrentFrame, 4).unwrap();
        assert_eq!(memory.read(live, 4).unwrap(), &Value::Number(2.0));

        memory.pop_frame(true, 5).unwrap();
        memory.push_function_frame("inner", 2, 6).unwrap();
        memory.invoke(closure, 6).unwrap();
        let seen = memory.resolve("a", Lookup::CurrentFrame, 7).unwrap();
        assert_eq!(memory.read(seen, 7).unwrap(), &Value::Number(1.0));
        assert!(memory.stack().current_frame()[0].is_closure);
    }

    #[test]
    fn test_assign_to_undefined_allocates_nothing() {
        let mut memory = small();
        assert!(matches!(
            memory.assign("ghost", Value::Number(1.0), 2),
            Err(VmError::UndefinedIdentifier { line: 2, .. })
        ));
        assert_eq!(memory.pointers().memory_pointer, 1);
    }

    #[test]
    fn test_invoke_unknown_closure() {
        let mut memory = small();
        assert!(matches!(
            memory.invoke(ClosureIndex::new(3), 7),
            Err(VmError::UnknownClosure { line: 7, .. })
        ));
    }

    #[test]
    fn test_call_stack_dump_is_innermost_first() {
        let mut memory = small();
        memory.declare("x", Address::new(1), 1).unwrap();
        memory.push_function_frame("f", 0x20, 2).unwrap();
        memory.declare("y", Address::new(2), 2).unwrap();

        let dump = memory.call_stack_dump();
        assert_eq!(dump.len(), 4);
        assert!(dump[0].contains("y -> 0x0002"));
        assert!(dump[1].contains("<fn f>"));
        assert!(dump[3].contains("<fn main>"));
    }

    #[test]
    fn test_collect_after_releasing_tail_of_bound_block() {
        let mut memory = small();
        let xs = memory.allocate(3, 1).unwrap();
        memory.write(xs, Value::Number(1.0), 1).unwrap();
        memory.write(xs.offset(1), Value::Number(2.0), 1).unwrap();
        memory.declare("xs", xs, 1).unwrap();

        memory.release(xs.offset(2), 1, 2).unwrap();
        memory.collect(0, 3).unwrap();
        memory.check_invariants(3).unwrap();
        assert_eq!(memory.read(xs, 3).unwrap(), &Value::Number(1.0));
        assert_eq!(memory.read(xs.offset(1), 3).unwrap(), &Value::Number(2.0));
        assert_eq!(memory.pointers().memory_pointer, xs.index() + 2);
    }

    #[test]
    fn test_reusing_released_middle_cell_keeps_neighbours() {
        let mut memory = small();
        let values = [10.0, 20.0, 30.0, 40.0].map(Value::Number).to_vec();
        let xs = memory.push_array(values, 1).unwrap();
        memory.declare("xs", xs, 1).unwrap();

        memory.release(xs.offset(1), 1, 2).unwrap();
        let stray = memory.push_value(Value::Number(99.0), 3).unwrap();
        assert_eq!(stray, xs.offset(1));
        memory.check_invariants(3).unwrap();

        memory.collect(0, 4).unwrap();
        memory.check_invariants(4).unwrap();
        assert_eq!(memory.read(xs, 4).unwrap(), &Value::Number(10.0));
        assert_eq!(memory.read(xs.offset(2), 4).unwrap(), &Value::Number(30.0));
        assert_eq!(memory.read(xs.offset(3), 4).unwrap(), &Value::Number(40.0));
        assert_eq!(
            memory.free_blocks(),
            &[FreeBlock {
                start: stray,
                size: 1
            }]
        );
    }
}
