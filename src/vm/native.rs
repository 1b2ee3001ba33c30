//! Native function calling contract
//!
//! A native declares how many arguments it takes. The caller pushes them in
//! order; [`NativeRegistry::call`] pops them (so argument 0 is the deepest),
//! runs the function and pushes exactly one result, leaving the argument
//! stack balanced.

use super::errors::{Result, VmError};
use super::report;
use crate::memory::value::{Address, Value};
use crate::memory::Memory;
use crate::snapshot::Transcript;
use rustc_hash::FxHashMap;

pub type NativeFn = fn(&Memory, &mut Transcript, &[Value], u32) -> Result<Value>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub argc: usize,
    pub function: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.argc)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    functions: FxHashMap<&'static str, NativeFunction>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the diagnostic natives
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NativeFunction {
            name: "printCallStack",
            argc: 1,
            function: native_print_call_stack,
        });
        registry.register(NativeFunction {
            name: "reverseString",
            argc: 1,
            function: native_reverse_string,
        });
        registry.register(NativeFunction {
            name: "examineMemory",
            argc: 2,
            function: native_examine_memory,
        });
        registry
    }

    pub fn register(&mut self, function: NativeFunction) {
        self.functions.insert(function.name, function);
    }

    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    /// Pop the native's arguments, call it and push its result
    pub fn call(
        &self,
        memory: &mut Memory,
        output: &mut Transcript,
        name: &str,
        line: u32,
    ) -> Result<()> {
        let native = self.get(name).ok_or_else(|| VmError::InvalidNativeCall {
            name: name.to_string(),
            line,
        })?;
        if memory.args().len() < native.argc {
            return Err(VmError::ArgStackUnderflow { line });
        }

        let mut args = Vec::with_capacity(native.argc);
        for _ in 0..native.argc {
            args.push(memory.pop_arg(line)?);
        }
        args.reverse();

        let result = (native.function)(memory, output, &args, line)?;
        memory.push_arg(result, line)
    }
}

fn expect_number(value: &Value, line: u32) -> Result<f64> {
    value.as_number().ok_or(VmError::TypeMismatch {
        expected: "number",
        got: value.type_name(),
        line,
    })
}

fn native_print_call_stack(
    memory: &Memory,
    output: &mut Transcript,
    args: &[Value],
    line: u32,
) -> Result<Value> {
    let count = expect_number(&args[0], line)?.max(0.0) as usize;
    for text in report::call_stack_lines(memory, count) {
        output.print(text, line);
    }
    Ok(Value::None)
}

fn native_reverse_string(
    _memory: &Memory,
    _output: &mut Transcript,
    args: &[Value],
    line: u32,
) -> Result<Value> {
    let text = args[0].as_str().ok_or(VmError::TypeMismatch {
        expected: "string",
        got: args[0].type_name(),
        line,
    })?;
    Ok(Value::String(text.chars().rev().collect()))
}

fn native_examine_memory(
    memory: &Memory,
    output: &mut Transcript,
    args: &[Value],
    line: u32,
) -> Result<Value> {
    let from = expect_number(&args[0], line)?.max(0.0) as u32;
    let to = expect_number(&args[1], line)?.max(0.0) as u32;
    output.print("Memory Contents:", line);
    for raw in from..to {
        let addr = Address::new(raw);
        let value = memory.read(addr, line)?;
        output.print(format!("[{}] [{}] {}", addr, value.type_name(), value), line);
    }
    Ok(Value::None)
}
