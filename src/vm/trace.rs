//! Memory trace host
//!
//! A line-oriented command language driving every memory operation, used by
//! the `wendy` binary, its REPL and the integration tests. One command per
//! line; `#` starts a comment.
//!
//! ```text
//! push 10          # operand stack
//! let x            # pop into a fresh cell bound to x
//! frame f 0x20     # function frame returning to 0x20
//! block while 0x30 # automatic frame
//! get! x           # resolve through every frame, push the cell's value
//! ret              # unwind to and including the function frame
//! ```
//!
//! Values are numbers, `"strings"`, `none` or `@N` references.

use super::errors::{Result, VmError};
use super::native::NativeRegistry;
use super::report;
use super::settings::Settings;
use crate::memory::stack::{Lookup, ReturnAddress};
use crate::memory::value::{Address, Value};
use crate::memory::Memory;
use crate::snapshot::Transcript;

/// One trace command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Push(Value),
    Pop,
    Dup,
    Clear,
    Alloc(usize),
    Release(Address, usize),
    Store(Address),
    Load(Address),
    List(usize),
    Let(String),
    Get(String, Lookup),
    Set(String),
    Addr(String),
    Frame(String, ReturnAddress),
    Block(String, ReturnAddress),
    End,
    Ret,
    Capture,
    Call(String, ReturnAddress),
    Native(String),
    Gc(usize),
    Check,
    Print,
    Stack(Option<usize>),
    Free,
    Unwind,
}

fn syntax(message: impl Into<String>, line: u32) -> VmError {
    VmError::Syntax {
        message: message.into(),
        line,
    }
}

/// Byte offset where a `#` comment starts. A `"` opens a string wherever it
/// appears, and a `#` inside a string is text.
pub fn comment_start(text: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '#' => return Some(i),
            '"' => {
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => {
                            chars.next();
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a line into words, keeping quoted strings (with their quotes) whole
fn tokenize(text: &str, line: u32) -> Result<Vec<String>> {
    let code = &text[..comment_start(text).unwrap_or(text.len())];
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut token = String::from("\"");
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => token.push('\n'),
                        Some('t') => token.push('\t'),
                        Some(other) => token.push(other),
                        None => return Err(syntax("unterminated string", line)),
                    },
                    Some(other) => token.push(other),
                    None => return Err(syntax("unterminated string", line)),
                }
            }
            tokens.push(token);
            continue;
        }
        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == '"' {
                break;
            }
            token.push(c);
            chars.next();
        }
        tokens.push(token);
    }
    Ok(tokens)
}

fn parse_unsigned(word: &str, line: u32) -> Result<u32> {
    let word = word.trim_start_matches('@');
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => word.parse::<u32>(),
    };
    parsed.map_err(|_| syntax(format!("expected an unsigned number, found '{}'", word), line))
}

fn parse_value(word: &str, line: u32) -> Result<Value> {
    if let Some(text) = word.strip_prefix('"') {
        return Ok(Value::String(text.to_string()));
    }
    if word == "none" {
        return Ok(Value::None);
    }
    if word.starts_with('@') {
        return Ok(Value::Reference(Address::new(parse_unsigned(word, line)?)));
    }
    word.parse::<f64>()
        .map(Value::Number)
        .map_err(|_| syntax(format!("'{}' is not a value", word), line))
}

impl Command {
    /// Parse one line. Blank lines and comments yield `None`.
    pub fn parse(text: &str, line: u32) -> Result<Option<Command>> {
        let tokens = tokenize(text, line)?;
        let Some((name, rest)) = tokens.split_first() else {
            return Ok(None);
        };

        let arg = |i: usize| {
            rest.get(i)
                .map(String::as_str)
                .ok_or_else(|| syntax(format!("'{}' expects more operands", name), line))
        };
        let size = |i: usize| -> Result<usize> { Ok(parse_unsigned(arg(i)?, line)? as usize) };
        let addr = |i: usize| -> Result<Address> { Ok(Address::new(parse_unsigned(arg(i)?, line)?)) };

        let expected = match name.as_str() {
            "pop" | "dup" | "clear" | "end" | "ret" | "capture" | "check" | "print" | "free"
            | "unwind" => 0,
            "push" | "alloc" | "store" | "load" | "list" | "let" | "get" | "get!" | "set"
            | "addr" | "native" => 1,
            "release" | "frame" | "block" | "call" => 2,
            "gc" | "stack" => rest.len().min(1),
            other => return Err(syntax(format!("unknown command '{}'", other), line)),
        };
        if rest.len() != expected {
            return Err(syntax(
                format!("'{}' takes {} operand(s), found {}", name, expected, rest.len()),
                line,
            ));
        }

        let command = match name.as_str() {
            "push" => Command::Push(parse_value(arg(0)?, line)?),
            "pop" => Command::Pop,
            "dup" => Command::Dup,
            "clear" => Command::Clear,
            "alloc" => Command::Alloc(size(0)?),
            "release" => Command::Release(addr(0)?, size(1)?),
            "store" => Command::Store(addr(0)?),
            "load" => Command::Load(addr(0)?),
            "list" => Command::List(size(0)?),
            "let" => Command::Let(arg(0)?.to_string()),
            "get" => Command::Get(arg(0)?.to_string(), Lookup::CurrentFrame),
            "get!" => Command::Get(arg(0)?.to_string(), Lookup::AllFrames),
            "set" => Command::Set(arg(0)?.to_string()),
            "addr" => Command::Addr(arg(0)?.to_string()),
            "frame" => Command::Frame(arg(0)?.to_string(), parse_unsigned(arg(1)?, line)?),
            "block" => Command::Block(arg(0)?.to_string(), parse_unsigned(arg(1)?, line)?),
            "end" => Command::End,
            "ret" => Command::Ret,
            "capture" => Command::Capture,
            "call" => Command::Call(arg(0)?.to_string(), parse_unsigned(arg(1)?, line)?),
            "native" => Command::Native(arg(0)?.to_string()),
            "gc" => Command::Gc(if rest.is_empty() { 0 } else { size(0)? }),
            "check" => Command::Check,
            "print" => Command::Print,
            "stack" => Command::Stack(if rest.is_empty() { None } else { Some(size(0)?) }),
            "free" => Command::Free,
            _ => Command::Unwind,
        };
        Ok(Some(command))
    }
}

/// What a run ended with
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub executed: usize,
    pub errors: Vec<VmError>,
    /// Stopped early on a fatal error or in strict mode
    pub halted: bool,
}

/// Owns a memory context and executes trace commands against it
#[derive(Debug, Clone)]
pub struct Host {
    memory: Memory,
    natives: NativeRegistry,
    output: Transcript,
    settings: Settings,
}

impl Host {
    pub fn new(settings: Settings) -> Self {
        let mut memory = Memory::new(&settings.limits);
        memory.set_gc_enabled(settings.gc_enabled);
        Host {
            memory,
            natives: NativeRegistry::with_builtins(),
            output: Transcript::new(),
            settings,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn output(&self) -> &Transcript {
        &self.output
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn pop_closure(&mut self, line: u32) -> Result<crate::memory::closure::ClosureIndex> {
        let value = self.memory.pop_arg(line)?;
        value.as_closure().ok_or(VmError::TypeMismatch {
            expected: "closure",
            got: value.type_name(),
            line,
        })
    }

    /// Execute one command
    pub fn execute(&mut self, command: &Command, line: u32) -> Result<()> {
        let memory = &mut self.memory;
        match command {
            Command::Push(value) => memory.push_arg(value.clone(), line)?,
            Command::Pop => {
                memory.pop_arg(line)?;
            }
            Command::Dup => {
                let top = memory.top_arg(line)?.clone();
                memory.push_arg(top, line)?;
            }
            Command::Clear => {
                memory.clear_args();
                memory.clear_registers();
            }
            Command::Alloc(size) => {
                let addr = memory.allocate(*size, line)?;
                memory.push_arg(Value::Reference(addr), line)?;
            }
            Command::Release(addr, size) => memory.release(*addr, *size, line)?,
            Command::Store(addr) => {
                let value = memory.pop_arg(line)?;
                memory.write(*addr, value, line)?;
            }
            Command::Load(addr) => {
                let value = memory.read(*addr, line)?.clone();
                memory.push_arg(value, line)?;
            }
            Command::List(len) => {
                let header = memory.push_list(*len, line)?;
                memory.push_arg(Value::Reference(header), line)?;
            }
            Command::Let(id) => {
                let value = memory.pop_arg(line)?;
                let addr = memory.push_value(value, line)?;
                memory.declare(id, addr, line)?;
            }
            Command::Get(id, lookup) => {
                let addr = memory.resolve(id, *lookup, line)?;
                let value = memory.read(addr, line)?.clone();
                memory.push_arg(value, line)?;
            }
            Command::Set(id) => {
                let value = memory.pop_arg(line)?;
                memory.assign(id, value, line)?;
            }
            Command::Addr(id) => {
                let addr = memory.resolve(id, Lookup::AllFrames, line)?;
                memory.push_arg(Value::Reference(addr), line)?;
            }
            Command::Frame(name, ret) => memory.push_function_frame(name, *ret, line)?,
            Command::Block(kind, ret) => memory.push_auto_frame(*ret, kind, line)?,
            Command::End => {
                memory.pop_frame(false, line)?;
            }
            Command::Ret => {
                memory.pop_frame(true, line)?;
            }
            Command::Capture => {
                let index = memory.capture();
                memory.push_arg(Value::Closure(index), line)?;
            }
            Command::Call(name, ret) => {
                let index = self.pop_closure(line)?;
                self.memory.push_function_frame(name, *ret, line)?;
                self.memory.invoke(index, line)?;
            }
            Command::Native(name) => {
                self.natives
                    .call(&mut self.memory, &mut self.output, name, line)?
            }
            Command::Gc(min_size) => {
                memory.collect(*min_size, line)?;
            }
            Command::Check => {
                memory.check_invariants(line)?;
                memory.check_registers_balanced(line)?;
            }
            Command::Print => {
                let value = memory.pop_arg(line)?;
                self.output.print(value.to_string(), line);
            }
            Command::Stack(count) => {
                let count = count.unwrap_or(usize::MAX);
                for text in report::call_stack_lines(&self.memory, count) {
                    self.output.print(text, line);
                }
            }
            Command::Free => {
                for text in report::free_block_lines(&self.memory) {
                    self.output.print(text, line);
                }
            }
            Command::Unwind => memory.unwind(),
        }
        Ok(())
    }

    /// Parse and execute one source line, then require balanced registers.
    /// Returns whether the line held a command.
    pub fn run_line(&mut self, text: &str, line: u32) -> Result<bool> {
        let Some(command) = Command::parse(text, line)? else {
            return Ok(false);
        };
        self.execute(&command, line)?;
        self.memory.check_registers_balanced(line)?;
        Ok(true)
    }

    /// Reset to a known-good state after a recoverable error
    pub fn recover(&mut self) {
        self.memory.unwind();
        self.memory.clear_args();
        self.memory.clear_registers();
    }

    /// Run a whole trace. `observe` sees the host after every command line,
    /// with the error if it failed, before any recovery.
    pub fn run(&mut self, source: &str, mut observe: impl FnMut(&Host, u32, Option<&VmError>)) -> RunSummary {
        let mut summary = RunSummary::default();
        for (index, text) in source.lines().enumerate() {
            let line = index as u32 + 1;
            match self.run_line(text, line) {
                Ok(false) => {}
                Ok(true) => {
                    summary.executed += 1;
                    observe(self, line, None);
                }
                Err(error) => {
                    summary.executed += 1;
                    observe(self, line, Some(&error));
                    let stop = error.is_fatal() || self.settings.strict;
                    summary.errors.push(error);
                    if stop {
                        summary.halted = true;
                        break;
                    }
                    self.recover();
                }
            }
        }
        summary
    }
}
