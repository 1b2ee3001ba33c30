//! Error reporting with source context
//!
//! Formats a [`VmError`] the way the REPL and the batch runner show it: a
//! headline with the line number, a window of the source around the failing
//! line, the innermost call-stack entries and, in verbose mode, a dump of the
//! limits, pointers and free blocks.

use super::constants::{
    ARGSTACK_SIZE, MEMORY_SIZE, MEMREGSTACK_SIZE, REPORT_STACK_LINES, RESERVED_MEMORY, STACK_SIZE,
};
use super::errors::VmError;
use super::settings::Settings;
use crate::memory::Memory;
use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

/// Source text the errors point into
#[derive(Debug, Clone)]
pub struct SourceText {
    pub name: String,
    lines: Vec<String>,
}

impl SourceText {
    pub fn new(name: impl Into<String>, text: &str) -> Self {
        SourceText {
            name: name.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// 1-based line lookup
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Terminal colouring, off when writing to files or tests
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    pub colored: bool,
}

impl Painter {
    fn paint(&self, text: impl std::fmt::Display, color: Color) -> String {
        if self.colored {
            text.to_string().with(color).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Innermost `count` call-stack lines
pub fn call_stack_lines(memory: &Memory, count: usize) -> Vec<String> {
    memory.call_stack_dump().into_iter().take(count).collect()
}

/// One line per free block, in list order
pub fn free_block_lines(memory: &Memory) -> Vec<String> {
    let blocks = memory.free_blocks();
    if blocks.is_empty() {
        return vec!["(no free blocks)".to_string()];
    }
    blocks
        .iter()
        .map(|block| format!("{} .. 0x{:04X} ({} cells)", block.start, block.end(), block.size))
        .collect()
}

fn headline(error: &VmError) -> &'static str {
    match error {
        VmError::Syntax { .. } => "Parse Error",
        e if e.is_fatal() => "Fatal Error",
        _ => "Runtime Error",
    }
}

/// Write the full report for `error`
pub fn report_error<W: Write>(
    out: &mut W,
    error: &VmError,
    memory: &Memory,
    settings: &Settings,
    source: Option<&SourceText>,
    painter: Painter,
) -> io::Result<()> {
    let line = error.line();
    writeln!(
        out,
        "{} on line {}: {}",
        painter.paint(headline(error), Color::Red),
        painter.paint(line, Color::Yellow),
        error
    )?;

    if let Some(source) = source {
        writeln!(out, "==========================")?;
        writeln!(out, "{:>5} Source ({})", "Line", source.name)?;
        let first = line.saturating_sub(2).max(1);
        for number in first..first + 5 {
            let Some(text) = source.line(number) else {
                continue;
            };
            if number == line {
                writeln!(out, "{:>5} {}", number, painter.paint(text, Color::Red))?;
            } else {
                writeln!(out, "{:>5} {}", number, text)?;
            }
        }
        writeln!(out, "==========================")?;
    }

    // A REPL only shows the call stack when asked to be verbose
    if !settings.repl || settings.verbose {
        writeln!(out, "{}", painter.paint("Call Stack", Color::Green))?;
        for text in call_stack_lines(memory, REPORT_STACK_LINES) {
            writeln!(out, "  {}", text)?;
        }
    }
    if settings.verbose {
        write_verbose_dump(out, memory, settings, painter)?;
    }
    Ok(())
}

/// Limits, pointers and free blocks
pub fn write_verbose_dump<W: Write>(
    out: &mut W,
    memory: &Memory,
    settings: &Settings,
    painter: Painter,
) -> io::Result<()> {
    let limits = &settings.limits;
    writeln!(out, "{}", painter.paint("VERBOSE ERROR DUMP", Color::Red))?;
    writeln!(out, "{}", painter.paint("Limits", Color::Green))?;
    writeln!(out, "MEMORY_SIZE {} (default {})", limits.memory_size, MEMORY_SIZE)?;
    writeln!(out, "STACK_SIZE {} (default {})", limits.stack_size, STACK_SIZE)?;
    writeln!(out, "ARGSTACK_SIZE {} (default {})", limits.arg_stack_size, ARGSTACK_SIZE)?;
    writeln!(
        out,
        "MEMREGSTACK_SIZE {} (default {})",
        limits.reg_stack_size, MEMREGSTACK_SIZE
    )?;
    writeln!(out, "RESERVED_MEMORY {}", RESERVED_MEMORY)?;

    let p = memory.pointers();
    writeln!(out, "{}", painter.paint("Memory", Color::Green))?;
    writeln!(out, "FP: {} {:#x}", p.frame_pointer, p.frame_pointer)?;
    writeln!(out, "SP: {} {:#x}", p.stack_pointer, p.stack_pointer)?;
    writeln!(out, "AP: {} {:#x}", p.arg_pointer, p.arg_pointer)?;
    writeln!(out, "RP: {} {:#x}", p.register_pointer, p.register_pointer)?;
    writeln!(out, "MP: {} {:#x}", p.memory_pointer, p.memory_pointer)?;
    writeln!(out, "CP: {} {:#x}", p.closures, p.closures)?;
    writeln!(out, "{}", painter.paint("Free Blocks", Color::Green))?;
    for text in free_block_lines(memory) {
        writeln!(out, "  {}", text)?;
    }
    Ok(())
}
