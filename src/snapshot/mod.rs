// Snapshot management for stepping back through a trace

use crate::memory::heap::FreeBlock;
use crate::memory::stack::StackEntry;
use crate::memory::value::{Address, Value};
use crate::memory::{Memory, Pointers};

/// Output written by natives and `print`, kept per source line
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript { lines: Vec::new() }
    }

    /// Append one line of output
    pub fn print(&mut self, text: impl Into<String>, line: u32) {
        self.lines.push(TranscriptLine {
            text: text.into(),
            line,
        });
    }

    /// Get all lines as a vector of strings
    pub fn get_output(&self) -> Vec<String> {
        self.lines
            .iter()
            .flat_map(|tl| tl.text.split('\n').map(|s| s.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// A line of output with the source line that produced it
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub text: String,
    pub line: u32,
}

/// Compact copy of the memory state after one trace line
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub line: u32,
    pub error: Option<String>,
    pub pointers: Pointers,
    /// Cells below the memory pointer
    pub cells: Vec<Value>,
    pub live_extents: Vec<(Address, usize)>,
    pub free_blocks: Vec<FreeBlock>,
    pub stack: Vec<StackEntry>,
    pub args: Vec<Value>,
    pub registers: Vec<Address>,
    pub output_lines: usize,
}

impl Snapshot {
    pub fn capture(memory: &Memory, transcript: &Transcript, line: u32, error: Option<String>) -> Self {
        let heap = memory.heap();
        Snapshot {
            line,
            error,
            pointers: memory.pointers(),
            cells: heap.used_cells().to_vec(),
            live_extents: heap.live_extents().collect(),
            free_blocks: heap.free_blocks().to_vec(),
            stack: memory.stack().entries().to_vec(),
            args: memory.args().as_slice().to_vec(),
            registers: memory.registers().as_slice().to_vec(),
            output_lines: transcript.len(),
        }
    }

    /// Estimate the memory usage of this snapshot in bytes
    pub fn estimated_size(&self) -> usize {
        // This is a rough estimate: fixed-size parts plus string payloads
        let value_size = std::mem::size_of::<Value>();
        let strings: usize = self
            .cells
            .iter()
            .chain(&self.args)
            .filter_map(Value::as_str)
            .map(str::len)
            .sum();

        std::mem::size_of::<Snapshot>()
            + (self.cells.len() + self.args.len()) * value_size
            + strings
            + self.live_extents.len() * std::mem::size_of::<(Address, usize)>()
            + self.free_blocks.len() * std::mem::size_of::<FreeBlock>()
            + self.stack.len() * (std::mem::size_of::<StackEntry>() + 16)
            + self.registers.len() * std::mem::size_of::<Address>()
    }
}

/// Manages execution history for reverse stepping
#[derive(Debug)]
pub struct SnapshotManager {
    snapshots: Vec<Snapshot>,
    max_memory: usize,
    current_memory: usize,
}

impl SnapshotManager {
    pub fn new(max_memory: usize) -> Self {
        SnapshotManager {
            snapshots: Vec::new(),
            max_memory,
            current_memory: 0,
        }
    }

    /// Add a snapshot to history
    pub fn push(&mut self, snapshot: Snapshot) -> Result<(), String> {
        let snapshot_size = snapshot.estimated_size();

        if self.current_memory + snapshot_size > self.max_memory {
            return Err(format!(
                "Snapshot memory limit exceeded: {} + {} > {}",
                self.current_memory, snapshot_size, self.max_memory
            ));
        }

        self.current_memory += snapshot_size;
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Get a snapshot by index
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// Get the number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Get current memory usage
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }

    /// Get max memory limit
    pub fn memory_limit(&self) -> usize {
        self.max_memory
    }
}
