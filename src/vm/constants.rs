// Limits of the WendyScript VM

/// Number of cells in the address space
pub const MEMORY_SIZE: usize = 129_061;

/// Cells at the bottom of memory that are never handed out. Address 0 is the
/// none value.
pub const RESERVED_MEMORY: usize = 1;

/// Maximum number of call-stack entries (frame sentinels and bindings)
pub const STACK_SIZE: usize = 100_000;

/// Maximum depth of the argument stack
pub const ARGSTACK_SIZE: usize = 128;

/// Maximum depth of the memory-register stack
pub const MEMREGSTACK_SIZE: usize = 128;

/// Identifiers longer than this many bytes are truncated
pub const MAX_IDENTIFIER_LEN: usize = 59;

/// Name of the bottom frame
pub const MAIN_FRAME: &str = "main";

/// Call-stack lines shown in a runtime error report
pub const REPORT_STACK_LINES: usize = 20;
