//! Host side of the VM: everything around [`Memory`](crate::memory::Memory)
//!
//! - [`errors`]: the [`VmError`](errors::VmError) taxonomy, each variant tagged with a source line
//! - [`constants`]: default capacities
//! - [`settings`]: run-time switches and limits
//! - [`native`]: the native-function calling contract and the diagnostic natives
//! - [`report`]: error reports with source context and verbose dumps
//! - [`trace`]: a command language that drives the memory operations

pub mod constants;
pub mod errors;
pub mod native;
pub mod report;
pub mod settings;
pub mod trace;
