//! Cellular - block runtime for a notebook-style data document
//!
//! This crate provides the document model (typed blocks wired through named
//! variables), file ingestion with type inference, and the runtime that
//! resolves, executes, and records block runs.

pub mod core;
pub mod categories;
pub mod runtime;
mod tests;

// Re-export commonly used types
pub use crate::core::{Block, BlockId, BlockKind, CellularModel, ModelStore, Type};
pub use crate::categories::BlockCategory;
pub use crate::runtime::{BlockRuntime, RunResult, RunStatus, RuntimeConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
