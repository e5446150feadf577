//! Block categories
//!
//! Each category owns the behavior behind one [`BlockKind`](crate::core::block::BlockKind)
//! variant: data sources ingest files, scripts delegate to an executor.

pub mod datasource;
pub mod script;

use serde::{Deserialize, Serialize};

/// Block category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockCategory {
    /// File-backed blocks (CSV, JSON)
    DataSource,
    /// User code blocks
    Script,
}

impl BlockCategory {
    /// Get a human-readable name for the category
    pub fn display_name(&self) -> &str {
        match self {
            BlockCategory::DataSource => "Data Source",
            BlockCategory::Script => "Script",
        }
    }
}

impl std::fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
