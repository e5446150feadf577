//! Persisted document shape
//!
//! Only the title and the ordered blocks are saved. Run results and the
//! ingestion cache are session-local and recomputed on demand.

use serde::{Deserialize, Serialize};

use super::block::Block;

/// A saved Cellular document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellularModel {
    /// Document title
    pub title: String,
    /// Blocks in display order
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl CellularModel {
    /// Create an empty document
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    /// Load a document from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize the document to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
