//! Core document abstractions
//!
//! This module defines the type system, variables, blocks, the persisted
//! document shape, and the observable store that owns a document's blocks.

pub mod types;
pub mod variable;
pub mod block;
pub mod model;
pub mod events;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use block::{Block, BlockKind, BlockPatch};
pub use model::CellularModel;
pub use store::{ModelStore, StoreError};
pub use types::{infer_type, Type};
pub use variable::{InputRef, Variable};

/// Unique identifier for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub Uuid);

impl BlockId {
    /// Generate a new random block ID
    pub fn new() -> Self {
        BlockId(Uuid::new_v4())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BlockId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(BlockId)
    }
}
