//! Block model
//!
//! A block is either a data source (one file materialized as one typed output
//! variable) or a script (user code run against resolved inputs). Both share
//! an ID, a display name, and ordered input/output lists; variant-specific
//! fields live in [`BlockKind`] so no block can carry a half-configured mix of
//! both.

use serde::{Deserialize, Serialize};

use super::variable::{InputRef, Variable};
use super::BlockId;
use crate::categories::datasource::FileKind;
use crate::categories::BlockCategory;

/// A unit of computation or data provisioning in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Stable identifier, generated once
    #[serde(rename = "blockID")]
    pub id: BlockId,
    /// Display name
    pub name: String,
    /// Upstream references, in declaration order
    #[serde(default)]
    pub inputs: Vec<InputRef>,
    /// Produced variables, in declaration order
    #[serde(default, rename = "output")]
    pub outputs: Vec<Variable>,
    /// Variant-specific configuration
    #[serde(flatten)]
    pub kind: BlockKind,
}

/// Variant-specific block configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockKind {
    /// Materializes one external file
    #[serde(rename = "datasource")]
    DataSource {
        /// Full logical path of the source file
        path: String,
        /// Declared file format
        #[serde(rename = "sourcetype")]
        source_kind: FileKind,
    },
    /// Runs user-authored code
    Script {
        /// Script title shown in the block header
        title: String,
        /// Script body
        script: String,
    },
}

impl Block {
    /// Create a block with a fresh ID and no inputs or outputs
    pub fn new(name: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: BlockId::new(),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            kind,
        }
    }

    /// Category of this block
    pub fn category(&self) -> BlockCategory {
        match self.kind {
            BlockKind::DataSource { .. } => BlockCategory::DataSource,
            BlockKind::Script { .. } => BlockCategory::Script,
        }
    }

    /// Find an output variable by name
    pub fn output(&self, name: &str) -> Option<&Variable> {
        self.outputs.iter().find(|v| v.name == name)
    }

    /// Blocks this block reads from, without duplicates, in input order
    pub fn upstream_ids(&self) -> Vec<BlockId> {
        let mut ids = Vec::new();
        for input in &self.inputs {
            if !ids.contains(&input.source) {
                ids.push(input.source);
            }
        }
        ids
    }

    /// Check structural invariants: input and output names are unique
    pub fn validate(&self) -> Result<(), BlockError> {
        if let Some(name) = first_duplicate(self.inputs.iter().map(|i| i.name.as_str())) {
            return Err(BlockError::DuplicateVariable {
                block: self.id,
                name: name.to_string(),
            });
        }
        if let Some(name) = first_duplicate(self.outputs.iter().map(|o| o.name.as_str())) {
            return Err(BlockError::DuplicateVariable {
                block: self.id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Merge a patch into this block.
    ///
    /// Only fields present in the patch change; the ID never does. A patch
    /// carrying fields of the other variant is rejected and leaves the block
    /// untouched.
    pub fn apply(&mut self, patch: BlockPatch) -> Result<(), BlockError> {
        let mut next = self.clone();
        let BlockPatch {
            name,
            inputs,
            outputs,
            path,
            source_kind,
            title,
            script,
        } = patch;

        match &mut next.kind {
            BlockKind::DataSource {
                path: cur_path,
                source_kind: cur_kind,
            } => {
                if title.is_some() || script.is_some() {
                    return Err(BlockError::InvalidPatch {
                        block: self.id,
                        reason: "script fields on a data source block".into(),
                    });
                }
                if let Some(path) = path {
                    *cur_path = path;
                }
                if let Some(kind) = source_kind {
                    *cur_kind = kind;
                }
            }
            BlockKind::Script {
                title: cur_title,
                script: cur_script,
            } => {
                if path.is_some() || source_kind.is_some() {
                    return Err(BlockError::InvalidPatch {
                        block: self.id,
                        reason: "data source fields on a script block".into(),
                    });
                }
                if let Some(title) = title {
                    *cur_title = title;
                }
                if let Some(script) = script {
                    *cur_script = script;
                }
            }
        }

        if let Some(name) = name {
            next.name = name;
        }
        if let Some(inputs) = inputs {
            next.inputs = inputs;
        }
        if let Some(outputs) = outputs {
            next.outputs = outputs;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    names.into_iter().find(|name| !seen.insert(*name))
}

/// Partial update for a block; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockPatch {
    pub name: Option<String>,
    pub inputs: Option<Vec<InputRef>>,
    pub outputs: Option<Vec<Variable>>,
    /// Data source only
    pub path: Option<String>,
    /// Data source only
    pub source_kind: Option<FileKind>,
    /// Script only
    pub title: Option<String>,
    /// Script only
    pub script: Option<String>,
}

impl BlockPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn script(script: impl Into<String>) -> Self {
        Self {
            script: Some(script.into()),
            ..Default::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn inputs(inputs: Vec<InputRef>) -> Self {
        Self {
            inputs: Some(inputs),
            ..Default::default()
        }
    }

    pub fn outputs(outputs: Vec<Variable>) -> Self {
        Self {
            outputs: Some(outputs),
            ..Default::default()
        }
    }
}

/// Block errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// Two inputs or two outputs share a name
    #[error("Block {block} declares variable '{name}' twice")]
    DuplicateVariable { block: BlockId, name: String },

    /// Patch does not fit the block's variant
    #[error("Invalid patch for block {block}: {reason}")]
    InvalidPatch { block: BlockId, reason: String },
}
