//! Script blocks
//!
//! A script block's body is opaque to the runtime: it is handed, with the
//! resolved input bindings, to a [`ScriptExecutor`]. Executors are untrusted;
//! the runtime converts every failure (and panic) into a run error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::core::block::{Block, BlockKind};

/// Variable name → value
pub type Bindings = BTreeMap<String, JsonValue>;

/// An exception raised by a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ScriptFailure {
    /// Exception class or kind, e.g. `TypeError`
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Stack trace, when the executor has one
    pub stack: Option<String>,
}

impl ScriptFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Convert an arbitrary error. A `ScriptFailure` inside the error is used
    /// as-is; otherwise the name is `Error` and the cause chain becomes the
    /// stack.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(failure) = err.downcast_ref::<ScriptFailure>() {
            return failure.clone();
        }
        let causes: Vec<String> = err
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {}", cause))
            .collect();
        Self {
            name: "Error".into(),
            message: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Script execution capability
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `script` with `inputs` bound and return the produced variables
    async fn execute(&self, script: &str, inputs: Bindings) -> Result<Bindings, ScriptFailure>;
}

/// Executor backed by a closure
///
/// # Example
/// ```
/// use cellular::categories::script::{Bindings, FnScriptExecutor};
///
/// let double = FnScriptExecutor::new(|_script: &str, inputs: &Bindings| {
///     let x = inputs["x"].as_f64().ok_or_else(|| anyhow::anyhow!("x is not a number"))?;
///     Ok(Bindings::from([("y".to_string(), serde_json::json!(x * 2.0))]))
/// });
/// # let _ = double;
/// ```
pub struct FnScriptExecutor<F> {
    f: F,
}

impl<F> FnScriptExecutor<F>
where
    F: Fn(&str, &Bindings) -> anyhow::Result<Bindings> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ScriptExecutor for FnScriptExecutor<F>
where
    F: Fn(&str, &Bindings) -> anyhow::Result<Bindings> + Send + Sync,
{
    async fn execute(&self, script: &str, inputs: Bindings) -> Result<Bindings, ScriptFailure> {
        (self.f)(script, &inputs).map_err(ScriptFailure::from_anyhow)
    }
}

/// Executor for workspaces without a script sandbox; every run fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableExecutor;

#[async_trait]
impl ScriptExecutor for UnavailableExecutor {
    async fn execute(&self, _script: &str, _inputs: Bindings) -> Result<Bindings, ScriptFailure> {
        Err(ScriptFailure::new(
            "ScriptUnavailable",
            "no script executor is configured for this workspace",
        ))
    }
}

/// New script block with no inputs, no outputs, and an empty body.
///
/// Outputs are filled in by the first successful run; inputs are wired by
/// the caller.
pub fn create_script_block(title: impl Into<String>) -> Block {
    let title = title.into();
    Block::new(
        title.clone(),
        BlockKind::Script {
            title,
            script: String::new(),
        },
    )
}
