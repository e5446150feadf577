//! Run results
//!
//! One [`RunResult`] is produced per execution attempt and never mutated
//! afterwards. Resolution failures and execution failures share a single
//! ordered error list, so every run yields a result rather than an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::datasource::IngestError;
use crate::categories::script::{Bindings, ScriptFailure};

/// Outcome of one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// When the run was started
    pub at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: f64,
    /// Produced variables; empty unless the run succeeded
    pub variables: Bindings,
    /// Failures, in the order they were found
    pub errors: Vec<RunError>,
}

impl RunResult {
    /// Whether the run produced outputs
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Status this result puts its block in
    pub fn status(&self) -> RunStatus {
        if self.is_success() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }
}

/// Failure category of a run error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunErrorKind {
    /// An input could not be bound to an upstream output
    UnresolvedInput,
    /// The script raised an exception
    ScriptExecution,
    /// The data source file could not be ingested
    Ingest,
}

/// A single entry in a run's error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    /// Input variable name for unresolved inputs, exception class for
    /// script errors, error kind for ingestion errors
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl RunError {
    pub fn unresolved(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::UnresolvedInput,
            name: input.into(),
            message: message.into(),
            stack: None,
        }
    }
}

impl From<ScriptFailure> for RunError {
    fn from(failure: ScriptFailure) -> Self {
        Self {
            kind: RunErrorKind::ScriptExecution,
            name: failure.name,
            message: failure.message,
            stack: failure.stack,
        }
    }
}

impl From<IngestError> for RunError {
    fn from(err: IngestError) -> Self {
        Self {
            kind: RunErrorKind::Ingest,
            name: err.kind_name().to_string(),
            message: err.to_string(),
            stack: None,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Observable lifecycle of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    NeverRun,
    Running,
    Succeeded,
    Failed,
}
