//! Block runtime
//!
//! [`BlockRuntime`] owns a workspace, a script executor, and the run results
//! of every block. Running is always explicit: recording a result never
//! re-runs the blocks that read from it.

pub mod config;
pub mod engine;
pub mod result;
pub mod timer;
pub mod validation;
pub mod workspace;

pub use config::{ConfigError, RuntimeConfig};
pub use result::{RunError, RunErrorKind, RunResult, RunStatus};
pub use validation::{DependencyGraph, GraphValidationResult, ValidationIssue};
pub use workspace::Workspace;

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::categories::datasource::FileStore;
use crate::categories::script::ScriptExecutor;
use crate::core::block::{Block, BlockPatch};
use crate::core::events::{ModelEvent, Subscription};
use crate::core::model::CellularModel;
use crate::core::store::{ModelStore, StoreError};
use crate::core::BlockId;

/// Current result of a block plus retained past results, newest first
#[derive(Default)]
struct RunRecord {
    current: Option<Arc<RunResult>>,
    history: VecDeque<Arc<RunResult>>,
}

type RunningCounts = Arc<Mutex<HashMap<BlockId, usize>>>;

/// Marks a block as running for as long as it lives
pub(crate) struct RunningGuard {
    running: RunningCounts,
    id: BlockId,
}

impl RunningGuard {
    pub(crate) fn enter(running: &RunningCounts, id: BlockId) -> Self {
        *running.lock().entry(id).or_default() += 1;
        Self {
            running: running.clone(),
            id,
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock();
        if let Some(count) = running.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                running.remove(&self.id);
            }
        }
    }
}

/// Runs blocks of one workspace and keeps their results
#[derive(Clone)]
pub struct BlockRuntime {
    workspace: Workspace,
    executor: Arc<dyn ScriptExecutor>,
    config: RuntimeConfig,
    results: Arc<RwLock<HashMap<BlockId, RunRecord>>>,
    running: RunningCounts,
    _removals: Arc<Subscription>,
}

impl BlockRuntime {
    /// Create a runtime over an existing workspace with default settings
    pub fn new(workspace: Workspace, executor: Arc<dyn ScriptExecutor>) -> Self {
        Self::with_config(workspace, executor, RuntimeConfig::default())
    }

    /// Create a runtime over an existing workspace
    pub fn with_config(
        workspace: Workspace,
        executor: Arc<dyn ScriptExecutor>,
        config: RuntimeConfig,
    ) -> Self {
        let results: Arc<RwLock<HashMap<BlockId, RunRecord>>> = Arc::new(RwLock::new(HashMap::new()));
        // Results of a removed block go with it, however the removal happened.
        let weak = Arc::downgrade(&results);
        let removals = workspace.store().subscribe(move |event| {
            if let (ModelEvent::BlockRemoved(id), Some(results)) = (event, weak.upgrade()) {
                if results.write().remove(id).is_some() {
                    debug!(block_id = %id, "run results dropped with block");
                }
            }
        });
        Self {
            workspace,
            executor,
            config,
            results,
            running: Arc::new(Mutex::new(HashMap::new())),
            _removals: Arc::new(removals),
        }
    }

    /// Open a document: build its workspace (using the configured CSV
    /// dialect) and a runtime over it
    pub fn open(
        model: CellularModel,
        files: Arc<dyn FileStore>,
        executor: Arc<dyn ScriptExecutor>,
        config: RuntimeConfig,
    ) -> Result<Self, StoreError> {
        let workspace = Workspace::with_csv_options(model, files, config.csv)?;
        Ok(Self::with_config(workspace, executor, config))
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &ModelStore {
        self.workspace.store()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to document mutations and recorded results
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        self.store().subscribe(callback)
    }

    pub fn get_block(&self, id: BlockId) -> Result<Block, StoreError> {
        self.store().get_block(id)
    }

    pub fn add_block(&self, block: Block) -> Result<(), StoreError> {
        self.store().add_block(block)
    }

    /// Patch a block. Its run results are kept.
    pub fn update_block(&self, id: BlockId, patch: BlockPatch) -> Result<Block, StoreError> {
        self.store().update_block(id, patch)
    }

    /// Remove a block and discard its run results
    pub fn remove_block(&self, id: BlockId) -> Result<Block, StoreError> {
        let had_results = self.results.read().contains_key(&id);
        let removed = self.store().remove_block(id)?;
        if had_results {
            debug!(block_id = %id, "run results discarded");
            self.store().notify(ModelEvent::RunDiscarded(id));
        }
        Ok(removed)
    }

    /// Current result of a block
    pub fn result(&self, id: BlockId) -> Option<Arc<RunResult>> {
        self.results.read().get(&id).and_then(|r| r.current.clone())
    }

    /// Retained past results of a block, newest first
    pub fn history(&self, id: BlockId) -> Vec<Arc<RunResult>> {
        self.results
            .read()
            .get(&id)
            .map(|r| r.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Lifecycle state of a block
    pub fn status(&self, id: BlockId) -> RunStatus {
        if self.running.lock().contains_key(&id) {
            return RunStatus::Running;
        }
        self.result(id)
            .map(|r| r.status())
            .unwrap_or(RunStatus::NeverRun)
    }

    /// Forget every result of a block. Returns whether there was anything
    /// to forget.
    pub fn discard_result(&self, id: BlockId) -> bool {
        let discarded = self.results.write().remove(&id).is_some();
        if discarded {
            debug!(block_id = %id, "run results discarded");
            self.store().notify(ModelEvent::RunDiscarded(id));
        }
        discarded
    }

    /// Dependency graph of the current blocks
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_blocks(&self.store().blocks())
    }
}
