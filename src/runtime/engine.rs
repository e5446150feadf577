//! Execution engine
//!
//! Runs one block: resolves its inputs against upstream results, executes it
//! (ingest for data sources, the script executor for scripts), and records
//! the outcome. Every failure past block lookup ends up in the returned
//! [`RunResult`]; `run` itself only fails when the block does not exist.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::categories::datasource::File;
use crate::categories::script::{Bindings, ScriptFailure};
use crate::core::block::{Block, BlockKind, BlockPatch};
use crate::core::events::ModelEvent;
use crate::core::store::StoreError;
use crate::core::types::infer_type;
use crate::core::variable::Variable;
use crate::core::BlockId;

use super::result::{RunError, RunResult};
use super::timer::Timer;
use super::{BlockRuntime, RunningGuard};

/// Values a successful execution produced. `outputs` is set when the
/// block's declared outputs should follow the run.
struct Execution {
    variables: Bindings,
    outputs: Option<Vec<Variable>>,
}

impl BlockRuntime {
    /// Run a block and record its result.
    ///
    /// 1. Look the block up (`NotFound` is the only error returned).
    /// 2. Resolve every input; all unresolved inputs are reported.
    /// 3. Skip execution if anything is unresolved.
    /// 4. Execute: data sources re-ingest through the cache, scripts go to
    ///    the executor.
    /// 5. Record the result unless a newer one exists or the block is gone.
    ///
    /// Downstream blocks are not re-run.
    pub async fn run(&self, id: BlockId) -> Result<Arc<RunResult>, StoreError> {
        let block = self.store().get_block(id)?;
        let at = Utc::now();
        let timer = Timer::now();
        let _running = RunningGuard::enter(&self.running, id);

        debug!(block_id = %id, name = %block.name, "running block");

        let (variables, errors, outputs) = match self.resolve_inputs(&block) {
            Err(errors) => {
                warn!(
                    block_id = %id,
                    errors = errors.len(),
                    "skipping execution: unresolved inputs"
                );
                (Bindings::new(), errors, None)
            }
            Ok(inputs) => match self.execute(&block, inputs).await {
                Ok(execution) => (execution.variables, Vec::new(), execution.outputs),
                Err(error) => {
                    warn!(block_id = %id, error = %error, "block execution failed");
                    (Bindings::new(), vec![error], None)
                }
            },
        };

        let result = Arc::new(RunResult {
            at,
            duration_ms: timer.elapsed_ms(),
            variables,
            errors,
        });
        self.record(&block, result.clone(), outputs);
        Ok(result)
    }

    /// Bind every input to a value from its upstream block's latest
    /// successful result. Returns every failure when any input is unresolved.
    fn resolve_inputs(&self, block: &Block) -> Result<Bindings, Vec<RunError>> {
        let mut bindings = Bindings::new();
        let mut errors = Vec::new();

        for input in &block.inputs {
            let upstream = match self.store().get_block(input.source) {
                Ok(upstream) => upstream,
                Err(_) => {
                    errors.push(RunError::unresolved(
                        &input.name,
                        format!("source block {} does not exist", input.source),
                    ));
                    continue;
                }
            };

            let Some(result) = self.latest_success(input.source) else {
                errors.push(RunError::unresolved(
                    &input.name,
                    format!("block '{}' has no successful run", upstream.name),
                ));
                continue;
            };

            let Some(value) = result.variables.get(&input.name) else {
                errors.push(RunError::unresolved(
                    &input.name,
                    format!("block '{}' did not produce '{}'", upstream.name, input.name),
                ));
                continue;
            };

            let provided = upstream
                .output(&input.name)
                .map(|v| v.ty.clone())
                .unwrap_or_else(|| infer_type(value));
            if !input.ty.accepts(&provided) {
                errors.push(RunError::unresolved(
                    &input.name,
                    format!(
                        "expected {} but block '{}' provides {}",
                        input.ty, upstream.name, provided
                    ),
                ));
                continue;
            }

            debug!(block_id = %block.id, input = %input.name, source = %input.source, "input resolved");
            bindings.insert(input.name.clone(), value.clone());
        }

        if errors.is_empty() {
            Ok(bindings)
        } else {
            Err(errors)
        }
    }

    async fn execute(&self, block: &Block, inputs: Bindings) -> Result<Execution, RunError> {
        match &block.kind {
            BlockKind::DataSource { path, source_kind } => {
                let file = File::new(path.clone(), *source_kind);
                let info = self.workspace().ingest(&file).await?;
                let name = block
                    .outputs
                    .first()
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| file.derive_variable_name());
                Ok(Execution {
                    variables: Bindings::from([(name.clone(), info.data.clone())]),
                    outputs: Some(vec![Variable::new(name, info.ty.clone())]),
                })
            }
            BlockKind::Script { script, .. } => {
                let call = AssertUnwindSafe(self.executor.execute(script, inputs))
                    .catch_unwind()
                    .await;
                let mut variables = match call {
                    Ok(Ok(variables)) => variables,
                    Ok(Err(failure)) => return Err(failure.into()),
                    Err(panic) => {
                        return Err(ScriptFailure::new("Panic", panic_message(panic.as_ref())).into())
                    }
                };

                // Until a block declares outputs, they are taken from the first run.
                if block.outputs.is_empty() {
                    let outputs = variables
                        .iter()
                        .map(|(name, value)| Variable::new(name.clone(), infer_type(value)))
                        .collect();
                    return Ok(Execution {
                        variables,
                        outputs: Some(outputs),
                    });
                }

                let mut captured = Bindings::new();
                for output in &block.outputs {
                    let Some(value) = variables.remove(&output.name) else {
                        return Err(ScriptFailure::new(
                            "MissingOutput",
                            format!("script did not produce declared output '{}'", output.name),
                        )
                        .into());
                    };
                    captured.insert(output.name.clone(), value);
                }
                Ok(Execution {
                    variables: captured,
                    outputs: None,
                })
            }
        }
    }

    /// Store `result` as the block's current result. A result older than the
    /// current one, or for a block no longer in the store, is dropped.
    ///
    /// The outputs patch is applied under the results lock, so the block's
    /// declared outputs always describe its current result.
    fn record(&self, block: &Block, result: Arc<RunResult>, outputs: Option<Vec<Variable>>) {
        let id = block.id;
        let mut outputs_updated = false;
        {
            let mut results = self.results.write();
            let Ok(current) = self.store().get_block(id) else {
                debug!(block_id = %id, "block removed during run; result not recorded");
                return;
            };
            let record = results.entry(id).or_default();
            if record.current.as_ref().is_some_and(|cur| cur.at > result.at) {
                debug!(block_id = %id, "newer result already recorded; dropping stale result");
                return;
            }
            if let Some(previous) = record.current.replace(result.clone()) {
                if self.config.history_limit > 0 {
                    record.history.push_front(previous);
                    record.history.truncate(self.config.history_limit);
                }
            }

            if let Some(outputs) = outputs.filter(|o| *o != current.outputs) {
                match self.store().apply_patch(id, BlockPatch::outputs(outputs)) {
                    Ok(_) => outputs_updated = true,
                    Err(err) => warn!(block_id = %id, error = %err, "failed to update block outputs"),
                }
            }
        }

        if outputs_updated {
            self.store().notify(ModelEvent::BlockUpdated(id));
        }
        if result.is_success() {
            info!(block_id = %id, duration_ms = result.duration_ms, "run recorded");
        } else {
            warn!(block_id = %id, errors = result.errors.len(), "failed run recorded");
        }
        self.store().notify(ModelEvent::RunRecorded(id));
    }

    /// Most recent successful result: the current one, else the newest
    /// successful entry in history.
    pub(crate) fn latest_success(&self, id: BlockId) -> Option<Arc<RunResult>> {
        let results = self.results.read();
        let record = results.get(&id)?;
        record
            .current
            .iter()
            .chain(record.history.iter())
            .find(|r| r.is_success())
            .cloned()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "script executor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::datasource::{FileKind, MemoryFileStore};
    use crate::categories::script::{create_script_block, FnScriptExecutor};
    use crate::core::model::CellularModel;
    use crate::core::types::Type;
    use crate::core::variable::InputRef;
    use crate::runtime::result::RunErrorKind;
    use serde_json::json;

    fn runtime_with<F>(files: MemoryFileStore, f: F) -> BlockRuntime
    where
        F: Fn(&str, &Bindings) -> anyhow::Result<Bindings> + Send + Sync + 'static,
    {
        BlockRuntime::open(
            CellularModel::new("doc"),
            Arc::new(files),
            Arc::new(FnScriptExecutor::new(f)),
            Default::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_unknown_block() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| Ok(Bindings::new()));
        let id = BlockId::new();
        assert_eq!(rt.run(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn test_script_outputs_are_inferred() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| {
            Ok(Bindings::from([
                ("n".to_string(), json!(3)),
                ("s".to_string(), json!(["a", "b"])),
            ]))
        });
        let block = create_script_block("s");
        let id = block.id;
        rt.add_block(block).unwrap();

        let result = rt.run(id).await.unwrap();
        assert!(result.is_success());
        let block = rt.get_block(id).unwrap();
        assert_eq!(
            block.outputs,
            vec![
                Variable::new("n", Type::Number),
                Variable::new("s", Type::array(Type::String)),
            ]
        );
    }

    #[tokio::test]
    async fn test_panic_becomes_script_error() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| panic!("boom"));
        let block = create_script_block("p");
        let id = block.id;
        rt.add_block(block).unwrap();

        let result = rt.run(id).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, RunErrorKind::ScriptExecution);
        assert_eq!(result.errors[0].name, "Panic");
        assert_eq!(result.errors[0].message, "boom");
        assert!(rt.get_block(id).unwrap().outputs.is_empty());
    }

    #[tokio::test]
    async fn test_input_type_mismatch_is_unresolved() {
        let files = MemoryFileStore::new();
        files.insert("n.json", b"[1, 2]".to_vec());
        let rt = runtime_with(files, |_, _| Ok(Bindings::new()));

        let file = File::new("n.json", FileKind::Json);
        let source = crate::categories::datasource::create_datasource(&file, rt.workspace())
            .await
            .unwrap();
        let mut consumer = create_script_block("c");
        consumer.inputs = vec![InputRef::new(source.id, "n").with_type(Type::String)];
        let (sid, cid) = (source.id, consumer.id);
        rt.add_block(source).unwrap();
        rt.add_block(consumer).unwrap();

        rt.run(sid).await.unwrap();
        let result = rt.run(cid).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, RunErrorKind::UnresolvedInput);
        assert_eq!(result.errors[0].name, "n");
        assert!(result.errors[0].message.contains("array<number>"));
    }

    #[tokio::test]
    async fn test_ingest_failure_recorded() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| Ok(Bindings::new()));
        let block = Block::new(
            "gone.csv",
            BlockKind::DataSource {
                path: "gone.csv".into(),
                source_kind: FileKind::Csv,
            },
        );
        let id = block.id;
        rt.add_block(block).unwrap();

        let result = rt.run(id).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, RunErrorKind::Ingest);
        assert_eq!(result.errors[0].name, "NotFound");
        assert_eq!(rt.result(id).as_deref(), Some(result.as_ref()));
    }

    #[tokio::test]
    async fn test_declared_outputs_are_captured() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| {
            Ok(Bindings::from([
                ("y".to_string(), json!(1)),
                ("scratch".to_string(), json!("tmp")),
            ]))
        });
        let mut block = create_script_block("s");
        block.outputs = vec![Variable::new("y", Type::Number)];
        let id = block.id;
        rt.add_block(block).unwrap();

        let result = rt.run(id).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.variables.keys().collect::<Vec<_>>(), vec!["y"]);
        assert_eq!(
            rt.get_block(id).unwrap().outputs,
            vec![Variable::new("y", Type::Number)]
        );
    }

    #[tokio::test]
    async fn test_missing_declared_output_fails_run() {
        let rt = runtime_with(MemoryFileStore::new(), |_, _| {
            Ok(Bindings::from([("x".to_string(), json!(1))]))
        });
        let mut block = create_script_block("s");
        block.outputs = vec![
            Variable::new("x", Type::Number),
            Variable::new("y", Type::Number),
        ];
        let id = block.id;
        rt.add_block(block).unwrap();

        let result = rt.run(id).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, RunErrorKind::ScriptExecution);
        assert_eq!(result.errors[0].name, "MissingOutput");
        assert!(result.variables.is_empty());
        assert_eq!(rt.get_block(id).unwrap().outputs.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outputs_follow_recorded_result_under_concurrency() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let counter = Arc::new(AtomicUsize::new(0));
        let calls = counter.clone();
        let rt = BlockRuntime::open(
            CellularModel::new("doc"),
            Arc::new(MemoryFileStore::new()),
            Arc::new(FnScriptExecutor::new(move |_, _| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok(Bindings::from([(format!("v{}", n), json!(n))]))
            })),
            crate::runtime::RuntimeConfig {
                history_limit: 64,
                ..Default::default()
            },
        )
        .unwrap();
        let block = create_script_block("s");
        let id = block.id;
        rt.add_block(block).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let rt = rt.clone();
                tokio::spawn(async move { rt.run(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let success = rt.latest_success(id).unwrap();
        let names: Vec<String> = rt
            .get_block(id)
            .unwrap()
            .outputs
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, success.variables.keys().cloned().collect::<Vec<_>>());
        assert!(counter.load(Ordering::SeqCst) >= 1);
    }
}
