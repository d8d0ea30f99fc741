//! Level-parallel executor: concurrent batches separated by a barrier.

use super::{runner, ExecutionContext, Executor};
use crate::core::{RunResult, StepResult};
use crate::dag::Dag;
use crate::errors::{FlowdagError, StepError, StepFailure};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Runs each DAG level as a concurrent batch.
///
/// Every step in level k completes before any step in level k+1
/// starts, so a step always sees fully materialized dependency
/// outputs. Workers never share mutable state: each returns its own
/// result and the coordinator merges them at the level barrier.
///
/// When a step fails, in-flight siblings in the same level run to
/// completion and keep their results; no later level starts.
#[derive(Debug, Clone, Default)]
pub struct ParallelExecutor {
    max_threads: Option<usize>,
}

impl ParallelExecutor {
    /// Creates an executor with unbounded within-level parallelism.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of steps running concurrently within a level.
    #[must_use]
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }
}

#[async_trait]
impl Executor for ParallelExecutor {
    async fn execute(&self, dag: &Dag, ctx: &ExecutionContext) -> Result<RunResult, FlowdagError> {
        let levels = dag.levels()?;
        let mut results = RunResult::new();
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let semaphore = self.max_threads.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            run_id = %results.run_id(),
            levels = levels.len(),
            max_threads = self.max_threads,
            "starting parallel run"
        );

        for (depth, level) in levels.iter().enumerate() {
            debug!(depth, steps = level.len(), "starting level");

            // Inputs are snapshotted before the level starts; workers
            // only ever touch their own step.
            let handles: Vec<_> = level
                .iter()
                .map(|step| {
                    let step = (*step).clone();
                    let input =
                        runner::marshal_input(&step, &outputs, ctx.initial_input.as_ref());
                    let cache = ctx.cache.clone();
                    let force = ctx.force;
                    let semaphore = semaphore.clone();
                    tokio::spawn(async move {
                        let _permit = match &semaphore {
                            Some(sem) => Some(sem.acquire().await.expect("semaphore closed")),
                            None => None,
                        };
                        runner::run_step(&step, input, cache.as_ref(), force).await
                    })
                })
                .collect();

            let joined = join_all(handles).await;

            let mut first_failure: Option<(String, StepFailure)> = None;
            for (step, outcome) in level.iter().zip(joined) {
                let result = match outcome {
                    Ok(result) => result,
                    Err(err) => {
                        let now = Utc::now();
                        StepResult::failure(
                            step.name(),
                            StepFailure::new(format!("worker panicked: {err}")),
                            Duration::ZERO,
                            now,
                            now,
                            0,
                        )
                    }
                };

                if result.status.is_failure() && first_failure.is_none() {
                    let source = result
                        .error
                        .clone()
                        .unwrap_or_else(|| StepFailure::new("step failed"));
                    first_failure = Some((step.name().to_string(), source));
                }

                outputs.insert(
                    step.name().to_string(),
                    result.output.clone().unwrap_or(Value::Null),
                );
                results.record(result);
            }

            if let Some((name, source)) = first_failure {
                results.finish();
                warn!(
                    run_id = %results.run_id(),
                    step = %name,
                    depth,
                    "aborting run before next level"
                );
                return Err(StepError::new(name, source, results).into());
            }
        }

        results.finish();
        info!(run_id = %results.run_id(), "run complete");
        Ok(results)
    }
}
