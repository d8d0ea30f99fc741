//! Sequential executor: one step at a time in topological order.

use super::{runner, ExecutionContext, Executor};
use crate::core::RunResult;
use crate::dag::Dag;
use crate::errors::{FlowdagError, StepError, StepFailure};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

/// Runs every step on the calling task, in topological order.
///
/// Deterministic: given the same graph and pure callables, two runs
/// produce identical outputs in identical order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    /// Creates a new sequential executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for SequentialExecutor {
    async fn execute(&self, dag: &Dag, ctx: &ExecutionContext) -> Result<RunResult, FlowdagError> {
        let sorted = dag.sorted_steps()?;
        let mut results = RunResult::new();
        let mut outputs: HashMap<String, Value> = HashMap::new();

        info!(
            run_id = %results.run_id(),
            steps = sorted.len(),
            "starting sequential run"
        );

        for step in sorted {
            let input = runner::marshal_input(step, &outputs, ctx.initial_input.as_ref());
            let result = runner::run_step(step, input, ctx.cache.as_ref(), ctx.force).await;

            if result.status.is_failure() {
                let source = result
                    .error
                    .clone()
                    .unwrap_or_else(|| StepFailure::new("step failed"));
                let name = result.name.clone();
                results.record(result);
                results.finish();
                warn!(run_id = %results.run_id(), step = %name, "aborting run");
                return Err(StepError::new(name, source, results).into());
            }

            outputs.insert(
                step.name().to_string(),
                result.output.clone().unwrap_or(Value::Null),
            );
            results.record(result);
        }

        results.finish();
        info!(run_id = %results.run_id(), "run complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{FnStep, Step, StepOptions};
    use serde_json::json;
    use std::sync::Arc;

    fn constant(name: &str, deps: &[&str], value: Value) -> Step {
        Step::new(
            name,
            deps.iter().copied(),
            Arc::new(FnStep::new(move |_| Ok(value.clone()))),
            StepOptions::new(),
        )
    }

    #[tokio::test]
    async fn test_executes_in_topological_order() {
        let mut dag = Dag::new();
        dag.add(constant("fetch", &[], json!([1, 2, 3]))).unwrap();
        dag.add(Step::new(
            "transform",
            ["fetch"],
            Arc::new(FnStep::new(|input| {
                let doubled: Vec<i64> = input
                    .as_one()
                    .and_then(Value::as_array)
                    .map(|xs| xs.iter().filter_map(Value::as_i64).map(|x| x * 2).collect())
                    .unwrap_or_default();
                Ok(json!(doubled))
            })),
            StepOptions::new(),
        ))
        .unwrap();

        let results = SequentialExecutor::new()
            .execute(&dag, &ExecutionContext::new())
            .await
            .unwrap();

        assert!(results.success());
        assert_eq!(
            results.get("transform").unwrap().output,
            Some(json!([2, 4, 6]))
        );

        let fetch = results.get("fetch").unwrap();
        let transform = results.get("transform").unwrap();
        assert!(fetch.finished_at <= transform.started_at);
    }

    #[tokio::test]
    async fn test_failure_aborts_with_partial_results() {
        let mut dag = Dag::new();
        dag.add(constant("first", &[], json!("ok"))).unwrap();
        dag.add(Step::new(
            "second",
            ["first"],
            Arc::new(FnStep::new(|_| Err(StepFailure::new("boom")))),
            StepOptions::new(),
        ))
        .unwrap();
        dag.add(constant("third", &["second"], json!("never"))).unwrap();

        let err = SequentialExecutor::new()
            .execute(&dag, &ExecutionContext::new())
            .await
            .unwrap_err();

        match err {
            FlowdagError::Step(step_err) => {
                assert_eq!(step_err.step, "second");
                assert_eq!(step_err.partial.len(), 2);
                assert!(step_err.partial.get("first").unwrap().is_success());
                assert!(step_err.partial.get("second").unwrap().is_failed());
                assert!(step_err.partial.get("third").is_none());
            }
            other => panic!("expected Step error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initial_input_reaches_roots() {
        let mut dag = Dag::new();
        dag.add(Step::new(
            "seeded",
            Vec::<String>::new(),
            Arc::new(FnStep::new(|input| {
                Ok(json!(input.as_one().and_then(Value::as_i64).unwrap_or(0) + 1))
            })),
            StepOptions::new(),
        ))
        .unwrap();

        let ctx = ExecutionContext {
            initial_input: Some(json!(41)),
            ..ExecutionContext::new()
        };
        let results = SequentialExecutor::new().execute(&dag, &ctx).await.unwrap();

        assert_eq!(results.get("seeded").unwrap().output, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_empty_dag_runs_to_empty_result() {
        let dag = Dag::new();
        let results = SequentialExecutor::new()
            .execute(&dag, &ExecutionContext::new())
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(results.success());
    }
}
