//! Pipeline facade: binds a validated DAG to executor and cache
//! selections.

mod builder;
#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;

use crate::cache::CacheChoice;
use crate::core::RunResult;
use crate::dag::Dag;
use crate::errors::FlowdagError;
use crate::executor::{ExecutionContext, Executor, ParallelExecutor, SequentialExecutor};
use crate::step::Step;
use serde_json::Value;
use std::sync::Arc;

/// Executor selection for a run.
#[derive(Debug, Clone, Default)]
pub enum ExecutorChoice {
    /// One step at a time, in topological order.
    #[default]
    Sequential,
    /// Level-parallel batches separated by a barrier.
    Parallel,
    /// A user-provided strategy.
    Custom(Arc<dyn Executor>),
}

/// Options for a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Input handed to steps with no dependencies.
    pub initial_input: Option<Value>,
    /// The execution strategy.
    pub executor: ExecutorChoice,
    /// Concurrency bound, honored by the parallel executor only.
    pub max_threads: Option<usize>,
    /// Cache selection for the run.
    pub cache: CacheChoice,
    /// Disables cache reads for the run; writes still happen.
    pub force: bool,
}

impl RunOptions {
    /// Creates options with defaults: sequential, no input, no cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial input for root steps.
    #[must_use]
    pub fn with_initial_input(mut self, input: Value) -> Self {
        self.initial_input = Some(input);
        self
    }

    /// Selects the sequential executor.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.executor = ExecutorChoice::Sequential;
        self
    }

    /// Selects the level-parallel executor.
    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.executor = ExecutorChoice::Parallel;
        self
    }

    /// Selects a user-provided executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = ExecutorChoice::Custom(executor);
        self
    }

    /// Bounds within-level concurrency for the parallel executor.
    #[must_use]
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    /// Selects the cache backing the run.
    #[must_use]
    pub fn with_cache(mut self, cache: impl Into<CacheChoice>) -> Self {
        self.cache = cache.into();
        self
    }

    /// Disables cache reads for the run; writes still happen.
    #[must_use]
    pub fn force_refresh(mut self) -> Self {
        self.force = true;
        self
    }
}

/// A validated pipeline ready to run.
///
/// The graph is frozen once the pipeline is built; re-validation is
/// idempotent. A pipeline may be run any number of times, and the
/// cache it is handed outlives any single run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    dag: Dag,
}

impl Pipeline {
    pub(crate) fn new(name: String, dag: Dag) -> Self {
        Self { name, dag }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dag.len()
    }

    /// Returns true if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Looks up a step by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Step> {
        self.dag.get(name)
    }

    /// Iterates steps in insertion order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.dag.steps()
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Re-validates the graph.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Dag::validate`].
    pub fn validate(&self) -> Result<(), FlowdagError> {
        self.dag.validate()
    }

    /// Renders the graph as a Mermaid flowchart.
    #[must_use]
    pub fn to_mermaid(&self) -> String {
        self.dag.to_mermaid()
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns [`FlowdagError::Io`] if the cache cannot be
    /// constructed, and [`FlowdagError::Step`] carrying partial
    /// results when a step fails terminally.
    pub async fn run(&self, options: RunOptions) -> Result<RunResult, FlowdagError> {
        let cache = options.cache.resolve()?;
        let ctx = ExecutionContext {
            initial_input: options.initial_input,
            cache,
            force: options.force,
        };

        match options.executor {
            ExecutorChoice::Sequential => {
                SequentialExecutor::new().execute(&self.dag, &ctx).await
            }
            ExecutorChoice::Parallel => {
                let mut executor = ParallelExecutor::new();
                if let Some(max_threads) = options.max_threads {
                    executor = executor.with_max_threads(max_threads);
                }
                executor.execute(&self.dag, &ctx).await
            }
            ExecutorChoice::Custom(executor) => executor.execute(&self.dag, &ctx).await,
        }
    }
}

/// Defines a pipeline with a builder closure.
///
/// The closure receives an explicit builder handle and registers steps
/// on it; the finished builder is validated before the pipeline is
/// returned.
///
/// # Errors
///
/// Returns whatever the closure propagates, plus validation errors
/// from the final build.
pub fn define<F>(name: impl Into<String>, f: F) -> Result<Pipeline, FlowdagError>
where
    F: FnOnce(&mut PipelineBuilder) -> Result<(), FlowdagError>,
{
    let mut builder = PipelineBuilder::new(name);
    f(&mut builder)?;
    builder.build()
}
