//! Execution strategies and the shared step runtime.
//!
//! Two strategies live behind the [`Executor`] trait: sequential
//! (one step at a time in topological order) and level-parallel
//! (concurrent batches separated by a barrier). Both delegate the
//! per-step behavior (cache lookup, conditional evaluation, the
//! retry/timeout loop, and cache writes) to a shared step runtime.
//!
//! Timeout enforcement is cooperative: a callable's future is dropped
//! when its deadline fires. A callable that blocks the thread outside
//! an await point keeps the worker busy until it yields.

mod parallel;
pub(crate) mod runner;
mod sequential;

pub use parallel::ParallelExecutor;
pub use sequential::SequentialExecutor;

use crate::cache::CacheStore;
use crate::core::RunResult;
use crate::dag::Dag;
use crate::errors::FlowdagError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Per-run parameters shared by all executors.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Input handed to steps with no dependencies.
    pub initial_input: Option<Value>,
    /// Resolved cache store, if caching is enabled for the run.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// When set, cache reads are skipped for the run; writes still
    /// happen, so the run repopulates the cache.
    pub force: bool,
}

impl ExecutionContext {
    /// Creates a context with no initial input and no cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Strategy that drives a DAG to completion.
#[async_trait]
pub trait Executor: Send + Sync + Debug {
    /// Executes every step of the graph, returning the aggregated
    /// results.
    ///
    /// # Errors
    ///
    /// Returns validation errors before any callable runs, and
    /// [`FlowdagError::Step`] carrying partial results when a step
    /// fails terminally.
    async fn execute(&self, dag: &Dag, ctx: &ExecutionContext) -> Result<RunResult, FlowdagError>;
}
