//! Error types for the flowdag engine.
//!
//! Definition-time errors (duplicate names, unknown dependencies,
//! cycles) abort before any callable executes. Run-time failures are
//! surfaced as a [`StepError`] carrying the partial results collected
//! up to the failing step.

use crate::core::RunResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The main error type for flowdag operations.
#[derive(Debug, Error)]
pub enum FlowdagError {
    /// A step name was registered twice.
    #[error("{0}")]
    Duplicate(#[from] DuplicateStepError),

    /// A declared dependency does not resolve to a registered step.
    #[error("{0}")]
    MissingDependency(#[from] MissingDependencyError),

    /// A cycle was detected in the dependency graph.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),

    /// A step exhausted its retries or timed out during a run.
    #[error("{0}")]
    Step(#[from] StepError),

    /// IO error, e.g. while constructing a file-backed cache store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error raised when a second step is registered under an existing name.
#[derive(Debug, Clone, Error)]
#[error("a step named '{name}' is already registered")]
pub struct DuplicateStepError {
    /// The offending name.
    pub name: String,
}

impl DuplicateStepError {
    /// Creates a new duplicate-step error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Error raised when validation finds a dependency with no registered step.
#[derive(Debug, Clone, Error)]
#[error("step '{step}' depends on unknown step '{dependency}'")]
pub struct MissingDependencyError {
    /// The step declaring the dependency.
    pub step: String,
    /// The dependency name that did not resolve.
    pub dependency: String,
}

impl MissingDependencyError {
    /// Creates a new missing-dependency error.
    #[must_use]
    pub fn new(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            dependency: dependency.into(),
        }
    }
}

/// Error raised when a cycle is detected in the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of steps forming the cycle, first node repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle-detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// The error value produced by a step callable or the step runtime.
///
/// `retry_if` predicates receive this value to decide whether another
/// attempt is worthwhile.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StepFailure {
    /// A failure reported by the callable itself.
    #[error("{0}")]
    Message(String),

    /// The callable exceeded its configured deadline.
    #[error("step timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        /// The configured deadline.
        limit: Duration,
        /// Wall-clock time observed when the deadline fired.
        elapsed: Duration,
    },
}

impl StepFailure {
    /// Creates a failure from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Returns true if this failure was produced by timeout enforcement.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Error raised when a step fails terminally during a run.
///
/// Carries the results of every step that reached a terminal state
/// before the run aborted, the failing step included, so callers can
/// inspect what completed.
#[derive(Debug, Error)]
#[error("step '{step}' failed: {source}")]
pub struct StepError {
    /// The failing step.
    pub step: String,
    /// The underlying failure, a timeout included.
    #[source]
    pub source: StepFailure,
    /// Results collected before the run aborted.
    pub partial: RunResult,
}

impl StepError {
    /// Creates a new step error.
    #[must_use]
    pub fn new(step: impl Into<String>, source: StepFailure, partial: RunResult) -> Self {
        Self {
            step: step.into(),
            source,
            partial,
        }
    }
}
