//! Per-step and per-run execution records.

use super::StepStatus;
use crate::errors::StepFailure;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// The record of a single step's terminal state within a run.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The step name.
    pub name: String,
    /// The terminal status.
    pub status: StepStatus,
    /// The produced output, if any.
    pub output: Option<Value>,
    /// The failure that ended the step, if any.
    pub error: Option<StepFailure>,
    /// Retry attempts beyond the first invocation.
    pub retries: u32,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// When the step reached its terminal state.
    pub finished_at: DateTime<Utc>,
    /// Wall-clock time spent, retries included.
    pub duration: Duration,
    /// Whether the result was materialized from the cache without
    /// invoking the callable.
    pub from_cache: bool,
}

impl StepResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        name: impl Into<String>,
        output: Value,
        duration: Duration,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
            retries,
            started_at,
            finished_at,
            duration,
            from_cache: false,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        name: impl Into<String>,
        error: StepFailure,
        duration: Duration,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            retries,
            started_at,
            finished_at,
            duration,
            from_cache: false,
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            retries: 0,
            started_at,
            finished_at,
            duration: Duration::ZERO,
            from_cache: false,
        }
    }

    /// Creates a timed-out result.
    #[must_use]
    pub fn timed_out(
        name: impl Into<String>,
        error: StepFailure,
        duration: Duration,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        retries: u32,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::TimedOut,
            output: None,
            error: Some(error),
            retries,
            started_at,
            finished_at,
            duration,
            from_cache: false,
        }
    }

    /// Creates a zero-duration result materialized from a cache entry.
    #[must_use]
    pub fn cached(name: impl Into<String>, output: Option<Value>, skipped: bool) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            status: if skipped {
                StepStatus::Skipped
            } else {
                StepStatus::Success
            },
            output,
            error: None,
            retries: 0,
            started_at: now,
            finished_at: now,
            duration: Duration::ZERO,
            from_cache: true,
        }
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Returns true if the step was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status == StepStatus::Skipped
    }

    /// Returns true if the step timed out.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.status == StepStatus::TimedOut
    }

    /// Returns a flat JSON representation suitable for reporting.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "status": self.status,
            "output": self.output.clone().unwrap_or(Value::Null),
            "error": self.error.as_ref().map(ToString::to_string),
            "retries": self.retries,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.to_rfc3339(),
            "duration_ms": self.duration.as_millis() as u64,
            "from_cache": self.from_cache,
        })
    }
}

/// Aggregate counts over a run's step results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Total number of recorded steps.
    pub total: usize,
    /// Steps with status success.
    pub succeeded: usize,
    /// Steps with status failed.
    pub failed: usize,
    /// Steps with status skipped.
    pub skipped: usize,
    /// Steps with status timed-out.
    pub timed_out: usize,
}

/// The aggregated record of a pipeline run.
///
/// Step results are held in the order they were recorded, which for
/// the sequential executor is topological order and for the parallel
/// executor is level order with insertion order inside a level.
#[derive(Debug, Clone)]
pub struct RunResult {
    run_id: Uuid,
    steps: Vec<StepResult>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl RunResult {
    /// Starts a new, empty run record stamped with a fresh run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            duration: None,
        }
    }

    /// Records a step result, preserving recording order.
    pub fn record(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Marks the run finished, fixing the end timestamp and duration.
    pub fn finish(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.duration = Some((now - self.started_at).to_std().unwrap_or(Duration::ZERO));
    }

    /// Looks up a step result by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.name == name)
    }

    /// Returns the recorded step results in order.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Returns the number of recorded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no steps have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the run finished, if it has.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the total wall-clock duration, if the run has finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Returns true if no step failed or timed out.
    #[must_use]
    pub fn success(&self) -> bool {
        self.steps.iter().all(|r| r.status.is_success())
    }

    /// Computes status counts over the recorded steps.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.steps.len(),
            ..RunSummary::default()
        };
        for result in &self.steps {
            match result.status {
                StepStatus::Success => summary.succeeded += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
                StepStatus::TimedOut => summary.timed_out += 1,
            }
        }
        summary
    }

    /// Returns a flat JSON representation suitable for reporting.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "run_id": self.run_id.to_string(),
            "success": self.success(),
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "duration_ms": self.duration.map(|d| d.as_millis() as u64),
            "steps": self.steps.iter().map(StepResult::to_json).collect::<Vec<_>>(),
        })
    }
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}
