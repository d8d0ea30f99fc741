//! Step status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The terminal status of a step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran (or was served from the cache) and produced an output.
    Success,
    /// The step exhausted its retries with an error.
    Failed,
    /// The step's conditions directed it not to run.
    Skipped,
    /// The step exceeded its deadline on its final attempt.
    TimedOut,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status does not fail a run.
    ///
    /// A skip counts as success: downstream steps still run and see a
    /// null value for the skipped dependency.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }

    /// Returns true if the status aborts a run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}
