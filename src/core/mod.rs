//! Core execution records: step statuses, per-step results, and run
//! aggregation.

mod result;
mod status;

pub use result::{RunResult, RunSummary, StepResult};
pub use status::StepStatus;
