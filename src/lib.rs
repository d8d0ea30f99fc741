//! # Flowdag
//!
//! A declarative dataflow pipeline engine.
//!
//! Flowdag accepts a set of named steps linked by declared
//! dependencies, validates the resulting graph, and executes it with:
//!
//! - **Correct ordering**: topological execution with a deterministic
//!   insertion-order tie-break
//! - **Concurrency**: a level-parallel executor with a per-level
//!   barrier and an optional concurrency bound
//! - **Resilience**: per-step retries with constant, linear, or
//!   exponential backoff, and per-attempt timeouts
//! - **Conditional skipping**: `only_if` / `unless` predicates over
//!   the step's input
//! - **Durable caching**: pluggable stores (in-memory, filesystem) of
//!   successful outcomes, underpinning resume-after-failure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowdag::prelude::*;
//!
//! let pipeline = flowdag::define("etl", |b| {
//!     b.step_fn("fetch", &[], StepOptions::new(), |_| Ok(json!([1, 2, 3])))?;
//!     b.step_fn("load", &["fetch"], StepOptions::new(), |input| {
//!         Ok(json!(input.as_one().unwrap().as_array().unwrap().len()))
//!     })?;
//!     Ok(())
//! })?;
//!
//! let result = pipeline.run(RunOptions::new().parallel()).await?;
//! assert!(result.success());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod core;
pub mod dag;
pub mod errors;
pub mod executor;
pub mod pipeline;
pub mod step;

pub use pipeline::{define, ExecutorChoice, Pipeline, PipelineBuilder, RunOptions};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{
        CacheChoice, CacheStore, CachedResult, FileStore, MemoryStore,
    };
    pub use crate::core::{RunResult, RunSummary, StepResult, StepStatus};
    pub use crate::dag::Dag;
    pub use crate::errors::{
        CycleDetectedError, DuplicateStepError, FlowdagError,
        MissingDependencyError, StepError, StepFailure,
    };
    pub use crate::executor::{
        ExecutionContext, Executor, ParallelExecutor, SequentialExecutor,
    };
    pub use crate::pipeline::{
        define, ExecutorChoice, Pipeline, PipelineBuilder, RunOptions,
    };
    pub use crate::step::{
        AsyncFnStep, Backoff, Callable, FnStep, Step, StepInput, StepOptions,
    };
}
