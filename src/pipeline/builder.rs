//! Pipeline builder.

use super::Pipeline;
use crate::dag::Dag;
use crate::errors::{DuplicateStepError, FlowdagError, StepFailure};
use crate::step::{Callable, FnStep, Step, StepInput, StepOptions};
use serde_json::Value;
use std::sync::Arc;

/// Builder collecting steps before validation.
///
/// Dependencies may reference steps registered later; resolution and
/// acyclicity are checked by [`PipelineBuilder::build`].
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    name: String,
    dag: Dag,
}

impl PipelineBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dag: Dag::new(),
        }
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateStepError`] if the name is already taken.
    pub fn step(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        callable: Arc<dyn Callable>,
        options: StepOptions,
    ) -> Result<&mut Self, DuplicateStepError> {
        self.add(Step::new(
            name,
            dependencies.iter().copied(),
            callable,
            options,
        ))
    }

    /// Registers a step backed by a synchronous closure.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateStepError`] if the name is already taken.
    pub fn step_fn<F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        options: StepOptions,
        func: F,
    ) -> Result<&mut Self, DuplicateStepError>
    where
        F: Fn(StepInput) -> Result<Value, StepFailure> + Send + Sync + 'static,
    {
        self.step(name, dependencies, Arc::new(FnStep::new(func)), options)
    }

    /// Registers a prebuilt step.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateStepError`] if the name is already taken.
    pub fn add(&mut self, step: Step) -> Result<&mut Self, DuplicateStepError> {
        self.dag.add(step)?;
        Ok(self)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dag.len()
    }

    /// Returns true if no steps have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Validates the graph and returns the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`FlowdagError::MissingDependency`] or
    /// [`FlowdagError::Cycle`] when validation fails.
    pub fn build(self) -> Result<Pipeline, FlowdagError> {
        self.dag.validate()?;
        Ok(Pipeline::new(self.name, self.dag))
    }
}
