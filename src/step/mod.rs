//! Step descriptors: the named units of work in a pipeline.
//!
//! A [`Step`] is immutable after construction. It bundles a name, an
//! ordered dependency list, a [`Callable`], and the [`StepOptions`]
//! that drive the retry, timeout, conditional, and caching behavior of
//! the step runtime.

use crate::errors::StepFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// The input handed to a step callable and its predicates.
///
/// The shape is determined by the step's dependency count: no
/// dependencies yield [`StepInput::None`] (or [`StepInput::One`] when
/// the run was given an initial input), exactly one dependency yields
/// its output positionally, and several dependencies yield a map keyed
/// by dependency name. A skipped dependency contributes `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// No dependencies and no initial input.
    None,
    /// A single upstream output, or the run's initial input.
    One(Value),
    /// One entry per dependency, keyed by dependency name.
    Many(HashMap<String, Value>),
}

impl StepInput {
    /// Returns true if the input carries no value.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the single value, if the input carries exactly one.
    #[must_use]
    pub fn as_one(&self) -> Option<&Value> {
        match self {
            Self::One(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the named map, if the input carries one.
    #[must_use]
    pub fn as_many(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Many(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a dependency output by name in a [`StepInput::Many`].
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_many().and_then(|map| map.get(name))
    }
}

/// Trait for step callables.
#[async_trait]
pub trait Callable: Send + Sync {
    /// Invokes the callable with the marshalled input.
    async fn call(&self, input: StepInput) -> Result<Value, StepFailure>;
}

/// A synchronous closure-backed callable.
pub struct FnStep<F>
where
    F: Fn(StepInput) -> Result<Value, StepFailure> + Send + Sync,
{
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(StepInput) -> Result<Value, StepFailure> + Send + Sync,
{
    /// Creates a new closure-backed callable.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(StepInput) -> Result<Value, StepFailure> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").finish()
    }
}

#[async_trait]
impl<F> Callable for FnStep<F>
where
    F: Fn(StepInput) -> Result<Value, StepFailure> + Send + Sync,
{
    async fn call(&self, input: StepInput) -> Result<Value, StepFailure> {
        (self.func)(input)
    }
}

/// An async closure-backed callable.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, StepFailure>> + Send,
{
    func: F,
    _phantom: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, StepFailure>> + Send,
{
    /// Creates a new async closure-backed callable.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStep<F, Fut>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, StepFailure>> + Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnStep").finish()
    }
}

#[async_trait]
impl<F, Fut> Callable for AsyncFnStep<F, Fut>
where
    F: Fn(StepInput) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, StepFailure>> + Send,
{
    async fn call(&self, input: StepInput) -> Result<Value, StepFailure> {
        (self.func)(input).await
    }
}

/// Backoff schedule applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Constant delay: `base` before every retry.
    #[default]
    None,
    /// `base * k` before the k-th retry.
    Linear,
    /// `base * 2^(k-1)` before the k-th retry.
    Exponential,
}

impl Backoff {
    /// Computes the delay before the `attempt`-th retry (1-indexed).
    #[must_use]
    pub fn delay_for(self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::None => base,
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential => {
                base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        }
    }
}

/// Predicate over the marshalled step input.
pub type InputPredicate = Arc<dyn Fn(&StepInput) -> bool + Send + Sync>;

/// Predicate deciding whether a failure is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&StepFailure) -> bool + Send + Sync>;

/// Function deriving a cache key from the step input.
pub type CacheKeyFn = Arc<dyn Fn(&StepInput) -> String + Send + Sync>;

/// Per-step execution options.
///
/// Timeout enforcement is cooperative: the callable's future is
/// dropped when the deadline fires, so a callable blocking outside the
/// async runtime keeps running until its next await point.
#[derive(Clone)]
pub struct StepOptions {
    /// Deadline applied to each attempt.
    pub timeout: Option<Duration>,
    /// Retry attempts beyond the first invocation.
    pub retries: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Schedule shaping the delay as attempts accumulate.
    pub retry_backoff: Backoff,
    /// Gate deciding whether a given failure is retried.
    pub retry_if: Option<RetryPredicate>,
    /// The step runs only if this predicate passes (absent means run).
    pub only_if: Option<InputPredicate>,
    /// The step is skipped if this predicate passes.
    pub unless: Option<InputPredicate>,
    /// Whether the step participates in caching at all. `false`
    /// disables both reads and writes.
    pub cache: bool,
    /// Derives the cache key from the step input; the step name is
    /// used when absent.
    pub cache_key: Option<CacheKeyFn>,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 0,
            retry_delay: Duration::ZERO,
            retry_backoff: Backoff::None,
            retry_if: None,
            only_if: None,
            unless: None,
            cache: true,
            cache_key: None,
        }
    }
}

impl StepOptions {
    /// Creates options with defaults: no timeout, no retries, caching on.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the retry gate predicate.
    #[must_use]
    pub fn with_retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&StepFailure) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Runs the step only when the predicate passes.
    #[must_use]
    pub fn with_only_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&StepInput) -> bool + Send + Sync + 'static,
    {
        self.only_if = Some(Arc::new(predicate));
        self
    }

    /// Skips the step when the predicate passes.
    #[must_use]
    pub fn with_unless<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&StepInput) -> bool + Send + Sync + 'static,
    {
        self.unless = Some(Arc::new(predicate));
        self
    }

    /// Opts the step out of caching entirely.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    /// Derives cache keys from the step input instead of the step name.
    #[must_use]
    pub fn with_cache_key<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&StepInput) -> String + Send + Sync + 'static,
    {
        self.cache_key = Some(Arc::new(key_fn));
        self
    }
}

impl Debug for StepOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepOptions")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_backoff", &self.retry_backoff)
            .field("retry_if", &self.retry_if.is_some())
            .field("only_if", &self.only_if.is_some())
            .field("unless", &self.unless.is_some())
            .field("cache", &self.cache)
            .field("cache_key", &self.cache_key.is_some())
            .finish()
    }
}

/// An immutable named unit of computation with declared dependencies.
#[derive(Clone)]
pub struct Step {
    name: String,
    dependencies: Vec<String>,
    callable: Arc<dyn Callable>,
    options: StepOptions,
}

impl Step {
    /// Creates a new step.
    ///
    /// Dependency order is preserved; it determines nothing about
    /// execution order beyond the edges it declares, but keeps
    /// rendering and map-shaped inputs deterministic.
    pub fn new(
        name: impl Into<String>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
        callable: Arc<dyn Callable>,
        options: StepOptions,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            callable,
            options,
        }
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared dependencies, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the execution options.
    #[must_use]
    pub fn options(&self) -> &StepOptions {
        &self.options
    }

    /// Invokes the step's callable.
    pub async fn call(&self, input: StepInput) -> Result<Value, StepFailure> {
        self.callable.call(input).await
    }
}

impl Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("options", &self.options)
            .finish()
    }
}
