//! Shared per-step runtime: input marshalling, cache integration,
//! conditional evaluation, and the retry/timeout loop.

use crate::cache::{CacheStore, CachedResult};
use crate::core::StepResult;
use crate::errors::StepFailure;
use crate::step::{Step, StepInput};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Builds the input for a step from upstream outputs.
///
/// No dependencies take the run's initial input when present; exactly
/// one dependency is passed positionally; several are passed as a map
/// keyed by dependency name. A skipped dependency contributes
/// `Value::Null` for its key.
pub(crate) fn marshal_input(
    step: &Step,
    outputs: &HashMap<String, Value>,
    initial_input: Option<&Value>,
) -> StepInput {
    match step.dependencies() {
        [] => initial_input.map_or(StepInput::None, |value| StepInput::One(value.clone())),
        [dep] => StepInput::One(outputs.get(dep).cloned().unwrap_or(Value::Null)),
        deps => StepInput::Many(
            deps.iter()
                .map(|dep| {
                    (
                        dep.clone(),
                        outputs.get(dep).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect(),
        ),
    }
}

/// Runs one step to a terminal [`StepResult`].
///
/// The same marshalled input is handed to the callable and to the
/// `only_if`, `unless`, and `cache_key` functions.
pub(crate) async fn run_step(
    step: &Step,
    input: StepInput,
    cache: Option<&Arc<dyn CacheStore>>,
    force: bool,
) -> StepResult {
    let options = step.options();
    let store = if options.cache { cache } else { None };

    // The key function runs even under force, so a forced run writes
    // its fresh result under the input-derived key.
    let cache_key = store.map(|_| {
        options
            .cache_key
            .as_ref()
            .map_or_else(|| step.name().to_string(), |key_fn| key_fn(&input))
    });

    if !force {
        if let (Some(store), Some(key)) = (store, cache_key.as_deref()) {
            if let Some(entry) = store.read(key).await {
                if entry.is_current() {
                    debug!(step = step.name(), key, "cache hit");
                    let output = (!entry.skipped).then_some(entry.output);
                    return StepResult::cached(step.name(), output, entry.skipped);
                }
                warn!(step = step.name(), key, "stale cache entry version, recomputing");
            }
        }
    }

    let if_value = options.only_if.as_ref().map_or(true, |p| p(&input));
    let unless_value = options.unless.as_ref().map_or(false, |p| p(&input));
    if !if_value || unless_value {
        let now = Utc::now();
        debug!(step = step.name(), "conditions not met, skipping");
        if let Some(store) = store {
            // Skips persist under the step name: no input is
            // semantically meaningful for a skip decision.
            store.write(step.name(), CachedResult::skipped()).await;
        }
        return StepResult::skipped(step.name(), now, Utc::now());
    }

    let started_at = Utc::now();
    let run_start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let attempt_start = Instant::now();
        let outcome = match options.timeout {
            Some(limit) => match timeout(limit, step.call(input.clone())).await {
                Ok(result) => result,
                Err(_) => Err(StepFailure::Timeout {
                    limit,
                    elapsed: attempt_start.elapsed(),
                }),
            },
            None => step.call(input.clone()).await,
        };

        match outcome {
            Ok(output) => {
                let finished_at = Utc::now();
                if let (Some(store), Some(key)) = (store, cache_key.as_deref()) {
                    store.write(key, CachedResult::success(output.clone())).await;
                }
                return StepResult::success(
                    step.name(),
                    output,
                    run_start.elapsed(),
                    started_at,
                    finished_at,
                    attempt,
                );
            }
            Err(failure) => {
                let retryable = attempt < options.retries
                    && options.retry_if.as_ref().map_or(true, |p| p(&failure));
                if retryable {
                    attempt += 1;
                    let delay = options.retry_backoff.delay_for(options.retry_delay, attempt);
                    debug!(
                        step = step.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "retrying after failure"
                    );
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    continue;
                }

                let finished_at = Utc::now();
                warn!(step = step.name(), retries = attempt, error = %failure, "step failed");
                return if failure.is_timeout() {
                    StepResult::timed_out(
                        step.name(),
                        failure,
                        run_start.elapsed(),
                        started_at,
                        finished_at,
                        attempt,
                    )
                } else {
                    StepResult::failure(
                        step.name(),
                        failure,
                        run_start.elapsed(),
                        started_at,
                        finished_at,
                        attempt,
                    )
                };
            }
        }
    }
}
