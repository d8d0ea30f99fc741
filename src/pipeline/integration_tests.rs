//! End-to-end pipeline scenarios.

use super::{define, RunOptions};
use crate::cache::{CacheChoice, CacheStore, FileStore, MemoryStore};
use crate::errors::{FlowdagError, StepFailure};
use crate::step::{Backoff, StepOptions};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[tokio::test]
async fn test_linear_pipeline() {
    let pipeline = define("etl", |b| {
        b.step_fn("fetch", &[], StepOptions::new(), |_| Ok(json!([1, 2, 3])))?;
        b.step_fn("transform", &["fetch"], StepOptions::new(), |input| {
            let doubled: Vec<i64> = input
                .as_one()
                .and_then(Value::as_array)
                .map(|xs| xs.iter().filter_map(Value::as_i64).map(|x| x * 2).collect())
                .unwrap_or_default();
            Ok(json!(doubled))
        })?;
        b.step_fn("load", &["transform"], StepOptions::new(), |input| {
            let sum: i64 = input
                .as_one()
                .and_then(Value::as_array)
                .map(|xs| xs.iter().filter_map(Value::as_i64).sum())
                .unwrap_or(0);
            Ok(json!(sum))
        })?;
        Ok(())
    })
    .unwrap();

    let results = pipeline.run(RunOptions::new()).await.unwrap();

    assert!(results.success());
    assert_eq!(results.get("transform").unwrap().output, Some(json!([2, 4, 6])));
    assert_eq!(results.get("load").unwrap().output, Some(json!(12)));
    assert!(
        results.get("transform").unwrap().finished_at
            <= results.get("load").unwrap().started_at
    );
}

#[tokio::test]
async fn test_diamond_parallel() {
    let pipeline = define("diamond", |b| {
        b.step_fn("source", &[], StepOptions::new(), |_| Ok(json!(10)))?;
        b.step_fn("path_a", &["source"], StepOptions::new(), |input| {
            Ok(json!(input.as_one().and_then(Value::as_i64).unwrap_or(0) + 1))
        })?;
        b.step_fn("path_b", &["source"], StepOptions::new(), |input| {
            Ok(json!(input.as_one().and_then(Value::as_i64).unwrap_or(0) + 2))
        })?;
        b.step_fn("merge", &["path_a", "path_b"], StepOptions::new(), |input| {
            let a = input.get("path_a").and_then(Value::as_i64).unwrap_or(0);
            let b = input.get("path_b").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        })?;
        Ok(())
    })
    .unwrap();

    // path_a and path_b share a level
    let levels = pipeline.dag().levels().unwrap();
    let middle: Vec<_> = levels[1].iter().map(|s| s.name()).collect();
    assert_eq!(middle, vec!["path_a", "path_b"]);

    let results = pipeline.run(RunOptions::new().parallel()).await.unwrap();
    assert_eq!(results.get("merge").unwrap().output, Some(json!(23)));

    // the sequential strategy agrees
    let sequential = pipeline.run(RunOptions::new()).await.unwrap();
    assert_eq!(sequential.get("merge").unwrap().output, Some(json!(23)));
}

#[tokio::test]
async fn test_cycle_rejected() {
    let result = define("cyclic", |b| {
        b.step_fn("a", &["b"], StepOptions::new(), |_| Ok(json!(())))?;
        b.step_fn("b", &["a"], StepOptions::new(), |_| Ok(json!(())))?;
        Ok(())
    });

    match result {
        Err(FlowdagError::Cycle(err)) => {
            assert!(!err.cycle_path.is_empty());
        }
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_dependencies_rejected() {
    let result = define("incomplete", |b| {
        b.step_fn(
            "process",
            &["missing1", "missing2", "missing3"],
            StepOptions::new(),
            |_| Ok(json!(())),
        )?;
        Ok(())
    });

    match result {
        Err(FlowdagError::MissingDependency(err)) => {
            assert_eq!(err.step, "process");
            assert_eq!(err.dependency, "missing1");
        }
        other => panic!("expected MissingDependency, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_with_exponential_backoff() {
    let attempts = Arc::new(AtomicU32::new(0));
    let pipeline = define("flaky", |b| {
        let attempts = Arc::clone(&attempts);
        b.step_fn(
            "eventually",
            &[],
            StepOptions::new()
                .with_retries(2)
                .with_retry_delay(Duration::from_millis(20))
                .with_backoff(Backoff::Exponential),
            move |_| {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StepFailure::new("transient"))
                } else {
                    Ok(json!("third attempt"))
                }
            },
        )?;
        Ok(())
    })
    .unwrap();

    let start = Instant::now();
    let results = pipeline.run(RunOptions::new()).await.unwrap();
    let elapsed = start.elapsed();

    let step = results.get("eventually").unwrap();
    assert!(step.is_success());
    assert_eq!(step.retries, 2);
    assert_eq!(step.output, Some(json!("third attempt")));
    // waits of ~20ms then ~40ms
    assert!(elapsed >= Duration::from_millis(60), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_retries_exhausted_reports_configured_count() {
    let pipeline = define("doomed", |b| {
        b.step_fn(
            "always_fails",
            &[],
            StepOptions::new().with_retries(2),
            |_| Err(StepFailure::new("permanent")),
        )?;
        Ok(())
    })
    .unwrap();

    let err = pipeline.run(RunOptions::new()).await.unwrap_err();
    match err {
        FlowdagError::Step(step_err) => {
            assert_eq!(step_err.step, "always_fails");
            assert_eq!(step_err.partial.get("always_fails").unwrap().retries, 2);
        }
        other => panic!("expected Step error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_then_retry_composition() {
    let attempts = Arc::new(AtomicU32::new(0));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());

    let pipeline = define("slow-start", |b| {
        let attempts = Arc::clone(&attempts);
        b.step(
            "warms_up",
            &[],
            Arc::new(crate::step::AsyncFnStep::new(move |_input| {
                let first = attempts.fetch_add(1, Ordering::SeqCst) == 0;
                async move {
                    if first {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                    Ok(json!("fast"))
                }
            })),
            StepOptions::new()
                .with_timeout(Duration::from_millis(50))
                .with_retries(1),
        )?;
        Ok(())
    })
    .unwrap();

    let results = pipeline
        .run(RunOptions::new().with_cache(CacheChoice::Store(Arc::clone(&store))))
        .await
        .unwrap();

    let step = results.get("warms_up").unwrap();
    assert!(step.is_success());
    assert_eq!(step.output, Some(json!("fast")));
    assert_eq!(step.retries, 1);
    // only the final success was cached
    assert_eq!(store.read("warms_up").await.unwrap().output, json!("fast"));
}

#[tokio::test]
async fn test_skip_propagates_nil_downstream() {
    let pipeline = define("conditional", |b| {
        b.step_fn(
            "maybe_skip",
            &[],
            StepOptions::new().with_only_if(|_| false),
            |_| Ok(json!("executed")),
        )?;
        b.step_fn("after_skip", &["maybe_skip"], StepOptions::new(), |input| {
            let upstream = input.as_one().cloned().unwrap_or(Value::Null);
            Ok(json!(if upstream.is_null() { "skipped" } else { "got" }))
        })?;
        Ok(())
    })
    .unwrap();

    let results = pipeline.run(RunOptions::new()).await.unwrap();

    assert!(results.get("maybe_skip").unwrap().is_skipped());
    assert_eq!(results.get("after_skip").unwrap().output, Some(json!("skipped")));
    assert!(results.success());
}

#[tokio::test]
async fn test_resume_after_failure_with_persistent_cache() {
    let dir = TempDir::new().unwrap();
    let first_calls = Arc::new(AtomicU32::new(0));
    let second_calls = Arc::new(AtomicU32::new(0));

    let pipeline = define("resumable", |b| {
        let first_calls = Arc::clone(&first_calls);
        let second_calls = Arc::clone(&second_calls);
        b.step_fn("first", &[], StepOptions::new(), move |_| {
            first_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!("r1"))
        })?;
        b.step_fn("second", &["first"], StepOptions::new(), move |_| {
            if second_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StepFailure::new("cold start"))
            } else {
                Ok(json!("r2"))
            }
        })?;
        Ok(())
    })
    .unwrap();

    let options = || RunOptions::new().with_cache(dir.path());

    // run 1 fails at `second`; `first` landed in the cache
    let err = pipeline.run(options()).await.unwrap_err();
    assert!(matches!(err, FlowdagError::Step(ref e) if e.step == "second"));

    let store = FileStore::new(dir.path()).unwrap();
    assert!(store.exists("first").await);
    assert!(!store.exists("second").await);

    // run 2 resumes: `first` comes from the cache, `second` succeeds
    let results = pipeline.run(options()).await.unwrap();
    assert!(results.success());
    assert_eq!(results.get("second").unwrap().output, Some(json!("r2")));
    assert!(results.get("first").unwrap().from_cache);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_soundness_across_runs() {
    let calls = Arc::new(AtomicU32::new(0));
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());

    let pipeline = define("cached", |b| {
        let calls = Arc::clone(&calls);
        b.step_fn("compute", &[], StepOptions::new(), move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(1234))
        })?;
        Ok(())
    })
    .unwrap();

    let options = || RunOptions::new().with_cache(CacheChoice::Store(Arc::clone(&store)));

    let run1 = pipeline.run(options()).await.unwrap();
    assert!(!run1.get("compute").unwrap().from_cache);

    let run2 = pipeline.run(options()).await.unwrap();
    assert!(run2.get("compute").unwrap().from_cache);
    assert_eq!(run2.get("compute").unwrap().output, Some(json!(1234)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // force bypasses reads but repopulates
    let run3 = pipeline.run(options().force_refresh()).await.unwrap();
    assert!(!run3.get("compute").unwrap().from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.read("compute").await.unwrap().output, json!(1234));
}

#[tokio::test]
async fn test_parallel_level_soundness() {
    let pipeline = define("layers", |b| {
        for name in ["r1", "r2"] {
            b.step_fn(name, &[], StepOptions::new(), |_| Ok(json!("root")))?;
        }
        b.step_fn("mid", &["r1", "r2"], StepOptions::new(), |_| Ok(json!("mid")))?;
        b.step_fn("leaf", &["mid"], StepOptions::new(), |_| Ok(json!("leaf")))?;
        Ok(())
    })
    .unwrap();

    let results = pipeline
        .run(RunOptions::new().parallel().with_max_threads(2))
        .await
        .unwrap();

    assert!(results.success());
    let mid = results.get("mid").unwrap();
    for root in ["r1", "r2"] {
        assert!(results.get(root).unwrap().finished_at <= mid.started_at);
    }
    assert!(mid.finished_at <= results.get("leaf").unwrap().started_at);
}

#[tokio::test]
async fn test_sequential_runs_are_deterministic() {
    let build = || {
        define("det", |b| {
            b.step_fn("a", &[], StepOptions::new(), |_| Ok(json!(1)))?;
            b.step_fn("c", &["a"], StepOptions::new(), |_| Ok(json!(3)))?;
            b.step_fn("b", &["a"], StepOptions::new(), |_| Ok(json!(2)))?;
            Ok(())
        })
        .unwrap()
    };

    let run1 = build().run(RunOptions::new()).await.unwrap();
    let run2 = build().run(RunOptions::new()).await.unwrap();

    let order1: Vec<_> = run1.steps().iter().map(|r| r.name.clone()).collect();
    let order2: Vec<_> = run2.steps().iter().map(|r| r.name.clone()).collect();
    assert_eq!(order1, order2);
    assert_eq!(order1, vec!["a", "c", "b"]);

    for result in run1.steps() {
        assert_eq!(result.output, run2.get(&result.name).unwrap().output);
    }
}

#[tokio::test]
async fn test_mermaid_rendering_from_pipeline() {
    let pipeline = define("render", |b| {
        b.step_fn("fetch_data", &[], StepOptions::new(), |_| Ok(json!(())))?;
        b.step_fn("process", &["fetch_data"], StepOptions::new(), |_| Ok(json!(())))?;
        b.step_fn("audit", &[], StepOptions::new(), |_| Ok(json!(())))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        pipeline.to_mermaid(),
        "graph TD\n  fetch_data --> process\n  audit\n"
    );
}
