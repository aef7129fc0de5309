// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::TaskError;
use sagaq_adapters::{MemoryBroker, MemoryStore};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;

const RECV_BUDGET: Duration = Duration::from_secs(5);

struct Fixture {
    series: TaskSeries<MemoryStore, MemoryBroker>,
    store: MemoryStore,
    registry: HandlerRegistry,
    events: EventFanout,
    log: Arc<Mutex<Vec<String>>>,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let registry = HandlerRegistry::new();
    let events = EventFanout::new();
    let series = TaskSeries::new(
        store.clone(),
        MemoryBroker::new(),
        registry.clone(),
        events.clone(),
    );
    Fixture {
        series,
        store,
        registry,
        events,
        log: Arc::new(Mutex::new(Vec::new())),
    }
}

impl Fixture {
    /// Register a handler that logs its invocation and returns `result`.
    fn handler(&self, path: &str, result: Value) {
        let log = Arc::clone(&self.log);
        let name = path.to_string();
        self.registry.register_fn(path, move |_, _| {
            log.lock().unwrap().push(name.clone());
            Ok(result.clone())
        });
    }

    /// Register a handler that logs its invocation and fails.
    fn failing_handler(&self, path: &str, error: TaskError) {
        let log = Arc::clone(&self.log);
        let name = path.to_string();
        self.registry.register_fn(path, move |_, _| {
            log.lock().unwrap().push(name.clone());
            Err(error.clone())
        });
    }

    fn invocations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Persist the chain's records the way the job manager does before
    /// handing off to the series.
    async fn seed_records(&self, sid: &str, tasks: &[TaskTemplate]) {
        for (idx, task) in tasks.iter().enumerate() {
            self.store
                .hset_all(
                    &step_key(sid, idx),
                    serialize::to_fields(&StepRecord::from_template(task, idx)),
                )
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn empty_chain_resolves_null() {
    let fx = fixture();
    let result = fx
        .series
        .execute("s-empty", &[], ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn chain_threads_each_result_into_the_next_step() {
    let fx = fixture();
    fx.registry.register_fn("tasks/first", |param, previous| {
        assert!(previous.is_none());
        Ok(param["foo"].clone())
    });
    fx.registry.register_fn("tasks/second", |param, previous| {
        let prev = previous.and_then(Value::as_str).unwrap_or_default();
        let baz = param["baz"].as_str().unwrap_or_default();
        Ok(json!(format!("{prev}{baz}")))
    });

    let tasks = vec![
        TaskTemplate::new("first", "tasks/first").param(json!({"foo": "bar"})),
        TaskTemplate::new("second", "tasks/second").param(json!({"baz": "qux"})),
    ];
    fx.seed_records("s-chain", &tasks).await;

    let result = fx
        .series
        .execute("s-chain", &tasks, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!("barqux"));

    // a settled chain leaves no records behind
    assert!(fx.store.hget_all("s-chain:0").await.unwrap().is_empty());
    assert!(fx.store.hget_all("s-chain:1").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_step_freezes_the_chain_and_keeps_records() {
    let fx = fixture();
    fx.handler("tasks/ok", json!("r0"));
    fx.failing_handler("tasks/bad", TaskError::new("boom"));

    let tasks = vec![
        TaskTemplate::new("ok", "tasks/ok"),
        TaskTemplate::new("bad", "tasks/bad"),
        TaskTemplate::new("unreached", "tasks/ok"),
    ];
    fx.seed_records("s-fail", &tasks).await;

    let err = fx
        .series
        .execute("s-fail", &tasks, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::StepExecution { idx: 1, .. }
    ));

    let step0 = fx.store.hget_all("s-fail:0").await.unwrap();
    assert_eq!(step0.get("status").map(String::as_str), Some("complete"));
    assert_eq!(step0.get("result").map(String::as_str), Some("\"r0\""));

    let step1 = fx.store.hget_all("s-fail:1").await.unwrap();
    assert_eq!(step1.get("status").map(String::as_str), Some("failed"));
    assert_eq!(step1.get("error").map(String::as_str), Some("boom"));

    // step 2 was never dispatched
    let step2 = fx.store.hget_all("s-fail:2").await.unwrap();
    assert!(!step2.contains_key("status"));
}

#[tokio::test]
async fn completed_steps_are_not_re_executed_on_resume() {
    let fx = fixture();
    fx.handler("tasks/first", json!("should-not-run"));
    let log = Arc::clone(&fx.log);
    fx.registry.register_fn("tasks/second", move |_, previous| {
        log.lock().unwrap().push("tasks/second".to_string());
        // the stored result of step 0 flows through
        Ok(json!(format!(
            "resumed-after-{}",
            previous.and_then(Value::as_str).unwrap_or_default()
        )))
    });

    let tasks = vec![
        TaskTemplate::new("first", "tasks/first"),
        TaskTemplate::new("second", "tasks/second"),
    ];
    fx.seed_records("s-resume", &tasks).await;

    // step 0 already settled before this process took over
    fx.store
        .multi(vec![
            StoreOp::HSet {
                key: "s-resume:0".into(),
                field: "status".into(),
                value: "complete".into(),
            },
            StoreOp::HSet {
                key: "s-resume:0".into(),
                field: "result".into(),
                value: "\"r0\"".into(),
            },
        ])
        .await
        .unwrap();

    let result = fx
        .series
        .execute("s-resume", &tasks, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!("resumed-after-r0"));
    assert_eq!(fx.invocations(), vec!["tasks/second"]);
}

#[tokio::test]
async fn compensation_unwinds_most_recent_first() {
    let fx = fixture();
    fx.handler("tasks/t0", json!("r0"));
    fx.failing_handler(
        "tasks/t1",
        TaskError::with_partial("t1 exploded", json!("partial-output")),
    );
    fx.handler("tasks/t2", json!("r2"));
    let log = Arc::clone(&fx.log);
    fx.registry.register_fn("rewind/t1", move |_, previous| {
        // the failure's partial result seeds the unwind
        assert_eq!(previous, Some(&json!("partial-output")));
        log.lock().unwrap().push("rewind/t1".to_string());
        Ok(json!("undone-1"))
    });
    fx.handler("rewind/t0", json!("undone-0"));

    let tasks = vec![
        TaskTemplate::new("t0", "tasks/t0").rewind_path("rewind/t0"),
        TaskTemplate::new("t1", "tasks/t1").rewind_path("rewind/t1"),
        TaskTemplate::new("t2", "tasks/t2").rewind_path("rewind/t2"),
    ];
    fx.seed_records("s-comp", &tasks).await;

    let mut events = fx.events.subscribe();
    let err = fx
        .series
        .execute("s-comp", &tasks, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StepExecution { idx: 1, .. }));

    match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
        Some(JobEvent::CompensationStarted { sid }) => assert_eq!(sid, "s-comp:rewind"),
        other => panic!("unexpected event: {other:?}"),
    }
    match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
        Some(JobEvent::CompensationFinished { sid, result }) => {
            assert_eq!(sid, "s-comp:rewind");
            assert_eq!(result, json!("undone-0"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // forward t0 and t1 ran, then the rewinds in descending index order;
    // t2 was never reached from either direction
    assert_eq!(
        fx.invocations(),
        vec!["tasks/t0", "tasks/t1", "rewind/t1", "rewind/t0"]
    );

    // the settled compensation chain cleaned up its own records
    assert!(fx.store.hget_all("s-comp:rewind:0").await.unwrap().is_empty());
    assert!(fx.store.hget_all("s-comp:rewind:1").await.unwrap().is_empty());
}

#[tokio::test]
async fn steps_without_rewind_handlers_are_skipped_by_compensation() {
    let fx = fixture();
    fx.handler("tasks/t0", json!("r0"));
    fx.failing_handler("tasks/t1", TaskError::new("boom"));
    fx.handler("rewind/t0", json!("undone-0"));

    let tasks = vec![
        TaskTemplate::new("t0", "tasks/t0").rewind_path("rewind/t0"),
        TaskTemplate::new("t1", "tasks/t1"), // no rewind handler
    ];
    fx.seed_records("s-skip", &tasks).await;

    let mut events = fx.events.subscribe();
    fx.series
        .execute("s-skip", &tasks, ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        timeout(RECV_BUDGET, events.recv()).await.unwrap(),
        Some(JobEvent::CompensationStarted { .. })
    ));
    assert!(matches!(
        timeout(RECV_BUDGET, events.recv()).await.unwrap(),
        Some(JobEvent::CompensationFinished { .. })
    ));
    assert_eq!(
        fx.invocations(),
        vec!["tasks/t0", "tasks/t1", "rewind/t0"]
    );
}

#[tokio::test]
async fn failing_compensation_reports_and_keeps_its_records() {
    let fx = fixture();
    fx.failing_handler("tasks/t0", TaskError::new("forward boom"));
    fx.failing_handler("rewind/t0", TaskError::new("rewind boom"));

    let tasks = vec![TaskTemplate::new("t0", "tasks/t0").rewind_path("rewind/t0")];
    fx.seed_records("s-comp-fail", &tasks).await;

    let mut events = fx.events.subscribe();
    fx.series
        .execute("s-comp-fail", &tasks, ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        timeout(RECV_BUDGET, events.recv()).await.unwrap(),
        Some(JobEvent::CompensationStarted { .. })
    ));
    match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
        Some(JobEvent::CompensationFailed { sid, error }) => {
            assert_eq!(sid, "s-comp-fail:rewind");
            assert!(error.contains("rewind boom"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // a failed unwind keeps its diagnostic state
    let record = fx.store.hget_all("s-comp-fail:rewind:0").await.unwrap();
    assert_eq!(record.get("status").map(String::as_str), Some("failed"));

    // no compensation of the compensation
    assert_eq!(fx.invocations(), vec!["tasks/t0", "rewind/t0"]);
}

#[tokio::test]
async fn unregistered_handler_fails_before_any_step_runs() {
    let fx = fixture();
    let tasks = vec![TaskTemplate::new("ghost", "tasks/ghost")];
    fx.seed_records("s-ghost", &tasks).await;

    let err = fx
        .series
        .execute("s-ghost", &tasks, ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert!(fx.invocations().is_empty());
}
