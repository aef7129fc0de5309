//! A two-task chain runs in order, threads results, and persists the
//! final outcome under the job's unique key.

use crate::prelude::{world, RECV_BUDGET};
use sagaq_core::{StoreAdapter, TaskTemplate};
use sagaq_engine::{JobEvent, JobOptions};
use serde_json::{json, Value};
use tokio::time::timeout;

#[tokio::test]
async fn chained_results_reach_the_stored_outcome() {
    let w = world();
    w.manager
        .registry()
        .register_fn("tasks/first", |param, previous| {
            assert!(previous.is_none());
            Ok(param["foo"].clone())
        });
    w.manager
        .registry()
        .register_fn("tasks/second", |param, previous| {
            let prev = previous.and_then(Value::as_str).unwrap_or_default();
            let baz = param["baz"].as_str().unwrap_or_default();
            Ok(json!(format!("{prev}{baz}")))
        });

    let tasks = vec![
        TaskTemplate::new("first", "tasks/first").param(json!({"foo": "bar"})),
        TaskTemplate::new("second", "tasks/second").param(json!({"baz": "qux"})),
    ];
    w.manager
        .add_job("checkout", json!({"id": "order-9"}), tasks, JobOptions::default())
        .await
        .unwrap();

    let mut events = w.manager.subscribe();
    w.manager.run("checkout", 1).await.unwrap();

    match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
        Some(JobEvent::Complete { key, result }) => {
            assert_eq!(key, "checkout:id:order-9");
            assert_eq!(result, json!("barqux"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // final stored outcome equals the last step's result
    let stored = w.store.get("checkout:id:order-9").await.unwrap();
    assert_eq!(stored.as_deref(), Some("barqux"));

    // exactly zero step records remain after the chain settles
    assert!(w.store.hget_all("order-9:0").await.unwrap().is_empty());
    assert!(w.store.hget_all("order-9:1").await.unwrap().is_empty());
}
