//! A three-step chain where step 1 fails: the completed step 0 is
//! compensated, the never-reached step 2 is not, and compensation runs
//! in descending index order.

use crate::prelude::{world, RECV_BUDGET};
use sagaq_core::{StoreAdapter, TaskTemplate};
use sagaq_engine::{JobEvent, JobOptions, TaskError};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::time::timeout;

#[tokio::test]
async fn partial_failure_unwinds_completed_steps() {
    let w = world();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    for (path, outcome) in [
        ("tasks/reserve", Ok(json!("reserved"))),
        ("tasks/charge", Err(TaskError::new("card declined"))),
        ("tasks/ship", Ok(json!("shipped"))),
        ("rewind/release", Ok(json!("released"))),
        ("rewind/refund", Ok(json!("refunded"))),
    ] {
        let log = Arc::clone(&log);
        let name = path.to_string();
        w.manager.registry().register_fn(path, move |_, _| {
            log.lock().unwrap().push(name.clone());
            outcome.clone()
        });
    }

    let tasks = vec![
        TaskTemplate::new("reserve", "tasks/reserve").rewind_path("rewind/release"),
        TaskTemplate::new("charge", "tasks/charge").rewind_path("rewind/refund"),
        TaskTemplate::new("ship", "tasks/ship").rewind_path("rewind/ship"),
    ];
    w.manager
        .add_job("order", json!({"id": "o-3"}), tasks, JobOptions::default())
        .await
        .unwrap();

    let mut events = w.manager.subscribe();
    w.manager.run("order", 1).await.unwrap();

    // the job fails, then its compensation chain settles
    let mut saw_failed = false;
    let mut saw_comp_finished = false;
    while !(saw_failed && saw_comp_finished) {
        match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
            Some(JobEvent::Failed { key, error }) => {
                assert_eq!(key, "order:id:o-3");
                assert!(error.contains("card declined"));
                saw_failed = true;
            }
            Some(JobEvent::CompensationStarted { sid }) => assert_eq!(sid, "o-3:rewind"),
            Some(JobEvent::CompensationFinished { sid, .. }) => {
                assert_eq!(sid, "o-3:rewind");
                saw_comp_finished = true;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(
        log.lock().unwrap().clone(),
        vec![
            "tasks/reserve",
            "tasks/charge",
            "rewind/refund",
            "rewind/release"
        ]
    );

    // forward records survive the abort for diagnostics
    let step1 = w.store.hget_all("o-3:1").await.unwrap();
    assert_eq!(step1.get("status").map(String::as_str), Some("failed"));
    // step 2 never got a status
    assert!(!w
        .store
        .hget_all("o-3:2")
        .await
        .unwrap()
        .contains_key("status"));
}
