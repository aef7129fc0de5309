//! A job type with no tasks completes with null and never creates step
//! records or a stored result.

use crate::prelude::{world, RECV_BUDGET};
use sagaq_core::StoreAdapter;
use sagaq_engine::{JobEvent, JobOptions};
use serde_json::{json, Value};
use tokio::time::timeout;

#[tokio::test]
async fn empty_job_type_is_a_no_op_success() {
    let w = world();
    let job_id = w
        .manager
        .add_job("foo", json!({"id": "x-1"}), vec![], JobOptions::default())
        .await
        .unwrap();

    let mut events = w.manager.subscribe();
    w.manager.run("foo", 1).await.unwrap();

    match timeout(RECV_BUDGET, events.recv()).await.unwrap() {
        Some(JobEvent::Complete { key, result }) => {
            assert_eq!(key, "foo:id:x-1");
            assert_eq!(result, Value::Null);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // the outcome key still holds the saved token, never a result
    let stored = w.store.get("foo:id:x-1").await.unwrap();
    assert_eq!(stored.as_deref(), Some(job_id.as_str()));

    // no step records were created
    assert!(w.store.hget_all("x-1:0").await.unwrap().is_empty());
}
