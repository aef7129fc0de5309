// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn spec_defaults() {
    let spec = JobSpec::new("emails", json!({"to": "a@b.c"}));
    assert_eq!(spec.topic, "emails");
    assert_eq!(spec.ttl, DEFAULT_JOB_TTL);
    assert_eq!(spec.attempts, 1);
    assert!(spec.remove_on_complete);
}

#[test]
fn spec_builder_chains() {
    let spec = JobSpec::new("emails", Value::Null)
        .ttl(Duration::from_secs(5))
        .attempts(4)
        .remove_on_complete(false);
    assert_eq!(spec.ttl, Duration::from_secs(5));
    assert_eq!(spec.attempts, 4);
    assert!(!spec.remove_on_complete);
}

#[tokio::test]
async fn handle_resolves_with_the_sent_outcome() {
    let (handle, tx) = JobHandle::channel("job-1");
    assert_eq!(handle.id, "job-1");
    tx.send(JobOutcome::Complete(json!("done"))).ok();
    match handle.outcome().await.unwrap() {
        JobOutcome::Complete(result) => assert_eq!(result, json!("done")),
        JobOutcome::Failed(error) => panic!("unexpected failure: {error}"),
    }
}

#[tokio::test]
async fn handle_errors_when_the_broker_drops_the_job() {
    let (handle, tx) = JobHandle::channel("job-2");
    drop(tx);
    assert!(matches!(handle.outcome().await, Err(BrokerError::Closed)));
}
