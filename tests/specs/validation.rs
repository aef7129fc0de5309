//! Malformed calls fail immediately, before any state is touched.

use crate::prelude::world;
use sagaq_engine::{EngineError, JobOptions};
use serde_json::json;

#[tokio::test]
async fn add_job_without_a_type_fails_fast() {
    let w = world();
    let err = w
        .manager
        .add_job("", json!({}), vec![], JobOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn add_job_without_the_unique_field_fails_fast() {
    let w = world();
    let err = w
        .manager
        .add_job("bar", json!({"name": "anonymous"}), vec![], JobOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn run_without_a_type_fails_fast() {
    let w = world();
    let err = w.manager.run("", 1).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn add_tasks_for_an_unknown_type_fails_fast() {
    let w = world();
    let err = w.manager.add_tasks("never-registered", vec![]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}
