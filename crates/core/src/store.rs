// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared key-value store contract
//!
//! The engine persists two kinds of keys: a job's outcome at
//! `{type}:{uniq_field}:{value}` and one step record hash per step at
//! `{sid}:{idx}`. Writes that must be observed together (status + result,
//! status + error, a whole chain's records) go through `multi`, which the
//! backend applies atomically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("key holds the wrong value kind: {0}")]
    WrongKind(String),
}

/// One command in an atomic batch
#[derive(Debug, Clone)]
pub enum StoreOp {
    Set {
        key: String,
        value: String,
    },
    SetEx {
        key: String,
        ttl: Duration,
        value: String,
    },
    Del {
        key: String,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HSetAll {
        key: String,
        fields: HashMap<String, String>,
    },
}

/// Adapter over the shared durable key-value store
#[async_trait]
pub trait StoreAdapter: Clone + Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Set with an expiry.
    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Write all fields of a hash record.
    async fn hset_all(&self, key: &str, fields: HashMap<String, String>)
        -> Result<(), StoreError>;

    /// Read all fields of a hash record. A missing key reads as empty.
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Apply a batch atomically: either every op lands or none does.
    async fn multi(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    /// Clear the whole keyspace. Test support.
    async fn flush(&self) -> Result<(), StoreError>;
}

/// Key of the persisted record for step `idx` of series `sid`.
pub fn step_key(sid: &str, idx: usize) -> String {
    format!("{sid}:{idx}")
}

/// Key a job's outcome is persisted under.
pub fn outcome_key(job_type: &str, uniq_field: &str, value: &str) -> String {
    format!("{job_type}:{uniq_field}:{value}")
}
