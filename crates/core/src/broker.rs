// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-queue broker contract
//!
//! The broker delivers jobs at least once. A processor is registered per
//! topic and must resolve exactly once per delivery; the broker retries a
//! failed delivery up to the job's `attempts` and enforces its `ttl` per
//! attempt, then settles the job. Each submitted job carries a
//! [`JobHandle`] that resolves exactly once with the terminal outcome.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Default job time budget (5 minutes)
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(300);

/// Errors from broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to save job: {0}")]
    SaveFailed(String),
    #[error("broker shut down")]
    Closed,
}

/// Delivery failure reported by a processor
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProcessError(pub String);

/// A job to enqueue, built chainably
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub topic: String,
    pub payload: Value,
    pub ttl: Duration,
    pub attempts: u32,
    pub remove_on_complete: bool,
}

impl JobSpec {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            ttl: DEFAULT_JOB_TTL,
            attempts: 1,
            remove_on_complete: true,
        }
    }

    /// Time budget per delivery attempt.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Delivery attempts before the job is failed.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }
}

/// One delivery of a job to a processor
#[derive(Debug, Clone)]
pub struct DeliveredJob {
    pub id: String,
    pub topic: String,
    pub payload: Value,
    /// 1-based attempt counter
    pub attempt: u32,
}

/// Terminal outcome of a job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Complete(Value),
    Failed(String),
}

/// Resolves exactly once with the job's terminal outcome
#[derive(Debug)]
pub struct JobHandle {
    pub id: String,
    outcome: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    /// Create a handle and the sender the broker settles it with.
    pub fn channel(id: impl Into<String>) -> (Self, oneshot::Sender<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                id: id.into(),
                outcome: rx,
            },
            tx,
        )
    }

    /// Await the job's terminal outcome.
    pub async fn outcome(self) -> Result<JobOutcome, BrokerError> {
        self.outcome.await.map_err(|_| BrokerError::Closed)
    }
}

/// Handles deliveries for one topic
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: DeliveredJob) -> Result<Value, ProcessError>;
}

/// Adapter over the distributed job queue
#[async_trait]
pub trait QueueBroker: Clone + Send + Sync + 'static {
    /// Enqueue a job. Resolves once the job is durably accepted.
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, BrokerError>;

    /// Register the processor for a topic with the given concurrency.
    /// Jobs submitted before registration are delivered once it happens.
    async fn process(
        &self,
        topic: &str,
        concurrency: usize,
        processor: Arc<dyn JobProcessor>,
    ) -> Result<(), BrokerError>;

    /// Start the stalled-job reaper.
    fn watch_stuck_jobs(&self, interval: Duration);

    /// Current queue namespace prefix.
    fn prefix(&self) -> String;

    /// Swap the queue namespace prefix. Callers doing a scoped swap must
    /// restore the prior prefix themselves.
    fn set_prefix(&self, prefix: &str);
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
