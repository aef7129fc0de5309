// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory job-queue broker
//!
//! Topics hold a backlog until a processor registers; registration drains
//! the backlog, so submit-then-process and process-then-submit both work.
//! Deliveries honor the at-least-once contract: a failed or timed-out
//! attempt is retried up to the job's `attempts`, then the job settles as
//! failed. Each job's handle is settled exactly once.

use async_trait::async_trait;
use sagaq_core::{
    BrokerError, DeliveredJob, JobHandle, JobOutcome, JobProcessor, JobSpec, QueueBroker,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Semaphore};

const DEFAULT_PREFIX: &str = "sagaq";

struct QueuedJob {
    id: String,
    topic: String,
    payload: Value,
    ttl: Duration,
    attempts: u32,
    outcome_tx: oneshot::Sender<JobOutcome>,
}

#[derive(Default)]
struct Topic {
    tx: Option<mpsc::UnboundedSender<QueuedJob>>,
    backlog: Vec<QueuedJob>,
}

struct InFlight {
    topic: String,
    started_at: Instant,
    ttl: Duration,
}

struct Inner {
    topics: Mutex<HashMap<String, Topic>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    prefix: RwLock<String>,
    next_id: AtomicU64,
}

/// In-memory broker backed by per-topic channels
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                prefix: RwLock::new(DEFAULT_PREFIX.to_string()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: QueuedJob, processor: Arc<dyn JobProcessor>, inner: Arc<Inner>) {
    inner
        .in_flight
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(
            job.id.clone(),
            InFlight {
                topic: job.topic.clone(),
                started_at: Instant::now(),
                ttl: job.ttl,
            },
        );

    let max_attempts = job.attempts.max(1);
    let mut attempt = 1;
    let outcome = loop {
        let delivered = DeliveredJob {
            id: job.id.clone(),
            topic: job.topic.clone(),
            payload: job.payload.clone(),
            attempt,
        };
        let attempt_result = if job.ttl.is_zero() {
            Ok(processor.process(delivered).await)
        } else {
            tokio::time::timeout(job.ttl, processor.process(delivered)).await
        };
        match attempt_result {
            Ok(Ok(result)) => break JobOutcome::Complete(result),
            Ok(Err(err)) if attempt >= max_attempts => break JobOutcome::Failed(err.0),
            Err(_) if attempt >= max_attempts => {
                break JobOutcome::Failed(format!("job {} exceeded its time budget", job.id))
            }
            Ok(Err(err)) => {
                tracing::debug!(job = %job.id, attempt, error = %err, "delivery failed, retrying");
            }
            Err(_) => {
                tracing::debug!(job = %job.id, attempt, "delivery timed out, retrying");
            }
        }
        attempt += 1;
    };

    inner
        .in_flight
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&job.id);
    let _ = job.outcome_tx.send(outcome);
}

#[async_trait]
impl QueueBroker for MemoryBroker {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, BrokerError> {
        let id = format!(
            "{}:{}",
            self.prefix(),
            self.inner.next_id.fetch_add(1, Ordering::SeqCst)
        );
        let (handle, outcome_tx) = JobHandle::channel(&id);
        let job = QueuedJob {
            id,
            topic: spec.topic.clone(),
            payload: spec.payload,
            ttl: spec.ttl,
            attempts: spec.attempts,
            outcome_tx,
        };

        let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
        let topic = topics.entry(spec.topic).or_default();
        match topic.tx.clone() {
            Some(tx) => {
                if let Err(err) = tx.send(job) {
                    // processor loop ended; back to the backlog
                    topic.tx = None;
                    topic.backlog.push(err.0);
                }
            }
            None => topic.backlog.push(job),
        }
        Ok(handle)
    }

    async fn process(
        &self,
        topic: &str,
        concurrency: usize,
        processor: Arc<dyn JobProcessor>,
    ) -> Result<(), BrokerError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut topics = self.inner.topics.lock().unwrap_or_else(|e| e.into_inner());
            let entry = topics.entry(topic.to_string()).or_default();
            for job in entry.backlog.drain(..) {
                let _ = tx.send(job);
            }
            entry.tx = Some(tx);
        }

        let inner = Arc::clone(&self.inner);
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let processor = Arc::clone(&processor);
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(job, processor, inner).await;
                });
            }
        });
        Ok(())
    }

    fn watch_stuck_jobs(&self, interval: Duration) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                {
                    let in_flight = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                    for (id, info) in in_flight.iter() {
                        if !info.ttl.is_zero() && info.started_at.elapsed() > info.ttl {
                            tracing::warn!(
                                job = %id,
                                topic = %info.topic,
                                "job running past its time budget"
                            );
                        }
                    }
                }

                // topics that gained a processor after jobs backed up
                let mut topics = inner.topics.lock().unwrap_or_else(|e| e.into_inner());
                for (name, topic) in topics.iter_mut() {
                    let Some(tx) = topic.tx.clone() else { continue };
                    if topic.backlog.is_empty() {
                        continue;
                    }
                    tracing::warn!(
                        topic = %name,
                        count = topic.backlog.len(),
                        "redelivering stalled jobs"
                    );
                    let backlog = std::mem::take(&mut topic.backlog);
                    for job in backlog {
                        if let Err(err) = tx.send(job) {
                            topic.tx = None;
                            topic.backlog.push(err.0);
                        }
                    }
                }
            }
        });
    }

    fn prefix(&self) -> String {
        self.inner
            .prefix
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_prefix(&self, prefix: &str) {
        *self.inner.prefix.write().unwrap_or_else(|e| e.into_inner()) = prefix.to_string();
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
