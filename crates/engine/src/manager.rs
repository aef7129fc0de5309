// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager
//!
//! Owns the job-type → task-template catalog, accepts jobs, and persists
//! their outcomes under a caller-supplied unique key. A job's outcome key
//! moves through three shapes: empty string while the job is being saved
//! (the claim), the queue job id once the broker accepted it, and the
//! serialized final result once the chain settles.

use crate::error::EngineError;
use crate::events::{EventFanout, JobEvent};
use crate::registry::HandlerRegistry;
use crate::series::{ExecuteOptions, TaskSeries};
use async_trait::async_trait;
use sagaq_core::serialize;
use sagaq_core::{
    outcome_key, step_key, DeliveredJob, IdGen, JobOutcome, JobProcessor, JobSpec, ProcessError,
    QueueBroker, StepRecord, StoreAdapter, StoreOp, TaskTemplate, UuidIdGen,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default unique field looked up in job data
pub const DEFAULT_UNIQ_FIELD: &str = "id";
/// Default time budget for a top-level job (5 minutes)
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(5 * 60);
/// Default expiry for a stored job result (3 days)
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(3600 * 24 * 3);
/// Default stalled-job reaper interval
pub const DEFAULT_STUCK_INTERVAL: Duration = Duration::from_secs(60);
/// Queue namespace the stalled-job reaper scans
const STUCK_QUEUE_PREFIX: &str = "q";

/// Per-job options for [`JobManager::add_job`]
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Field of the job data used as the unique key (and series id).
    pub uniq_field: String,
    /// Time budget for the top-level job.
    pub job_ttl: Duration,
    /// How long the stored result lives; `None` keeps it forever.
    pub result_ttl: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            uniq_field: DEFAULT_UNIQ_FIELD.to_string(),
            job_ttl: DEFAULT_JOB_TTL,
            result_ttl: Some(DEFAULT_RESULT_TTL),
        }
    }
}

/// Per-type configuration recorded by `add_job`, consulted by `run`
#[derive(Debug, Clone)]
struct JobConfig {
    uniq_field: String,
}

/// Registers job types and drives their task chains
pub struct JobManager<S: StoreAdapter, B: QueueBroker, G: IdGen = UuidIdGen> {
    store: S,
    broker: B,
    registry: HandlerRegistry,
    templates: Arc<RwLock<HashMap<String, Vec<TaskTemplate>>>>,
    configs: Arc<RwLock<HashMap<String, JobConfig>>>,
    events: EventFanout,
    id_gen: G,
    debug: bool,
}

impl<S: StoreAdapter, B: QueueBroker> JobManager<S, B, UuidIdGen> {
    pub fn new(store: S, broker: B, registry: HandlerRegistry) -> Self {
        Self::with_id_gen(store, broker, registry, UuidIdGen)
    }
}

impl<S: StoreAdapter, B: QueueBroker, G: IdGen> JobManager<S, B, G> {
    pub fn with_id_gen(store: S, broker: B, registry: HandlerRegistry, id_gen: G) -> Self {
        Self {
            store,
            broker,
            registry,
            templates: Arc::new(RwLock::new(HashMap::new())),
            configs: Arc::new(RwLock::new(HashMap::new())),
            events: EventFanout::new(),
            id_gen,
            debug: false,
        }
    }

    /// Keep finished queue jobs around for inspection.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// A task series sharing this manager's store, broker, and events.
    pub fn series(&self) -> TaskSeries<S, B> {
        TaskSeries::new(
            self.store.clone(),
            self.broker.clone(),
            self.registry.clone(),
            self.events.clone(),
        )
    }

    /// Accept a job: claim its outcome key, register its task chain, and
    /// enqueue the top-level queue job. Resolves with the queue job id once
    /// the job is durably saved, not once it finishes; completion is
    /// observed through events and the stored outcome.
    pub async fn add_job(
        &self,
        job_type: &str,
        data: Value,
        tasks: Vec<TaskTemplate>,
        opts: JobOptions,
    ) -> Result<String, EngineError> {
        if job_type.is_empty() {
            return Err(EngineError::InvalidArgument(
                "job type must be a non-empty string".to_string(),
            ));
        }
        let uniq_value = data
            .get(&opts.uniq_field)
            .and_then(unique_key_value)
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "data[{}] can not be empty",
                    opts.uniq_field
                ))
            })?;
        let key = outcome_key(job_type, &opts.uniq_field, &uniq_value);

        // claim the outcome key before anything is enqueued
        self.store.set(&key, "").await?;

        self.configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                job_type.to_string(),
                JobConfig {
                    uniq_field: opts.uniq_field.clone(),
                },
            );
        self.templates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(job_type.to_string())
            .or_default();
        self.add_tasks(job_type, tasks)?;

        let spec = JobSpec::new(job_type, data)
            .ttl(opts.job_ttl)
            .remove_on_complete(!self.debug);
        let handle = match self.broker.submit(spec).await {
            Ok(handle) => handle,
            Err(err) => {
                // roll the claim back so the key can be reused
                self.store.del(&key).await?;
                return Err(EngineError::JobSave(err.to_string()));
            }
        };
        let job_id = handle.id.clone();
        self.store.set(&key, &job_id).await?;
        tracing::info!(job_type = %job_type, job = %job_id, "job saved");

        let store = self.store.clone();
        let events = self.events.clone();
        let result_ttl = opts.result_ttl;
        tokio::spawn(async move {
            match handle.outcome().await {
                Ok(JobOutcome::Complete(result)) => {
                    // a null result means the job type had no tasks; the
                    // saved token stays in place
                    if result != Value::Null {
                        let serialized = match &result {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        let write = match result_ttl {
                            Some(ttl) => store.setex(&key, ttl, &serialized).await,
                            None => store.set(&key, &serialized).await,
                        };
                        if let Err(err) = write {
                            tracing::error!(key = %key, error = %err, "failed to persist job result");
                        }
                    }
                    events.publish(JobEvent::Complete { key, result });
                }
                Ok(JobOutcome::Failed(error)) => {
                    tracing::error!(key = %key, error = %error, "job failed");
                    events.publish(JobEvent::Failed { key, error });
                }
                Err(_) => {
                    tracing::debug!(key = %key, "broker dropped the job outcome");
                }
            }
        });

        Ok(job_id)
    }

    /// Replace the task chain for a registered job type. Last write wins;
    /// concurrent callers race without ordering guarantees.
    pub fn add_tasks(
        &self,
        job_type: &str,
        tasks: Vec<TaskTemplate>,
    ) -> Result<(), EngineError> {
        if job_type.is_empty() {
            return Err(EngineError::InvalidArgument(
                "job type must be a non-empty string".to_string(),
            ));
        }
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        match templates.get_mut(job_type) {
            Some(slot) => {
                *slot = tasks;
                Ok(())
            }
            None => Err(EngineError::InvalidArgument(format!(
                "unknown job type: {job_type}"
            ))),
        }
    }

    /// The task chain registered for a job type, if any.
    pub fn list_tasks(&self, job_type: &str) -> Option<Vec<TaskTemplate>> {
        self.templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_type)
            .cloned()
    }

    pub fn remove_task(&self, _job_type: &str, _task_name: &str) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("remove_task"))
    }

    pub fn clone_job(&self) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("clone_job"))
    }

    pub fn to_json(&self) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("to_json"))
    }

    pub fn clean(&self) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("clean"))
    }

    /// Start the broker's stalled-job reaper against its fixed queue
    /// namespace, restoring the adapter's prior prefix afterward.
    pub fn watch_stuck_jobs(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(DEFAULT_STUCK_INTERVAL);
        let prior = self.broker.prefix();
        self.broker.set_prefix(STUCK_QUEUE_PREFIX);
        self.broker.watch_stuck_jobs(interval);
        self.broker.set_prefix(&prior);
    }

    /// Register the processor that turns delivered jobs of this type into
    /// task series. Returns once the processor is registered; each job's
    /// completion is observed asynchronously.
    pub async fn run(&self, job_type: &str, concurrency: usize) -> Result<(), EngineError> {
        if job_type.is_empty() {
            return Err(EngineError::InvalidArgument(
                "job type must be a non-empty string".to_string(),
            ));
        }
        let processor: Arc<dyn JobProcessor> = Arc::new(RunProcessor {
            series: self.series(),
            store: self.store.clone(),
            templates: Arc::clone(&self.templates),
            configs: Arc::clone(&self.configs),
            id_gen: self.id_gen.clone(),
            job_type: job_type.to_string(),
        });
        self.broker
            .process(job_type, concurrency.max(1), processor)
            .await?;
        Ok(())
    }
}

/// Turns one delivered job into a task series run
struct RunProcessor<S: StoreAdapter, B: QueueBroker, G: IdGen> {
    series: TaskSeries<S, B>,
    store: S,
    templates: Arc<RwLock<HashMap<String, Vec<TaskTemplate>>>>,
    configs: Arc<RwLock<HashMap<String, JobConfig>>>,
    id_gen: G,
    job_type: String,
}

#[async_trait]
impl<S: StoreAdapter, B: QueueBroker, G: IdGen> JobProcessor for RunProcessor<S, B, G> {
    async fn process(&self, job: DeliveredJob) -> Result<Value, ProcessError> {
        let tasks = self
            .templates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.job_type)
            .cloned();
        let tasks = match tasks {
            Some(tasks) if !tasks.is_empty() => tasks,
            _ => {
                // a job type with zero tasks is a no-op success
                tracing::debug!(job_type = %self.job_type, "no tasks registered, completing with null");
                return Ok(Value::Null);
            }
        };

        let uniq_field = self
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.job_type)
            .map(|config| config.uniq_field.clone())
            .unwrap_or_else(|| DEFAULT_UNIQ_FIELD.to_string());
        let sid = job
            .payload
            .get(&uniq_field)
            .and_then(unique_key_value)
            .unwrap_or_else(|| self.id_gen.next());

        // all-or-nothing snapshot of the chain
        let mut ops = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            ops.push(StoreOp::HSetAll {
                key: step_key(&sid, idx),
                fields: serialize::to_fields(&StepRecord::from_template(task, idx)),
            });
        }
        self.store
            .multi(ops)
            .await
            .map_err(|err| ProcessError(err.to_string()))?;
        tracing::info!(sid = %sid, steps = tasks.len(), "step records persisted, starting chain");

        self.series
            .execute(&sid, &tasks, ExecuteOptions::default())
            .await
            .map_err(|err| ProcessError(err.to_string()))
    }
}

/// A value usable as part of a key: a non-empty string or a number.
fn unique_key_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
