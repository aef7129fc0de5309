// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sequential task series (the saga engine)
//!
//! A series owns the step records for its `sid` and drives them in order
//! over the broker: each series gets its own topic (the `sid`), step `k+1`
//! is enqueued only after step `k`'s status and result are persisted, and
//! a failed step freezes the chain and triggers compensation of every
//! earlier step that declares a rewind handler, most recent first.
//!
//! The broker delivers at least once, so the per-delivery processor checks
//! the persisted record before running a body: a step already recorded as
//! complete short-circuits to its stored result. That same check is what
//! lets a restarted process resume a chain from its records.

use crate::error::EngineError;
use crate::events::{EventFanout, JobEvent};
use crate::registry::{HandlerRegistry, TaskHandler};
use async_trait::async_trait;
use sagaq_core::serialize;
use sagaq_core::{
    step_key, DeliveredJob, JobOutcome, JobProcessor, JobSpec, ProcessError, QueueBroker,
    StepRecord, StepStatus, StoreAdapter, StoreOp, TaskTemplate,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Suffix appended to a series id to name its compensation series
const REWIND_SUFFIX: &str = ":rewind";

/// How a series should run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Run each step's rewind handler instead of its forward handler.
    pub rewind: bool,
    /// Input handed to the first step in place of a prior step's output.
    pub seed: Option<Value>,
}

/// Drives one chain of steps to completion or abort
#[derive(Clone)]
pub struct TaskSeries<S: StoreAdapter, B: QueueBroker> {
    store: S,
    broker: B,
    registry: HandlerRegistry,
    events: EventFanout,
}

impl<S: StoreAdapter, B: QueueBroker> TaskSeries<S, B> {
    pub fn new(store: S, broker: B, registry: HandlerRegistry, events: EventFanout) -> Self {
        Self {
            store,
            broker,
            registry,
            events,
        }
    }

    /// Execute a chain whose step records are already persisted.
    ///
    /// Registers the series' processor on its own topic, then submits one
    /// step at a time. Resolves with the last step's result once the chain
    /// finishes (and its records are deleted), or with the failing step's
    /// error. An empty chain resolves immediately with null.
    pub async fn execute(
        &self,
        sid: &str,
        tasks: &[TaskTemplate],
        opts: ExecuteOptions,
    ) -> Result<Value, EngineError> {
        if tasks.is_empty() {
            return Ok(Value::Null);
        }
        let handlers = self.bind_handlers(tasks, opts.rewind)?;
        let processor: Arc<dyn JobProcessor> = Arc::new(SeriesProcessor {
            series: self.clone(),
            sid: sid.to_string(),
            tasks: tasks.to_vec(),
            handlers,
            rewind: opts.rewind,
        });
        self.broker.process(sid, 1, processor).await?;
        self.drive(sid, tasks, opts.seed).await
    }

    /// Resolve every handler the chain will need, before any step runs.
    fn bind_handlers(
        &self,
        tasks: &[TaskTemplate],
        rewind: bool,
    ) -> Result<HashMap<String, Arc<dyn TaskHandler>>, EngineError> {
        let mut bound = HashMap::new();
        for task in tasks {
            let path = if rewind {
                task.rewind_path.as_deref().ok_or_else(|| {
                    EngineError::InvalidArgument(format!(
                        "task {} has no rewind handler",
                        task.name
                    ))
                })?
            } else {
                task.path.as_str()
            };
            let handler = self.registry.resolve(path).ok_or_else(|| {
                EngineError::InvalidArgument(format!("no handler registered for {path}"))
            })?;
            bound.insert(path.to_string(), handler);
        }
        Ok(bound)
    }

    /// The chaining protocol: submit step k, persist its outcome, then
    /// either carry its result into step k+1 or finish.
    async fn drive(
        &self,
        sid: &str,
        tasks: &[TaskTemplate],
        seed: Option<Value>,
    ) -> Result<Value, EngineError> {
        let mut record = StepRecord::from_template(&tasks[0], 0);
        record.pre_result = seed;
        loop {
            let idx = record.idx;
            let spec = JobSpec::new(sid, serde_json::to_value(&record)?)
                .ttl(record.ttl)
                .attempts(record.retry);
            let handle = self.broker.submit(spec).await?;

            match handle.outcome().await? {
                JobOutcome::Complete(result) => {
                    let key = step_key(sid, idx);
                    // status and result land together or not at all
                    self.store
                        .multi(vec![
                            StoreOp::HSet {
                                key: key.clone(),
                                field: "status".into(),
                                value: StepStatus::Complete.to_string(),
                            },
                            StoreOp::HSet {
                                key,
                                field: "result".into(),
                                value: result.to_string(),
                            },
                        ])
                        .await?;
                    tracing::info!(sid = %sid, idx, "step complete");

                    match self.next(sid, idx).await? {
                        Some(next) => record = next.with_pre_result(result),
                        None => {
                            // last step: a settled chain leaves no records
                            for i in (0..=idx).rev() {
                                self.store.del(&step_key(sid, i)).await?;
                            }
                            tracing::info!(sid = %sid, steps = idx + 1, "series complete");
                            return Ok(result);
                        }
                    }
                }
                JobOutcome::Failed(message) => {
                    let key = step_key(sid, idx);
                    // records are kept on failure for diagnostics and
                    // compensation lookups
                    self.store
                        .multi(vec![
                            StoreOp::HSet {
                                key: key.clone(),
                                field: "status".into(),
                                value: StepStatus::Failed.to_string(),
                            },
                            StoreOp::HSet {
                                key,
                                field: "error".into(),
                                value: message.clone(),
                            },
                        ])
                        .await?;
                    tracing::error!(sid = %sid, idx, error = %message, "step failed");
                    return Err(EngineError::StepExecution {
                        sid: sid.to_string(),
                        idx,
                        message,
                    });
                }
            }
        }
    }

    /// Read the record after `idx`. `None` means the chain is done.
    async fn next(&self, sid: &str, idx: usize) -> Result<Option<StepRecord>, EngineError> {
        let fields = self.store.hget_all(&step_key(sid, idx + 1)).await?;
        Ok(serialize::from_fields(&fields)?)
    }

    /// Persist re-indexed records for a compensation chain, then unwind it.
    pub(crate) async fn run_compensation(
        &self,
        sid: &str,
        tasks: Vec<TaskTemplate>,
        seed: Option<Value>,
    ) -> Result<Value, EngineError> {
        let mut ops = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            ops.push(StoreOp::HSetAll {
                key: step_key(sid, idx),
                fields: serialize::to_fields(&StepRecord::from_template(task, idx)),
            });
        }
        self.store.multi(ops).await?;
        self.execute(
            sid,
            &tasks,
            ExecuteOptions {
                rewind: true,
                seed,
            },
        )
        .await
        .map_err(|err| EngineError::Compensation {
            sid: sid.to_string(),
            message: err.to_string(),
        })
    }
}

/// Per-delivery handler for one series' topic
struct SeriesProcessor<S: StoreAdapter, B: QueueBroker> {
    series: TaskSeries<S, B>,
    sid: String,
    /// Chain snapshot, scanned for rewind-eligible steps on failure.
    tasks: Vec<TaskTemplate>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    rewind: bool,
}

impl<S: StoreAdapter, B: QueueBroker> SeriesProcessor<S, B> {
    /// Collect rewind-eligible steps at or below the failing index, most
    /// recent first, and unwind them as their own series. The caller's
    /// failure signal is not held up: the compensation chain runs in the
    /// background and reports through events.
    fn kick_off_compensation(&self, failed_idx: usize, seed: Option<Value>) {
        let last = self.tasks.len().saturating_sub(1);
        let compensations: Vec<TaskTemplate> = (0..=failed_idx.min(last))
            .rev()
            .filter(|&i| self.tasks[i].rewind_path.is_some())
            .map(|i| self.tasks[i].clone())
            .collect();
        if compensations.is_empty() {
            return;
        }

        let series = self.series.clone();
        let comp_sid = format!("{}{}", self.sid, REWIND_SUFFIX);
        tracing::warn!(
            sid = %self.sid,
            steps = compensations.len(),
            "step failed, starting compensation series"
        );
        tokio::spawn(async move {
            series.events.publish(JobEvent::CompensationStarted {
                sid: comp_sid.clone(),
            });
            match series.run_compensation(&comp_sid, compensations, seed).await {
                Ok(result) => {
                    tracing::info!(sid = %comp_sid, "compensation series complete");
                    series.events.publish(JobEvent::CompensationFinished {
                        sid: comp_sid,
                        result,
                    });
                }
                Err(err) => {
                    tracing::warn!(sid = %comp_sid, error = %err, "compensation series failed");
                    series.events.publish(JobEvent::CompensationFailed {
                        sid: comp_sid,
                        error: err.to_string(),
                    });
                }
            }
        });
    }
}

#[async_trait]
impl<S: StoreAdapter, B: QueueBroker> JobProcessor for SeriesProcessor<S, B> {
    async fn process(&self, job: DeliveredJob) -> Result<Value, ProcessError> {
        let record: StepRecord = serde_json::from_value(job.payload)
            .map_err(|err| ProcessError(format!("malformed step payload: {err}")))?;
        let key = step_key(&self.sid, record.idx);

        // At-least-once broker: a redelivered step that already recorded a
        // result must not run its body again.
        let fields = self
            .series
            .store
            .hget_all(&key)
            .await
            .map_err(|err| ProcessError(err.to_string()))?;
        if let Some(stored) = serialize::from_fields(&fields)
            .map_err(|err| ProcessError(err.to_string()))?
        {
            if stored.is_settled() {
                tracing::debug!(
                    sid = %self.sid,
                    idx = record.idx,
                    "step already complete, returning stored result"
                );
                // is_settled guarantees the result is present
                if let Some(result) = stored.result {
                    return Ok(result);
                }
            }
        }

        self.series
            .store
            .multi(vec![StoreOp::HSet {
                key,
                field: "status".into(),
                value: StepStatus::Processing.to_string(),
            }])
            .await
            .map_err(|err| ProcessError(err.to_string()))?;

        let path = if self.rewind {
            record
                .rewind_path
                .clone()
                .ok_or_else(|| ProcessError(format!("step {} has no rewind handler", record.idx)))?
        } else {
            record.path.clone()
        };
        let handler = self
            .handlers
            .get(&path)
            .ok_or_else(|| ProcessError(format!("no handler bound for {path}")))?;

        match handler.invoke(&record.param, record.pre_result.as_ref()).await {
            Ok(result) => Ok(result),
            Err(err) => {
                // never compensate a compensation
                if !self.rewind {
                    self.kick_off_compensation(record.idx, err.partial.clone());
                }
                Err(ProcessError(err.message))
            }
        }
    }
}

#[cfg(test)]
#[path = "series_tests.rs"]
mod tests;
