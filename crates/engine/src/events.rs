// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle events
//!
//! Once a job has been accepted, events are the externally observable
//! completion signal. Compensation chains report through the same fanout
//! so callers can track what was otherwise a background side effect.

use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Events published by the job manager and task series
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The job's chain finished; `result` is the final step's output.
    Complete { key: String, result: Value },
    /// The job failed after exhausting its attempts.
    Failed { key: String, error: String },
    /// A step failed and a compensation chain was started.
    CompensationStarted { sid: String },
    /// The compensation chain unwound completely.
    CompensationFinished { sid: String, result: Value },
    /// The compensation chain itself failed; step records are retained.
    CompensationFailed { sid: String, error: String },
}

/// Fans events out to every live subscriber
#[derive(Clone, Default)]
pub struct EventFanout {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<JobEvent>>>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Publish to every subscriber, pruning dropped receivers.
    pub fn publish(&self, event: JobEvent) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
