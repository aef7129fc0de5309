// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task templates and step records
//!
//! A job type owns an ordered list of task templates. When a series starts,
//! each template is snapshotted into a step record at `{sid}:{idx}` and the
//! record carries all per-step state from then on. The status state machine
//! is `pending → processing → {complete | failed}`; the terminal states
//! never transition away.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default per-step time budget
pub const DEFAULT_STEP_TTL: Duration = Duration::from_secs(60);
/// Default per-step delivery attempts
pub const DEFAULT_STEP_RETRY: u32 = 1;

/// One task in a job type's chain.
///
/// `path` names the forward handler in the registry; `rewind_path`, when
/// present, names the compensating handler run if a later step fails.
/// Immutable once a series snapshot is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewind_path: Option<String>,
    #[serde(default)]
    pub param: Value,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub retry: u32,
}

impl TaskTemplate {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            rewind_path: None,
            param: Value::Null,
            ttl: DEFAULT_STEP_TTL,
            retry: DEFAULT_STEP_RETRY,
        }
    }

    pub fn rewind_path(mut self, path: impl Into<String>) -> Self {
        self.rewind_path = Some(path.into());
        self
    }

    pub fn param(mut self, param: Value) -> Self {
        self.param = param;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }
}

/// The status of a step record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Record written, step not yet dispatched
    Pending,
    /// A delivery is running the step's body
    Processing,
    /// Step finished and its result is persisted
    Complete,
    /// Step failed and its error is persisted
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Complete => "complete",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StepStatus::Pending),
            "processing" => Some(StepStatus::Processing),
            "complete" => Some(StepStatus::Complete),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }

    /// Complete and failed records never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Complete | StepStatus::Failed)
    }

    /// Whether the state machine admits `next` from this state.
    ///
    /// Re-marking a processing step as processing is allowed: an
    /// at-least-once broker may deliver the same step twice.
    pub fn can_transition(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Processing)
                | (StepStatus::Processing, StepStatus::Processing)
                | (StepStatus::Processing, StepStatus::Complete)
                | (StepStatus::Processing, StepStatus::Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted state for one step of a series.
///
/// `ttl` and `retry` are carried from the template so a chain resumed from
/// the store keeps each step's time and retry budget. `pre_result` is
/// injected by the engine as the prior step's output and is never set by
/// the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewind_path: Option<String>,
    #[serde(default)]
    pub param: Value,
    pub idx: usize,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub retry: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_result: Option<Value>,
}

impl StepRecord {
    /// Snapshot a template into the record for step `idx`.
    pub fn from_template(template: &TaskTemplate, idx: usize) -> Self {
        Self {
            name: template.name.clone(),
            path: template.path.clone(),
            rewind_path: template.rewind_path.clone(),
            param: template.param.clone(),
            idx,
            ttl: template.ttl,
            retry: template.retry,
            status: None,
            result: None,
            error: None,
            pre_result: None,
        }
    }

    /// Attach the previous step's output.
    pub fn with_pre_result(mut self, pre_result: Value) -> Self {
        self.pre_result = Some(pre_result);
        self
    }

    /// A completed record with a stored result short-circuits redelivery.
    pub fn is_settled(&self) -> bool {
        self.status == Some(StepStatus::Complete) && self.result.is_some()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
