// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task handler registry
//!
//! Task bodies are pluggable units of work keyed by path strings. A series
//! resolves every forward and rewind path it needs at construction time,
//! so a missing handler fails the series before any step runs instead of
//! mid-chain.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Failure reported by a task body.
///
/// `partial` carries whatever output the body produced before failing; a
/// compensation chain is seeded with it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub partial: Option<Value>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: None,
        }
    }

    pub fn with_partial(message: impl Into<String>, partial: Value) -> Self {
        Self {
            message: message.into(),
            partial: Some(partial),
        }
    }
}

/// One executable unit of work
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the body with the step's `param` and the prior step's output.
    async fn invoke(&self, param: &Value, previous: Option<&Value>) -> Result<Value, TaskError>;
}

/// Closure-backed handler for simple synchronous task bodies
struct FnHandler<F>(F);

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(&Value, Option<&Value>) -> Result<Value, TaskError> + Send + Sync,
{
    async fn invoke(&self, param: &Value, previous: Option<&Value>) -> Result<Value, TaskError> {
        (self.0)(param, previous)
    }
}

/// Maps path strings to handler implementations
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a path. Last write wins.
    pub fn register(&self, path: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), handler);
    }

    /// Register a closure as a handler.
    pub fn register_fn<F>(&self, path: impl Into<String>, body: F)
    where
        F: Fn(&Value, Option<&Value>) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.register(path, Arc::new(FnHandler(body)));
    }

    pub fn resolve(&self, path: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
