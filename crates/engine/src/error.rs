// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the orchestration engine

use sagaq_core::{BrokerError, CodecError, StoreError};
use thiserror::Error;

/// Errors surfaced by the job manager and task series
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed call; never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The broker refused the top-level job; the outcome claim was rolled back.
    #[error("failed to save job: {0}")]
    JobSave(String),
    /// A step's body reported failure or its delivery budget ran out.
    #[error("step {idx} of series {sid} failed: {message}")]
    StepExecution {
        sid: String,
        idx: usize,
        message: String,
    },
    /// A compensation chain failed partway through unwinding.
    #[error("compensation series {sid} failed: {message}")]
    Compensation { sid: String, message: String },
    /// Explicit stub for unfinished API surface.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
