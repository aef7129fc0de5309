// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sagaq-core: data model and adapter contracts for the saga engine
//!
//! This crate provides:
//! - Task templates and per-step records with their status state machine
//! - The flat-hash codec used to persist step records
//! - Contracts for the shared key-value store and the job-queue broker
//! - Id generation abstractions

pub mod broker;
pub mod id;
pub mod serialize;
pub mod store;
pub mod task;

// Re-exports
pub use broker::{
    BrokerError, DeliveredJob, JobHandle, JobOutcome, JobProcessor, JobSpec, ProcessError,
    QueueBroker,
};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use serialize::CodecError;
pub use store::{outcome_key, step_key, StoreAdapter, StoreError, StoreOp};
pub use task::{StepRecord, StepStatus, TaskTemplate};
