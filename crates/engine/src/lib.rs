// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sagaq-engine: saga orchestration over a job-queue broker
//!
//! The [`JobManager`] owns job types, their task chains, and job outcome
//! persistence; [`TaskSeries`] drives one chain a step at a time, persists
//! per-step state, and runs compensations backward after a failure.

mod error;
mod events;
mod manager;
mod registry;
mod series;

pub use error::EngineError;
pub use events::{EventFanout, JobEvent};
pub use manager::{JobManager, JobOptions};
pub use registry::{HandlerRegistry, TaskError, TaskHandler};
pub use series::{ExecuteOptions, TaskSeries};
