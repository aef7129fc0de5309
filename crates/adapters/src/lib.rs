// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! In-memory realizations of the store and broker contracts
//!
//! These back the engine's tests and serve as a working single-process
//! backend. A networked deployment swaps in adapters speaking to a real
//! key-value store and queue broker behind the same traits.

pub mod broker;
pub mod store;

pub use broker::MemoryBroker;
pub use store::MemoryStore;
