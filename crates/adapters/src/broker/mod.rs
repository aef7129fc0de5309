// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker adapters

mod memory;

pub use memory::MemoryBroker;
