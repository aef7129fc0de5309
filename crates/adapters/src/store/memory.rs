// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory key-value store

use async_trait::async_trait;
use sagaq_core::{StoreAdapter, StoreError, StoreOp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Default)]
struct Keyspace {
    strings: HashMap<String, StringEntry>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl Keyspace {
    fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::Set { key, value } => {
                self.strings.insert(
                    key,
                    StringEntry {
                        value,
                        expires_at: None,
                    },
                );
            }
            StoreOp::SetEx { key, ttl, value } => {
                self.strings.insert(
                    key,
                    StringEntry {
                        value,
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
            }
            StoreOp::Del { key } => {
                self.strings.remove(&key);
                self.hashes.remove(&key);
            }
            StoreOp::HSet { key, field, value } => {
                self.hashes.entry(key).or_default().insert(field, value);
            }
            StoreOp::HSetAll { key, fields } => {
                self.hashes.entry(key).or_default().extend(fields);
            }
        }
    }
}

/// In-memory store with string and hash keyspaces.
///
/// `multi` applies the whole batch under one lock, so readers observe all
/// of a batch or none of it. Expiries are checked lazily on read.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Keyspace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Keyspace> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut keyspace = self.lock();
        if keyspace.strings.get(key).is_some_and(StringEntry::expired) {
            keyspace.strings.remove(key);
        }
        Ok(keyspace.strings.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().apply(StoreOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn setex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), StoreError> {
        self.lock().apply(StoreOp::SetEx {
            key: key.to_string(),
            ttl,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.lock().apply(StoreOp::Del {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn hset_all(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        self.lock().apply(StoreOp::HSetAll {
            key: key.to_string(),
            fields,
        });
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn multi(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut keyspace = self.lock();
        for op in ops {
            keyspace.apply(op);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let mut keyspace = self.lock();
        keyspace.strings.clear();
        keyspace.hashes.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
