// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flat-hash codec for step records
//!
//! The store persists step records as hashes of scalar fields. Structured
//! fields (`param`, `result`, `pre_result`) are JSON-encoded; everything
//! else is stored verbatim. An empty hash decodes to `None`, the sentinel
//! for "no record at this key" used to detect the end of a chain.

use crate::task::{StepRecord, StepStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("field {field} is not valid json: {source}")]
    BadJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("field {field} is not a number: {value}")]
    BadNumber { field: &'static str, value: String },
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

/// Flatten a step record into hash fields.
pub fn to_fields(record: &StepRecord) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    fields.insert("name".to_string(), record.name.clone());
    fields.insert("path".to_string(), record.path.clone());
    if let Some(rewind_path) = &record.rewind_path {
        fields.insert("rewind_path".to_string(), rewind_path.clone());
    }
    fields.insert("param".to_string(), record.param.to_string());
    fields.insert("idx".to_string(), record.idx.to_string());
    fields.insert("ttl_ms".to_string(), record.ttl.as_millis().to_string());
    fields.insert("retry".to_string(), record.retry.to_string());
    if let Some(status) = record.status {
        fields.insert("status".to_string(), status.as_str().to_string());
    }
    if let Some(result) = &record.result {
        fields.insert("result".to_string(), result.to_string());
    }
    if let Some(error) = &record.error {
        fields.insert("error".to_string(), error.clone());
    }
    if let Some(pre_result) = &record.pre_result {
        fields.insert("pre_result".to_string(), pre_result.to_string());
    }
    fields
}

/// Rebuild a step record from hash fields. An empty hash yields `None`.
pub fn from_fields(fields: &HashMap<String, String>) -> Result<Option<StepRecord>, CodecError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let name = require(fields, "name")?.clone();
    let path = require(fields, "path")?.clone();
    let rewind_path = fields.get("rewind_path").cloned();
    let param = parse_json(require(fields, "param")?, "param")?;
    let idx = parse_number::<usize>(require(fields, "idx")?, "idx")?;
    let ttl_ms = parse_number::<u64>(require(fields, "ttl_ms")?, "ttl_ms")?;
    let retry = parse_number::<u32>(require(fields, "retry")?, "retry")?;

    let status = match fields.get("status") {
        Some(raw) => {
            Some(StepStatus::parse(raw).ok_or_else(|| CodecError::UnknownStatus(raw.clone()))?)
        }
        None => None,
    };
    let result = match fields.get("result") {
        Some(raw) => Some(parse_json(raw, "result")?),
        None => None,
    };
    let pre_result = match fields.get("pre_result") {
        Some(raw) => Some(parse_json(raw, "pre_result")?),
        None => None,
    };

    Ok(Some(StepRecord {
        name,
        path,
        rewind_path,
        param,
        idx,
        ttl: Duration::from_millis(ttl_ms),
        retry,
        status,
        result,
        error: fields.get("error").cloned(),
        pre_result,
    }))
}

fn require<'a>(
    fields: &'a HashMap<String, String>,
    field: &'static str,
) -> Result<&'a String, CodecError> {
    fields.get(field).ok_or(CodecError::MissingField(field))
}

fn parse_json(raw: &str, field: &'static str) -> Result<Value, CodecError> {
    serde_json::from_str(raw).map_err(|source| CodecError::BadJson { field, source })
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &'static str) -> Result<T, CodecError> {
    raw.parse().map_err(|_| CodecError::BadNumber {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
#[path = "serialize_tests.rs"]
mod tests;
