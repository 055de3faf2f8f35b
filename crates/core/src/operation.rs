// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative operation: a dotted type plus opaque fields.
//!
//! The engine routes on `type` alone (`"system.hostname"`,
//! `"network.dns.update"`); every other field passes through untouched to
//! whichever handler the agent registers for that type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One unit of declarative work.
///
/// Serializes as a flat JSON object: `{"type": "network.ping", "host": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

impl Operation {
    /// Construct an operation with a validated dotted type.
    pub fn new(kind: impl Into<String>) -> Result<Self, OperationError> {
        let kind = kind.into();
        validate_kind(&kind)?;
        Ok(Self { kind, fields: serde_json::Map::new() })
    }

    /// Attach a payload field. Routing never looks at these.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Re-validate an operation that arrived through serde.
    ///
    /// Derived deserialization cannot reject a malformed `type`, so trust
    /// boundaries (job submission, envelope parse) call this.
    pub fn validate(&self) -> Result<(), OperationError> {
        validate_kind(&self.kind)
    }

    /// The full dotted type, e.g. `"network.dns.update"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// First dotted segment (`"network"` for `"network.dns.update"`).
    pub fn category(&self) -> &str {
        self.kind.split('.').next().unwrap_or(&self.kind)
    }

    /// Everything after the category (`"dns.update"`).
    pub fn name(&self) -> &str {
        match self.kind.split_once('.') {
            Some((_, rest)) => rest,
            None => &self.kind,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &serde_json::Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

fn validate_kind(kind: &str) -> Result<(), OperationError> {
    let mut segments = 0;
    for segment in kind.split('.') {
        if segment.is_empty() {
            return Err(OperationError::MalformedType(kind.to_string()));
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        {
            return Err(OperationError::MalformedType(kind.to_string()));
        }
        segments += 1;
    }
    if segments < 2 {
        return Err(OperationError::MalformedType(kind.to_string()));
    }
    Ok(())
}

/// Invalid operation input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("malformed operation type {0:?}: expected dotted category.name")]
    MalformedType(String),
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
