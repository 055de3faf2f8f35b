// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the message bus abstraction.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(String),

    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },

    #[error("stream setup failed: {0}")]
    Stream(String),

    #[error("consumer setup failed: {0}")]
    Consumer(String),

    #[error("kv operation failed: {0}")]
    Kv(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// CAS lost: the key moved past the expected revision.
    #[error("revision conflict on {key}: expected {expected}")]
    Conflict { key: String, expected: u64 },

    #[error("request to {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },

    #[error("no responders on {0}")]
    NoResponders(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bus connection closed")]
    Closed,
}

impl BusError {
    /// True for the CAS-lost case, which callers retry with a re-read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, BusError::Conflict { .. })
    }

    /// True when the failure means the broker is unreachable rather than
    /// the request being wrong; maps to `bus_unavailable` at the API edge.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BusError::Connect(_) | BusError::Closed | BusError::Timeout { .. }
        )
    }
}
