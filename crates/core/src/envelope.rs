// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher → agent job envelope.

use crate::hostname::Hostname;
use crate::id::JobId;
use crate::operation::{Operation, OperationError};
use serde::{Deserialize, Serialize};

/// Correlation headers attached to every envelope publish.
pub mod headers {
    /// Job the envelope belongs to.
    pub const JOB_ID: &str = "Osapi-Job-Id";
    /// Trace id shared by dispatcher and agent log spans.
    pub const TRACE_ID: &str = "Osapi-Trace-Id";
    /// Broker dedup key (`<jobID>-<hostname>`): the stream's duplicate
    /// window suppresses accidental double publishes.
    pub const MSG_ID: &str = "Nats-Msg-Id";
}

/// One unit of work published to `<ns>.jobs.<hostname>.<type>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    pub operation: Operation,
    /// The single host this copy of the envelope targets (fan-out
    /// publishes one envelope per resolved host).
    pub target: Hostname,
    pub enqueued_at_ms: u64,
}

impl JobEnvelope {
    pub fn new(job_id: JobId, operation: Operation, target: Hostname, enqueued_at_ms: u64) -> Self {
        Self { job_id, operation, target, enqueued_at_ms }
    }

    /// Parse an envelope off the wire, rejecting structurally valid JSON
    /// that carries a malformed operation type.
    pub fn parse(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: JobEnvelope = serde_json::from_slice(payload)?;
        envelope.operation.validate()?;
        Ok(envelope)
    }

    /// Dedup key for the broker's duplicate window.
    pub fn msg_id(&self) -> String {
        format!("{}-{}", self.job_id, self.target)
    }
}

/// Envelope parse failure. Permanent: the consumer terminates the
/// message rather than retrying it.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
