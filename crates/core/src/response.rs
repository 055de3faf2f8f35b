// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent → dispatcher response message.

use crate::hostname::Hostname;
use crate::id::JobId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one handler execution on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Failed,
}

crate::simple_display! {
    ResponseStatus {
        Ok => "ok",
        Failed => "failed",
    }
}

/// Published by the agent to `<ns>.responses.<jobID>.<hostname>` after a
/// handler finishes (or fails to start). Also merged into the job record
/// under `responses[hostname]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub job_id: JobId,
    pub hostname: Hostname,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp_ms: u64,
}

impl AgentResponse {
    pub fn ok(job_id: JobId, hostname: Hostname, data: Value, timestamp_ms: u64) -> Self {
        Self { job_id, hostname, status: ResponseStatus::Ok, data: Some(data), error: None, timestamp_ms }
    }

    pub fn failed(
        job_id: JobId,
        hostname: Hostname,
        error: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            job_id,
            hostname,
            status: ResponseStatus::Failed,
            data: None,
            error: Some(error.into()),
            timestamp_ms,
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
