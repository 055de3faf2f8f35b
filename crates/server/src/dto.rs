// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the REST surface.

use osapi_core::{AgentInfo, Job, JobStatus, Target};
use osapi_dispatch::{AgentProbe, QueueSummary, SubmitReceipt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `POST /jobs` body.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub operation: osapi_core::Operation,
    pub target: Target,
}

/// `POST /jobs/{id}/retry` body (optional).
#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub target: Option<Target>,
}

/// `201` body for submit and retry.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub revision: u64,
}

impl From<SubmitReceipt> for SubmitResponse {
    fn from(receipt: SubmitReceipt) -> Self {
        Self {
            job_id: receipt.job_id.to_string(),
            status: receipt.status,
            revision: receipt.revision,
        }
    }
}

/// One row of `GET /jobs`.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub operation: String,
    pub target: Target,
    pub status: JobStatus,
    pub hosts: usize,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            operation: job.operation.kind().to_string(),
            target: job.target.clone(),
            status: job.status,
            hosts: job.resolved_hosts.len(),
            created_at_ms: job.created_at_ms,
            updated_at_ms: job.updated_at_ms,
        }
    }
}

/// `GET /jobs` body.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub items: Vec<JobSummary>,
    pub total_items: usize,
}

/// `GET /jobs/queue` body.
#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub total_jobs: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_operation: BTreeMap<String, u64>,
    pub dlq_messages: u64,
}

impl From<QueueSummary> for QueueStatsResponse {
    fn from(summary: QueueSummary) -> Self {
        Self {
            total_jobs: summary.total_jobs,
            by_status: summary.by_status,
            by_operation: summary.by_operation,
            dlq_messages: summary.dlq_messages,
        }
    }
}

/// `GET /agents` body.
#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentInfo>,
    /// Registry keys that exist but fail to parse; excluded from routing.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<String>,
    pub total: usize,
}

/// `GET /agents/{hostname}` body.
#[derive(Debug, Serialize)]
pub struct AgentDetailResponse {
    #[serde(flatten)]
    pub info: AgentInfo,
    /// True when the live probe went unanswered and this is the last
    /// registry snapshot.
    pub stale: bool,
}

impl From<AgentProbe> for AgentDetailResponse {
    fn from(probe: AgentProbe) -> Self {
        Self { info: probe.info, stale: probe.stale }
    }
}
