// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status derivation.
//!
//! One record per submission, stored in the jobs KV bucket and mutated
//! only via compare-and-swap. The job-level status is never stored as
//! truth on its own: it is a pure function of the per-host worker states
//! ([`JobStatus::derive`]) and is recomputed on every mutation and read.

use crate::hostname::Hostname;
use crate::id::JobId;
use crate::operation::Operation;
use crate::response::{AgentResponse, ResponseStatus};
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job-level status, derived from per-host worker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created; no host has reported yet.
    Submitted,
    /// At least one host is still pending or running.
    Processing,
    /// Every resolved host completed.
    Completed,
    /// Every resolved host failed.
    Failed,
    /// Terminal mix: at least one success and at least one failure.
    PartialFailure,
    /// Terminal, no successes, and at least one host hit the DLQ.
    DeadLetter,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::PartialFailure
                | JobStatus::DeadLetter
        )
    }

    /// Derive the job status from worker states.
    ///
    /// Pure function: same inputs, same answer, regardless of which
    /// process asks. `resolved` is the authoritative host set; hosts the
    /// dispatcher never published to do not exist as far as status is
    /// concerned.
    pub fn derive(resolved: &[Hostname], states: &BTreeMap<Hostname, WorkerState>) -> JobStatus {
        if states.is_empty() {
            return JobStatus::Submitted;
        }

        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut dead = 0usize;

        for host in resolved {
            match states.get(host).map(|s| s.status) {
                Some(WorkerStatus::Completed) => completed += 1,
                Some(WorkerStatus::Failed) => failed += 1,
                Some(WorkerStatus::DeadLetter) => dead += 1,
                Some(WorkerStatus::Acknowledged) | Some(WorkerStatus::Started) | None => {
                    return JobStatus::Processing;
                }
            }
        }

        match (completed, failed + dead) {
            (_, 0) => JobStatus::Completed,
            (0, _) if dead > 0 => JobStatus::DeadLetter,
            (0, _) => JobStatus::Failed,
            (_, _) => JobStatus::PartialFailure,
        }
    }
}

crate::simple_display! {
    JobStatus {
        Submitted => "submitted",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        PartialFailure => "partial_failure",
        DeadLetter => "dead_letter",
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(JobStatus::Submitted),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "partial_failure" => Ok(JobStatus::PartialFailure),
            "dead_letter" => Ok(JobStatus::DeadLetter),
            other => Err(format!("unknown job status {other:?}")),
        }
    }
}

/// Per-host execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Envelope delivered to the agent; handler not yet running.
    Acknowledged,
    /// Handler is executing.
    Started,
    /// Handler returned success.
    Completed,
    /// Handler returned an error, the operation was unknown, or the
    /// dispatcher failed to publish to this host.
    Failed,
    /// Delivery count exceeded max_deliver; message landed on the DLQ.
    DeadLetter,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Completed | WorkerStatus::Failed | WorkerStatus::DeadLetter
        )
    }

    // Monotonicity rank: transitions may only hold or increase.
    fn rank(&self) -> u8 {
        match self {
            WorkerStatus::Acknowledged => 1,
            WorkerStatus::Started => 2,
            WorkerStatus::Completed | WorkerStatus::Failed | WorkerStatus::DeadLetter => 3,
        }
    }
}

crate::simple_display! {
    WorkerStatus {
        Acknowledged => "acknowledged",
        Started => "started",
        Completed => "completed",
        Failed => "failed",
        DeadLetter => "dead_letter",
    }
}

/// One host's slice of a job's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    pub status: WorkerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerState {
    pub fn acknowledged() -> Self {
        Self {
            status: WorkerStatus::Acknowledged,
            started_at_ms: None,
            finished_at_ms: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn started(at_ms: u64) -> Self {
        Self {
            status: WorkerStatus::Started,
            started_at_ms: Some(at_ms),
            finished_at_ms: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, at_ms: u64) -> Self {
        Self {
            status: WorkerStatus::Failed,
            started_at_ms: None,
            finished_at_ms: Some(at_ms),
            duration_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn dead_letter(at_ms: u64) -> Self {
        Self {
            status: WorkerStatus::DeadLetter,
            started_at_ms: None,
            finished_at_ms: Some(at_ms),
            duration_ms: None,
            error: Some("max deliveries exceeded".to_string()),
        }
    }
}

/// Timeline event kinds. Ordered by insertion timestamp, not causality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEvent {
    Created,
    Dispatched,
    DispatchFailed,
    Completed,
    Failed,
    DeadLetter,
    Malformed,
    AggregationDropped,
    Retried,
}

crate::simple_display! {
    TimelineEvent {
        Created => "created",
        Dispatched => "dispatched",
        DispatchFailed => "dispatch_failed",
        Completed => "completed",
        Failed => "failed",
        DeadLetter => "dead_letter",
        Malformed => "malformed",
        AggregationDropped => "aggregation_dropped",
        Retried => "retried",
    }
}

/// One entry in a job's ordered event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp_ms: u64,
    pub event: TimelineEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<Hostname>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The job record persisted in the jobs KV bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub operation: Operation,
    pub target: Target,
    pub resolved_hosts: Vec<Hostname>,
    pub status: JobStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default)]
    pub worker_states: BTreeMap<Hostname, WorkerState>,
    #[serde(default)]
    pub responses: BTreeMap<Hostname, AgentResponse>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: JobId,
        operation: Operation,
        target: Target,
        resolved_hosts: Vec<Hostname>,
        now_ms: u64,
    ) -> Self {
        let mut job = Self {
            id,
            operation,
            target,
            resolved_hosts,
            status: JobStatus::Submitted,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            worker_states: BTreeMap::new(),
            responses: BTreeMap::new(),
            timeline: Vec::new(),
            error: None,
        };
        job.append_timeline(TimelineEvent::Created, None, "", None, now_ms);
        job
    }

    /// Append a timeline entry and bump `updated_at_ms`.
    pub fn append_timeline(
        &mut self,
        event: TimelineEvent,
        hostname: Option<&Hostname>,
        message: &str,
        error: Option<&str>,
        now_ms: u64,
    ) {
        self.timeline.push(TimelineEntry {
            timestamp_ms: now_ms,
            event,
            hostname: hostname.cloned(),
            message: message.to_string(),
            error: error.map(str::to_string),
        });
        self.touch(now_ms);
    }

    /// Apply a per-host state transition, refusing regressions.
    ///
    /// Returns false when the transition would move backwards
    /// (e.g. a redelivered `started` after the host already finished);
    /// the caller then keeps the existing state. Equal-rank terminal
    /// replays are accepted so a redelivered final result lands
    /// idempotently.
    pub fn apply_worker_state(&mut self, host: &Hostname, next: WorkerState, now_ms: u64) -> bool {
        let accepted = match self.worker_states.get_mut(host) {
            Some(current) if next.status.rank() < current.status.rank() => false,
            Some(current) => {
                // Preserve the original start time across the finish
                // transition, and across replays that lack one.
                let started = current.started_at_ms.or(next.started_at_ms);
                *current = next;
                current.started_at_ms = started;
                if let (Some(start), Some(finish)) =
                    (current.started_at_ms, current.finished_at_ms)
                {
                    current.duration_ms = Some(finish.saturating_sub(start));
                }
                true
            }
            None => {
                self.worker_states.insert(host.clone(), next);
                true
            }
        };
        if accepted {
            self.recompute(now_ms);
        }
        accepted
    }

    /// Merge an agent response: updates `responses[h]`, the worker state,
    /// and the timeline in one step.
    ///
    /// An exact replay of an already-recorded response is a no-op, so
    /// redeliveries and the two merge paths (agent-local and
    /// aggregator) cannot double-append timeline entries.
    pub fn apply_response(&mut self, response: AgentResponse, now_ms: u64) -> bool {
        let host = response.hostname.clone();
        if self.responses.get(&host) == Some(&response) {
            return false;
        }
        let state = WorkerState {
            status: match response.status {
                ResponseStatus::Ok => WorkerStatus::Completed,
                ResponseStatus::Failed => WorkerStatus::Failed,
            },
            started_at_ms: None,
            finished_at_ms: Some(response.timestamp_ms),
            duration_ms: None,
            error: response.error.clone(),
        };
        let accepted = self.apply_worker_state(&host, state, now_ms);
        if accepted {
            let event = match response.status {
                ResponseStatus::Ok => TimelineEvent::Completed,
                ResponseStatus::Failed => TimelineEvent::Failed,
            };
            let error = response.error.clone();
            self.responses.insert(host.clone(), response);
            self.append_timeline(event, Some(&host), "", error.as_deref(), now_ms);
        }
        accepted
    }

    /// Recompute the derived status. `updated_at_ms` never decreases.
    pub fn recompute(&mut self, now_ms: u64) {
        self.status = JobStatus::derive(&self.resolved_hosts, &self.worker_states);
        self.touch(now_ms);
    }

    fn touch(&mut self, now_ms: u64) {
        self.updated_at_ms = self.updated_at_ms.max(now_ms);
    }
}

/// Test builder for job records.
#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    id: JobId,
    operation: Operation,
    target: Target,
    resolved_hosts: Vec<Hostname>,
    created_at_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for JobBuilder {
    fn default() -> Self {
        Self {
            id: JobId::new("00000000-0000-4000-8000-000000000000"),
            operation: Operation::new("system.hostname").unwrap_or_else(|_| unreachable!()),
            target: Target::All,
            resolved_hosts: vec![Hostname::new("web-01")],
            created_at_ms: 1_000_000,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn operation(mut self, op: Operation) -> Self {
        self.operation = op;
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn hosts<H: Into<Hostname>>(mut self, hosts: impl IntoIterator<Item = H>) -> Self {
        self.resolved_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn created_at_ms(mut self, ms: u64) -> Self {
        self.created_at_ms = ms;
        self
    }

    pub fn build(self) -> Job {
        Job::new(self.id, self.operation, self.target, self.resolved_hosts, self.created_at_ms)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
