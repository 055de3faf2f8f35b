// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios over the full in-process stack.

use crate::harness::{agent_consumer_stats, ControlPlane};
use async_trait::async_trait;
use osapi_bus::MessageBus;
use osapi_core::{Hostname, JobStatus, Operation, ResponseStatus, Target, WorkerStatus};
use osapi_dispatch::DispatchError;
use osapi_handlers::{Handler, HandlerError, HandlerRegistry};
use serde_json::Value;
use std::time::Duration;

fn hostname_op() -> Operation {
    Operation::new("system.hostname").unwrap()
}

// ── 1. Single-host success ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn single_host_success() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;

    let receipt = plane
        .dispatcher
        .submit(hostname_op(), Target::host("web-01"))
        .await
        .unwrap();
    assert_eq!(receipt.status, JobStatus::Submitted);

    let job = plane
        .wait_job(&receipt.job_id, |j| j.status.is_terminal())
        .await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.worker_states["web-01"].status, WorkerStatus::Completed);
    let response = &job.responses["web-01"];
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(response.data.as_ref().unwrap()["hostname"], "web-01");

    plane.shutdown().await;
}

// ── 2. Broadcast partial failure ────────────────────────────────────────

/// Owns `system.hostname` but always fails it.
struct BrokenHostname;

#[async_trait]
impl Handler for BrokenHostname {
    fn operation(&self) -> &'static str {
        "system.hostname"
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        Err(HandlerError::Failed("handler error".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn broadcast_partial_failure() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;
    let mut broken = HandlerRegistry::new();
    broken.register(std::sync::Arc::new(BrokenHostname));
    plane.start_agent_with("web-02", &[], broken).await;

    let receipt = plane.dispatcher.submit(hostname_op(), Target::All).await.unwrap();
    let job = plane
        .wait_job(&receipt.job_id, |j| j.status.is_terminal())
        .await;

    assert_eq!(job.status, JobStatus::PartialFailure);
    assert_eq!(job.worker_states["web-01"].status, WorkerStatus::Completed);
    assert_eq!(job.worker_states["web-02"].status, WorkerStatus::Failed);
    assert!(!job.responses["web-02"].error.as_deref().unwrap_or("").is_empty());

    plane.shutdown().await;
}

// ── 3. Label routing ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn label_routing_selects_the_conjunction() {
    let mut plane = ControlPlane::start().await;
    plane
        .start_agent("web-01", &[("group", "web"), ("env", "prod")])
        .await;
    plane
        .start_agent("web-02", &[("group", "web"), ("env", "stage")])
        .await;

    let target = Target::labels([("group", "web"), ("env", "prod")]);
    let receipt = plane.dispatcher.submit(hostname_op(), target).await.unwrap();

    let job = plane
        .wait_job(&receipt.job_id, |j| j.status.is_terminal())
        .await;
    assert_eq!(job.resolved_hosts, vec![Hostname::from("web-01")]);
    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.worker_states.contains_key("web-02"));

    plane.shutdown().await;
}

// ── 4. Agent restart / redelivery ───────────────────────────────────────

/// First instance: accepts the envelope and never finishes.
struct Wedged;

#[async_trait]
impl Handler for Wedged {
    fn operation(&self) -> &'static str {
        "system.hostname"
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(Value::Null)
    }
}

#[tokio::test(start_paused = true)]
async fn agent_restart_redelivers_the_message() {
    let mut plane = ControlPlane::start().await;
    let mut wedged = HandlerRegistry::new();
    wedged.register(std::sync::Arc::new(Wedged));
    let first_agent = plane.start_agent_with("web-01", &[], wedged).await;

    let receipt = plane
        .dispatcher
        .submit(hostname_op(), Target::host("web-01"))
        .await
        .unwrap();

    // The wedged instance starts the handler but never resolves it.
    plane
        .wait_job(&receipt.job_id, |j| {
            j.worker_states
                .get("web-01")
                .is_some_and(|s| s.status == WorkerStatus::Started)
        })
        .await;

    // Kill before ack; restart with a working handler set.
    first_agent.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    plane.start_agent("web-01", &[]).await;

    let job = plane
        .wait_job(&receipt.job_id, |j| j.status == JobStatus::Completed)
        .await;
    // One response entry, reflecting the successful execution.
    assert_eq!(job.responses.len(), 1);
    assert_eq!(job.responses["web-01"].status, ResponseStatus::Ok);

    // Delivery count ≥ 2: the bus redelivered after the ack wait.
    let stats = agent_consumer_stats(&plane, "web-01").await;
    assert!(stats.redelivered >= 1, "expected a redelivery, got {stats:?}");

    plane.shutdown().await;
}

// ── 5. Unknown operation type ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unknown_operation_fails_cleanly_without_redelivery() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;

    let receipt = plane
        .dispatcher
        .submit(Operation::new("foo.bar").unwrap(), Target::host("web-01"))
        .await
        .unwrap();

    let job = plane
        .wait_job(&receipt.job_id, |j| j.status.is_terminal())
        .await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.worker_states["web-01"].status, WorkerStatus::Failed);
    assert_eq!(
        job.responses["web-01"].error.as_deref(),
        Some("unknown operation: foo.bar")
    );

    // Acked, not redelivered, stream drained.
    let stats = agent_consumer_stats(&plane, "web-01").await;
    assert_eq!(stats.redelivered, 0);
    assert_eq!(stats.ack_pending, 0);

    plane.shutdown().await;
}

// ── 6. Target not found ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unknown_target_rejects_without_a_record() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;

    let err = plane
        .dispatcher
        .submit(hostname_op(), Target::host("web-99"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoSuchAgent(host) if host == "web-99"));

    let page = plane.dispatcher.list(None, 10, 0).await.unwrap();
    assert_eq!(page.total_items, 0);

    plane.shutdown().await;
}

// ── Handler timeout boundary ────────────────────────────────────────────

/// Declares a 1s budget and sleeps past it.
struct Overdue;

#[async_trait]
impl Handler for Overdue {
    fn operation(&self) -> &'static str {
        "system.hostname"
    }

    fn timeout(&self, _operation: &Operation) -> Duration {
        Duration::from_secs(1)
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Value::Null)
    }
}

#[tokio::test(start_paused = true)]
async fn handler_exceeding_its_budget_reports_timeout() {
    let mut plane = ControlPlane::start().await;
    let mut overdue = HandlerRegistry::new();
    overdue.register(std::sync::Arc::new(Overdue));
    plane.start_agent_with("web-01", &[], overdue).await;

    let receipt = plane
        .dispatcher
        .submit(hostname_op(), Target::host("web-01"))
        .await
        .unwrap();
    let job = plane
        .wait_job(&receipt.job_id, |j| j.status.is_terminal())
        .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.responses["web-01"].error.as_deref(), Some("timeout"));

    plane.shutdown().await;
}

// ── DLQ path: repeated transient failure dead-letters the host ──────────

/// Fails transiently forever; every delivery naks until max_deliver.
struct AlwaysTransient;

#[async_trait]
impl Handler for AlwaysTransient {
    fn operation(&self) -> &'static str {
        "system.hostname"
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        Err(HandlerError::Transient("backend down".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_deliveries_mark_the_host_dead_lettered() {
    let mut plane = ControlPlane::start().await;
    let mut flappy = HandlerRegistry::new();
    flappy.register(std::sync::Arc::new(AlwaysTransient));
    plane.start_agent_with("web-01", &[], flappy).await;

    let receipt = plane
        .dispatcher
        .submit(hostname_op(), Target::host("web-01"))
        .await
        .unwrap();

    // Five deliveries spaced by the backoff ladder, then the advisory.
    let job = plane
        .wait_job(&receipt.job_id, |j| {
            j.worker_states
                .get("web-01")
                .is_some_and(|s| s.status == WorkerStatus::DeadLetter)
        })
        .await;
    assert_eq!(job.status, JobStatus::DeadLetter);

    let dlq = plane
        .bus
        .stream_stats(&plane.namespace.dlq_stream())
        .await
        .unwrap();
    assert_eq!(dlq.messages, 1);

    let summary = plane.dispatcher.queue_summary().await.unwrap();
    assert_eq!(summary.dlq_messages, 1);
    assert_eq!(summary.by_status.get("dead_letter"), Some(&1));

    plane.shutdown().await;
}
