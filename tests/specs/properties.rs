// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting invariants observed over the running stack.

use crate::harness::ControlPlane;
use osapi_core::agent_info::AgentInfoBuilder;
use osapi_core::{Hostname, JobStatus, Operation, Target};
use std::time::Duration;

fn hostname_op() -> Operation {
    Operation::new("system.hostname").unwrap()
}

// `status = derive(workerStates)` and `updatedAt` nondecreasing for
// every snapshot an observer can take while a broadcast runs.
#[tokio::test(start_paused = true)]
async fn observed_snapshots_stay_consistent() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;
    plane.start_agent("web-02", &[]).await;

    let receipt = plane.dispatcher.submit(hostname_op(), Target::All).await.unwrap();

    let mut last_updated = 0;
    for _ in 0..100 {
        if let Ok(job) = plane.dispatcher.get(&receipt.job_id).await {
            assert_eq!(
                job.status,
                JobStatus::derive(&job.resolved_hosts, &job.worker_states),
                "observed status must equal the derivation"
            );
            assert!(job.updated_at_ms >= last_updated, "updated_at went backwards");
            last_updated = job.updated_at_ms;
            if job.status.is_terminal() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let job = plane.wait_job(&receipt.job_id, |j| j.status.is_terminal()).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.worker_states.len(), 2);

    plane.shutdown().await;
}

// ListAgents returns exactly the unexpired keys: live agents stay,
// silent entries fall out at the TTL, stopped agents deregister.
#[tokio::test(start_paused = true)]
async fn agent_listing_tracks_liveness() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;
    let second = plane.start_agent("web-02", &[]).await;

    // A key written once with no heartbeat behind it.
    plane
        .registry
        .register(&AgentInfoBuilder::default().hostname("ghost-01").build())
        .await
        .unwrap();

    let snapshot = plane.dispatcher.list_agents().await.unwrap();
    assert_eq!(
        snapshot.hostnames(),
        vec![
            Hostname::from("ghost-01"),
            Hostname::from("web-01"),
            Hostname::from("web-02")
        ]
    );

    // Past the registry TTL the silent key is gone; heartbeats keep the
    // live ones.
    tokio::time::sleep(Duration::from_secs(40)).await;
    let snapshot = plane.dispatcher.list_agents().await.unwrap();
    assert_eq!(
        snapshot.hostnames(),
        vec![Hostname::from("web-01"), Hostname::from("web-02")]
    );

    // A stopped agent deregisters without waiting for the TTL.
    second.cancel();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let snapshot = plane.dispatcher.list_agents().await.unwrap();
    assert_eq!(snapshot.hostnames(), vec![Hostname::from("web-01")]);

    plane.shutdown().await;
}

// Retry produces a new job whose operation is structurally equal, and
// the new job runs to completion on its own.
#[tokio::test(start_paused = true)]
async fn retry_reruns_the_original_operation() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-01", &[]).await;

    let operation = Operation::new("network.dns.update")
        .unwrap()
        .with_field("interface", "eth0")
        .with_field("servers", serde_json::json!(["1.1.1.1", "8.8.8.8"]));
    let original = plane
        .dispatcher
        .submit(operation.clone(), Target::host("web-01"))
        .await
        .unwrap();
    plane.wait_job(&original.job_id, |j| j.status.is_terminal()).await;

    let retried = plane.dispatcher.retry(&original.job_id, None).await.unwrap();
    assert_ne!(retried.job_id, original.job_id);

    let job = plane.wait_job(&retried.job_id, |j| j.status.is_terminal()).await;
    assert_eq!(job.operation, operation);
    assert_eq!(job.status, JobStatus::Completed);

    plane.shutdown().await;
}

// `_any` picks deterministically (smallest hostname) while callers
// must not depend on which agent runs it.
#[tokio::test(start_paused = true)]
async fn any_target_is_deterministic() {
    let mut plane = ControlPlane::start().await;
    plane.start_agent("web-02", &[]).await;
    plane.start_agent("web-01", &[]).await;

    for _ in 0..3 {
        let receipt = plane.dispatcher.submit(hostname_op(), Target::Any).await.unwrap();
        let job = plane.wait_job(&receipt.job_id, |j| j.status.is_terminal()).await;
        assert_eq!(job.resolved_hosts, vec![Hostname::from("web-01")]);
    }

    plane.shutdown().await;
}
