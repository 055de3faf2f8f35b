// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and metrics view.
//!
//! Pull-based probes over live bus and KV state, each bounded by a short
//! timeout. A failing probe degrades its component and the aggregate;
//! only an unreachable bus makes the whole report unhealthy.

use crate::state::AppState;
use osapi_bus::MessageBus;
use osapi_core::Clock;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl ComponentHealth {
    fn ok(name: &'static str, detail: Value) -> Self {
        Self { name, status: HealthStatus::Healthy, error: None, detail }
    }

    fn failed(name: &'static str, status: HealthStatus, error: String) -> Self {
        Self { name, status, error: Some(error), detail: Value::Null }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn serving(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

/// Bound a probe future; both timeout and probe error collapse to a
/// component error string.
async fn probe<T, E, F>(fut: F) -> Result<T, String>
where
    E: std::fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(PROBE_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("probe timed out after {PROBE_TIMEOUT:?}")),
    }
}

/// Readiness: can we reach the broker right now.
pub async fn ready<B: MessageBus, C: Clock>(state: &AppState<B, C>) -> bool {
    probe(state.bus.ping()).await.is_ok()
}

/// Full aggregated report for `GET /health/status`.
pub async fn report<B: MessageBus, C: Clock>(state: &AppState<B, C>) -> HealthReport {
    let mut components = Vec::new();

    // Broker connectivity is the one hard dependency.
    match probe(state.bus.ping()).await {
        Ok(health) => components.push(ComponentHealth::ok(
            "bus",
            json!({
                "url": health.url,
                "server_version": health.server_version,
                "rtt_ms": health.rtt.as_millis() as u64,
            }),
        )),
        Err(e) => components.push(ComponentHealth::failed("bus", HealthStatus::Unhealthy, e)),
    }

    for (name, stream) in [
        ("jobs_stream", state.namespace.jobs_stream()),
        ("dlq_stream", state.namespace.dlq_stream()),
    ] {
        match probe(state.bus.stream_stats(&stream)).await {
            Ok(stats) => components.push(ComponentHealth::ok(
                name,
                json!({
                    "messages": stats.messages,
                    "bytes": stats.bytes,
                    "consumers": stats.consumer_count,
                }),
            )),
            Err(e) => components.push(ComponentHealth::failed(name, HealthStatus::Degraded, e)),
        }
    }

    for (name, bucket) in [
        ("jobs_bucket", state.namespace.jobs_bucket()),
        ("responses_bucket", state.namespace.responses_bucket()),
        ("registry_bucket", state.namespace.registry_bucket()),
        ("audit_bucket", state.namespace.audit_bucket()),
    ] {
        match probe(state.bus.kv(&bucket).stats()).await {
            Ok(stats) => {
                components.push(ComponentHealth::ok(name, json!({ "entries": stats.entries })));
            }
            Err(e) => components.push(ComponentHealth::failed(name, HealthStatus::Degraded, e)),
        }
    }

    match probe(state.dispatcher.queue_summary()).await {
        Ok(summary) => components.push(ComponentHealth::ok(
            "queue",
            json!({
                "total_jobs": summary.total_jobs,
                "by_status": summary.by_status,
                "dlq_messages": summary.dlq_messages,
            }),
        )),
        Err(e) => components.push(ComponentHealth::failed("queue", HealthStatus::Degraded, e)),
    }

    match probe(state.dispatcher.list_agents()).await {
        Ok(snapshot) => {
            // Per-host consumer counters, aggregated across the fleet.
            let mut pending = 0u64;
            let mut ack_pending = 0u64;
            let mut redelivered = 0u64;
            for host in snapshot.hostnames() {
                if let Ok(stats) = probe(state.bus.consumer_stats(
                    &state.namespace.jobs_stream(),
                    &state.namespace.agent_durable(&host),
                ))
                .await
                {
                    pending += stats.pending;
                    ack_pending += stats.ack_pending;
                    redelivered += stats.redelivered;
                }
            }
            components.push(ComponentHealth::ok(
                "agents",
                json!({
                    "registered": snapshot.agents.len(),
                    "malformed": snapshot.malformed.len(),
                    "consumer_pending": pending,
                    "consumer_ack_pending": ack_pending,
                    "consumer_redelivered": redelivered,
                }),
            ));
        }
        Err(e) => components.push(ComponentHealth::failed("agents", HealthStatus::Degraded, e)),
    }

    let status = components
        .iter()
        .map(|c| c.status)
        .max_by_key(|s| match s {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        })
        .unwrap_or(HealthStatus::Healthy);

    HealthReport { status, components }
}
