// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker topology: the streams and buckets one deployment needs.
//!
//! Idempotent; both the server and every agent run this at startup so
//! whichever process comes up first materializes the deployment.

use osapi_bus::{BusError, KvSpec, MessageBus, StreamSpec};
use osapi_core::Namespace;
use std::time::Duration;

/// Retention knobs for one deployment's streams and buckets.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Jobs stream message age cap (redelivery horizon).
    pub jobs_max_age: Duration,
    /// Publish dedup window for `Nats-Msg-Id`.
    pub duplicate_window: Duration,
    /// DLQ advisory retention.
    pub dlq_max_age: Duration,
    /// Job record retention (hours to days).
    pub job_ttl: Duration,
    /// Response write-through retention (short).
    pub response_ttl: Duration,
    /// Agent liveness window.
    pub registry_ttl: Duration,
    /// Audit entry retention (long).
    pub audit_ttl: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            jobs_max_age: Duration::from_secs(24 * 3600),
            duplicate_window: Duration::from_secs(120),
            dlq_max_age: Duration::from_secs(7 * 24 * 3600),
            job_ttl: Duration::from_secs(24 * 3600),
            response_ttl: Duration::from_secs(3600),
            registry_ttl: Duration::from_secs(30),
            audit_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Create (idempotently) the jobs stream, the DLQ stream, and the four
/// KV buckets.
pub async fn ensure_topology<B: MessageBus>(
    bus: &B,
    namespace: &Namespace,
    config: &TopologyConfig,
) -> Result<(), BusError> {
    bus.ensure_stream(StreamSpec {
        name: namespace.jobs_stream(),
        subjects: vec![namespace.jobs_wildcard()],
        work_queue: true,
        max_age: config.jobs_max_age,
        duplicate_window: config.duplicate_window,
    })
    .await?;

    bus.ensure_stream(StreamSpec {
        name: namespace.dlq_stream(),
        subjects: vec![namespace.dlq_advisory_subject()],
        work_queue: false,
        max_age: config.dlq_max_age,
        duplicate_window: Duration::ZERO,
    })
    .await?;

    bus.ensure_kv(KvSpec { bucket: namespace.jobs_bucket(), ttl: Some(config.job_ttl) })
        .await?;
    bus.ensure_kv(KvSpec {
        bucket: namespace.responses_bucket(),
        ttl: Some(config.response_ttl),
    })
    .await?;
    bus.ensure_kv(KvSpec {
        bucket: namespace.registry_bucket(),
        ttl: Some(config.registry_ttl),
    })
    .await?;
    bus.ensure_kv(KvSpec { bucket: namespace.audit_bucket(), ttl: Some(config.audit_ttl) })
        .await?;

    tracing::info!(namespace = %namespace, "broker topology ensured");
    Ok(())
}
