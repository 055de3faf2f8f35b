// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit trail interface.
//!
//! Mutating API calls record who did what. The KV-backed sink is the
//! shipped implementation; long-term audit storage beyond the bucket is
//! an external concern behind the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use osapi_bus::{BusError, KvBucket, MessageBus};
use osapi_core::{Clock, IdGen, JobId, Namespace};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a mutating call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    JobSubmitted,
    JobDeleted,
    JobRetried,
}

osapi_core::simple_display! {
    AuditAction {
        JobSubmitted => "job_submitted",
        JobDeleted => "job_deleted",
        JobRetried => "job_retried",
    }
}

/// One audit record, keyed by its own UUID in the audit bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Token subject of the caller.
    pub actor: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    pub timestamp_ms: u64,
}

/// Where audit entries go.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn record(
        &self,
        actor: &str,
        action: AuditAction,
        job_id: Option<&JobId>,
        detail: &str,
    ) -> Result<(), BusError>;
}

/// Audit sink writing to the `<ns>-audit-log` bucket.
pub struct KvAuditSink<C: Clock> {
    kv: Arc<dyn KvBucket>,
    ids: Arc<dyn IdGen>,
    clock: C,
}

impl<C: Clock> KvAuditSink<C> {
    pub fn new<B: MessageBus>(bus: &B, namespace: &Namespace, ids: Arc<dyn IdGen>, clock: C) -> Self {
        Self { kv: bus.kv(&namespace.audit_bucket()), ids, clock }
    }
}

#[async_trait]
impl<C: Clock> AuditSink for KvAuditSink<C> {
    async fn record(
        &self,
        actor: &str,
        action: AuditAction,
        job_id: Option<&JobId>,
        detail: &str,
    ) -> Result<(), BusError> {
        let entry = AuditEntry {
            id: self.ids.generate(),
            actor: actor.to_string(),
            action,
            job_id: job_id.cloned(),
            detail: detail.to_string(),
            timestamp_ms: self.clock.epoch_ms(),
        };
        let value = serde_json::to_vec(&entry)?;
        self.kv.put(&entry.id, Bytes::from(value)).await?;
        tracing::debug!(actor = %entry.actor, action = %entry.action, "audit entry recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osapi_bus::{KvSpec, MemoryBus};
    use osapi_core::id::SeqIdGen;
    use osapi_core::FakeClock;

    #[tokio::test]
    async fn records_entries_into_the_audit_bucket() {
        let bus = MemoryBus::new();
        let ns = Namespace::new("osapi").unwrap();
        bus.ensure_kv(KvSpec { bucket: ns.audit_bucket(), ttl: None }).await.unwrap();

        let clock = FakeClock::new();
        let sink = KvAuditSink::new(&bus, &ns, Arc::new(SeqIdGen::new("audit")), clock.clone());

        clock.set_epoch_ms(5_000);
        sink.record("ops@example", AuditAction::JobSubmitted, Some(&"job-1".into()), "target _all")
            .await
            .unwrap();

        let kv = bus.kv(&ns.audit_bucket());
        let entry = kv.get("audit-0000").await.unwrap().unwrap();
        let parsed: AuditEntry = serde_json::from_slice(&entry.value).unwrap();
        assert_eq!(parsed.actor, "ops@example");
        assert_eq!(parsed.action, AuditAction::JobSubmitted);
        assert_eq!(parsed.job_id, Some("job-1".into()));
        assert_eq!(parsed.timestamp_ms, 5_000);
    }
}
