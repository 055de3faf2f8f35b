// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: API-side job operations.

use crate::error::DispatchError;
use crate::store::JobStore;
use bytes::Bytes;
use osapi_bus::{BusError, MessageBus};
use osapi_core::envelope::headers;
use osapi_core::{
    AgentInfo, Clock, Hostname, IdGen, Job, JobEnvelope, JobId, JobStatus, Namespace, Operation,
    Target, TimelineEvent, WorkerState,
};
use osapi_handlers::HandlerRegistry;
use osapi_registry::{Registry, RegistrySnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Live-probe budget for `GET /agents/{hostname}`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Returned by submit and retry.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub revision: u64,
}

/// One page of the job listing.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub items: Vec<Job>,
    /// Exact count after the status filter, before pagination.
    pub total_items: usize,
}

/// Counts for `GET /jobs/queue`.
#[derive(Debug, Clone, Default)]
pub struct QueueSummary {
    pub total_jobs: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_operation: BTreeMap<String, u64>,
    pub dlq_messages: u64,
}

/// Agent detail with freshness marker.
#[derive(Debug, Clone)]
pub struct AgentProbe {
    pub info: AgentInfo,
    /// True when the live probe went unanswered and this is the registry
    /// snapshot instead.
    pub stale: bool,
}

/// API-side dispatcher. Clones share the bus handle and store.
pub struct Dispatcher<B: MessageBus, C: Clock> {
    bus: Arc<B>,
    store: JobStore<C>,
    registry: Registry,
    validators: Arc<HandlerRegistry>,
    namespace: Namespace,
    clock: C,
    ids: Arc<dyn IdGen>,
}

impl<B: MessageBus, C: Clock> Clone for Dispatcher<B, C> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            validators: self.validators.clone(),
            namespace: self.namespace.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<B: MessageBus, C: Clock> Dispatcher<B, C> {
    pub fn new(
        bus: Arc<B>,
        namespace: Namespace,
        validators: Arc<HandlerRegistry>,
        clock: C,
        ids: Arc<dyn IdGen>,
    ) -> Self {
        let store = JobStore::new(bus.as_ref(), &namespace, clock.clone());
        let registry = Registry::new(bus.as_ref(), &namespace);
        Self { bus, store, registry, validators, namespace, clock, ids }
    }

    pub fn store(&self) -> &JobStore<C> {
        &self.store
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Submit one job: resolve, persist, fan out.
    ///
    /// Publish failures to a subset of hosts are recorded per host and do
    /// not fail the submission; zero successful publishes rolls the
    /// record back and surfaces `bus_unavailable`.
    pub async fn submit(
        &self,
        operation: Operation,
        target: Target,
    ) -> Result<SubmitReceipt, DispatchError> {
        operation
            .validate()
            .map_err(|e| DispatchError::BadRequest(e.to_string()))?;
        self.validators
            .validate(&operation)
            .map_err(|e| DispatchError::BadRequest(e.to_string()))?;

        let hosts = self.registry.resolve(&target).await?;
        let id = JobId::new(self.ids.generate());
        let now = self.clock.epoch_ms();
        let job = Job::new(id.clone(), operation.clone(), target, hosts.clone(), now);
        self.store.create(&job).await?;

        let trace_id = self.ids.generate();
        tracing::info!(job = %id, trace = %trace_id, hosts = hosts.len(), operation = %operation, "job submitted");

        let mut outcomes: Vec<(Hostname, Result<(), String>)> = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let subject = self.namespace.jobs_subject(host, operation.kind());
            let envelope = JobEnvelope::new(
                id.clone(),
                operation.clone(),
                host.clone(),
                self.clock.epoch_ms(),
            );
            let publish_headers = vec![
                (headers::JOB_ID.to_string(), id.to_string()),
                (headers::TRACE_ID.to_string(), trace_id.clone()),
                (headers::MSG_ID.to_string(), envelope.msg_id()),
            ];
            let payload =
                serde_json::to_vec(&envelope).map_err(|e| DispatchError::Internal(e.to_string()))?;

            match self
                .bus
                .publish_durable(&subject, &publish_headers, Bytes::from(payload))
                .await
            {
                Ok(()) => {
                    tracing::debug!(job = %id, host = %host, subject = %subject, "envelope dispatched");
                    outcomes.push((host.clone(), Ok(())));
                }
                Err(e) => {
                    tracing::warn!(job = %id, host = %host, error = %e, "envelope publish failed");
                    outcomes.push((host.clone(), Err(e.to_string())));
                }
            }
        }

        let published = outcomes.iter().filter(|(_, r)| r.is_ok()).count();
        if published == 0 {
            // A job only exists once at least one envelope is out.
            let _ = self.store.delete(&id).await;
            let reason = outcomes
                .iter()
                .find_map(|(_, r)| r.as_ref().err().cloned())
                .unwrap_or_else(|| "no envelope published".to_string());
            return Err(DispatchError::BusUnavailable(reason));
        }

        let (job, revision) = self
            .store
            .mutate(&id, |job, now| {
                for (host, result) in &outcomes {
                    match result {
                        Ok(()) => job.append_timeline(
                            TimelineEvent::Dispatched,
                            Some(host),
                            "",
                            None,
                            now,
                        ),
                        Err(err) => {
                            job.apply_worker_state(
                                host,
                                WorkerState::failed(err.clone(), now),
                                now,
                            );
                            job.append_timeline(
                                TimelineEvent::DispatchFailed,
                                Some(host),
                                "",
                                Some(err),
                                now,
                            );
                        }
                    }
                }
                true
            })
            .await?;

        Ok(SubmitReceipt { job_id: id, status: job.status, revision })
    }

    /// Current snapshot; status is re-derived on read so a racing update
    /// can never show a stale terminal state.
    pub async fn get(&self, id: &JobId) -> Result<Job, DispatchError> {
        let (mut job, _) = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(id.clone()))?;
        job.status = JobStatus::derive(&job.resolved_hosts, &job.worker_states);
        Ok(job)
    }

    /// Paginated listing, newest first. `total_items` counts everything
    /// matching the filter.
    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<JobPage, DispatchError> {
        let mut jobs = self.store.list().await?;
        for job in &mut jobs {
            job.status = JobStatus::derive(&job.resolved_hosts, &job.worker_states);
        }
        if let Some(status) = status {
            jobs.retain(|j| j.status == status);
        }
        jobs.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total_items = jobs.len();
        let items = jobs.into_iter().skip(offset).take(limit).collect();
        Ok(JobPage { items, total_items })
    }

    /// Remove the record. In-flight agent work is not cancelled; late
    /// responses for a deleted job are dropped by the aggregator.
    pub async fn delete(&self, id: &JobId) -> Result<(), DispatchError> {
        self.store.delete(id).await?;
        tracing::info!(job = %id, "job deleted");
        Ok(())
    }

    /// Re-dispatch as a new job with the original operation and either
    /// the original or an overridden target.
    pub async fn retry(
        &self,
        id: &JobId,
        target_override: Option<Target>,
    ) -> Result<SubmitReceipt, DispatchError> {
        let original = self.get(id).await?;
        let target = target_override.unwrap_or_else(|| original.target.clone());
        let receipt = self.submit(original.operation.clone(), target).await?;

        // Cross-link on the original, best effort: the new job stands on
        // its own even if this CAS loses.
        let new_id = receipt.job_id.clone();
        let _ = self
            .store
            .mutate(id, |job, now| {
                job.append_timeline(
                    TimelineEvent::Retried,
                    None,
                    &format!("retried as {new_id}"),
                    None,
                    now,
                );
                true
            })
            .await;

        Ok(receipt)
    }

    /// Counts by status, DLQ depth, and operation-type histogram.
    pub async fn queue_summary(&self) -> Result<QueueSummary, DispatchError> {
        let jobs = self.store.list().await?;
        let mut summary = QueueSummary {
            total_jobs: jobs.len() as u64,
            ..QueueSummary::default()
        };
        for job in &jobs {
            let status = JobStatus::derive(&job.resolved_hosts, &job.worker_states);
            *summary.by_status.entry(status.to_string()).or_insert(0) += 1;
            *summary
                .by_operation
                .entry(job.operation.kind().to_string())
                .or_insert(0) += 1;
        }
        summary.dlq_messages = self
            .bus
            .stream_stats(&self.namespace.dlq_stream())
            .await
            .map(|s| s.messages)
            .map_err(DispatchError::from)?;
        Ok(summary)
    }

    /// Live registry snapshot.
    pub async fn list_agents(&self) -> Result<RegistrySnapshot, DispatchError> {
        Ok(self.registry.snapshot().await?)
    }

    /// Agent detail: live probe over the bus, registry snapshot fallback.
    pub async fn probe_agent(&self, host: &Hostname) -> Result<AgentProbe, DispatchError> {
        let subject = self.namespace.registry_probe_subject(host);
        match self
            .bus
            .request(&subject, Bytes::from_static(b"{}"), PROBE_TIMEOUT)
            .await
        {
            Ok(payload) => match serde_json::from_slice::<AgentInfo>(&payload) {
                Ok(info) => return Ok(AgentProbe { info, stale: false }),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "unparseable probe reply, using snapshot");
                }
            },
            Err(BusError::NoResponders(_)) | Err(BusError::Timeout { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        match self.registry.get(host).await.map_err(DispatchError::from)? {
            Some(info) => Ok(AgentProbe { info, stale: true }),
            None => Err(DispatchError::NoSuchAgent(host.clone())),
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
