// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response aggregation task.
//!
//! Subscribes to `<ns>.responses.>` and folds each agent response into
//! the job record via CAS. Responses for deleted or expired jobs are
//! dropped; replays merge idempotently because the per-host state
//! machine refuses regressions.

use crate::error::{DispatchError, StoreError};
use crate::store::JobStore;
use bytes::Bytes;
use osapi_bus::{InboundMessage, KvBucket, MessageBus};
use osapi_core::{AgentResponse, Clock, Namespace, TimelineEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dispatcher-side aggregator. One instance per server process.
pub struct Aggregator<B: MessageBus, C: Clock> {
    bus: Arc<B>,
    store: JobStore<C>,
    responses: Arc<dyn KvBucket>,
    namespace: Namespace,
}

impl<B: MessageBus, C: Clock> Aggregator<B, C> {
    pub fn new(bus: Arc<B>, namespace: Namespace, clock: C) -> Self {
        let store = JobStore::new(bus.as_ref(), &namespace, clock);
        let responses = bus.kv(&namespace.responses_bucket());
        Self { bus, store, responses, namespace }
    }

    /// Run until cancelled. Returns early only if the subscription can't
    /// be established or the bus closes underneath us.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DispatchError> {
        let mut rx = self
            .bus
            .subscribe(&self.namespace.responses_wildcard())
            .await?;
        tracing::info!(namespace = %self.namespace, "response aggregator started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("response aggregator stopping");
                    return Ok(());
                }
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.handle(msg).await,
                        None => return Err(DispatchError::BusUnavailable(
                            "responses subscription closed".to_string(),
                        )),
                    }
                }
            }
        }
    }

    async fn handle(&self, msg: InboundMessage) {
        let response: AgentResponse = match serde_json::from_slice(&msg.payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(subject = %msg.subject, error = %e, "unparseable response dropped");
                return;
            }
        };
        let job_id = response.job_id.clone();
        let host = response.hostname.clone();

        // Write-through copy for operator tooling; the job record is the
        // source of truth, so a failure here only logs.
        let key = format!("{job_id}.{host}");
        match serde_json::to_vec(&response) {
            Ok(value) => {
                if let Err(e) = self.responses.put(&key, Bytes::from(value)).await {
                    tracing::warn!(job = %job_id, host = %host, error = %e, "responses bucket write failed");
                }
            }
            Err(e) => tracing::warn!(job = %job_id, error = %e, "response re-serialize failed"),
        }

        let merge = self
            .store
            .mutate(&job_id, |job, now| job.apply_response(response.clone(), now))
            .await;
        match merge {
            Ok((job, _)) => {
                tracing::debug!(job = %job_id, host = %host, status = %job.status, "response aggregated");
            }
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(job = %job_id, host = %host, "response for unknown or expired job dropped");
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::error!(job = %job_id, host = %host, "response merge lost every CAS attempt");
                // Leave a trace on the record so the loss is visible.
                let error = response.error.clone();
                let _ = self
                    .store
                    .mutate(&job_id, |job, now| {
                        job.append_timeline(
                            TimelineEvent::AggregationDropped,
                            Some(&host),
                            "response merge exhausted CAS retries",
                            error.as_deref(),
                            now,
                        );
                        true
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(job = %job_id, host = %host, error = %e, "response merge failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
