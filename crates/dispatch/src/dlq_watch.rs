// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DLQ advisory watcher.
//!
//! Consumes the max-deliveries advisories captured on the DLQ stream,
//! resolves each back to its original envelope, and marks the host
//! dead-lettered on the job record. The agent never touches the DLQ;
//! persistence of the advisory is the broker's job, folding it into job
//! state is ours.

use crate::error::{DispatchError, StoreError};
use crate::store::JobStore;
use osapi_bus::{ConsumerSpec, Delivery, MaxDeliverAdvisory, MessageBus};
use osapi_core::{Clock, JobEnvelope, Namespace, TimelineEvent, WorkerState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DLQ_MAX_DELIVER: i64 = 5;
const DLQ_ACK_WAIT: Duration = Duration::from_secs(30);
const DLQ_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Dispatcher-side DLQ folding task. One instance per server process.
pub struct DlqWatcher<B: MessageBus, C: Clock> {
    bus: Arc<B>,
    store: JobStore<C>,
    namespace: Namespace,
}

impl<B: MessageBus, C: Clock> DlqWatcher<B, C> {
    pub fn new(bus: Arc<B>, namespace: Namespace, clock: C) -> Self {
        let store = JobStore::new(bus.as_ref(), &namespace, clock);
        Self { bus, store, namespace }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), DispatchError> {
        let mut rx = self
            .bus
            .consume(ConsumerSpec {
                stream: self.namespace.dlq_stream(),
                durable: self.namespace.dlq_durable(),
                filter_subject: self.namespace.dlq_advisory_subject(),
                max_deliver: DLQ_MAX_DELIVER,
                ack_wait: DLQ_ACK_WAIT,
                max_ack_pending: 64,
            })
            .await?;
        tracing::info!(namespace = %self.namespace, "dlq watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("dlq watcher stopping");
                    return Ok(());
                }
                delivery = rx.recv() => {
                    match delivery {
                        Some(delivery) => self.handle(delivery).await,
                        None => return Err(DispatchError::BusUnavailable(
                            "dlq consumer closed".to_string(),
                        )),
                    }
                }
            }
        }
    }

    async fn handle(&self, delivery: Delivery) {
        let advisory = match MaxDeliverAdvisory::parse(&delivery.payload) {
            Ok(advisory) => advisory,
            Err(e) => {
                tracing::warn!(subject = %delivery.subject, error = %e, "unparseable advisory terminated");
                let _ = delivery.term().await;
                return;
            }
        };

        let original = self
            .bus
            .stream_message(&advisory.stream, advisory.stream_seq)
            .await;
        let envelope = match original {
            Ok(Some((_, payload))) => match JobEnvelope::parse(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(seq = advisory.stream_seq, error = %e, "dead-lettered envelope unparseable");
                    let _ = delivery.term().await;
                    return;
                }
            },
            Ok(None) => {
                // Original aged out of the stream; nothing to fold.
                tracing::debug!(seq = advisory.stream_seq, "dead-lettered message no longer in stream");
                let _ = delivery.ack().await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stream lookup for advisory failed, will retry");
                let _ = delivery.nak(DLQ_RETRY_DELAY).await;
                return;
            }
        };

        let job_id = envelope.job_id.clone();
        let host = envelope.target.clone();
        let deliveries = advisory.deliveries;
        let merge = self
            .store
            .mutate(&job_id, |job, now| {
                let changed =
                    job.apply_worker_state(&host, WorkerState::dead_letter(now), now);
                if changed {
                    job.append_timeline(
                        TimelineEvent::DeadLetter,
                        Some(&host),
                        &format!("exhausted {deliveries} deliveries"),
                        None,
                        now,
                    );
                }
                changed
            })
            .await;
        match merge {
            Ok(_) | Err(StoreError::NotFound(_)) => {
                tracing::warn!(job = %job_id, host = %host, deliveries, "host dead-lettered");
                let _ = delivery.ack().await;
            }
            Err(e) => {
                tracing::warn!(job = %job_id, host = %host, error = %e, "dead-letter merge failed, will retry");
                let _ = delivery.nak(DLQ_RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "dlq_watch_tests.rs"]
mod tests;
