// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent work loop.

use crate::config::AgentConfig;
use crate::error::AgentError;
use bytes::Bytes;
use osapi_bus::{BusError, ConsumerSpec, Delivery, MessageBus};
use osapi_core::envelope::headers;
use osapi_core::{
    AgentInfo, AgentResponse, Clock, Hostname, JobEnvelope, JobId, Namespace, TimelineEvent,
    WorkerState,
};
use osapi_dispatch::JobStore;
use osapi_handlers::{facts::FactsReader, HandlerError, HandlerRegistry};
use osapi_registry::{Heartbeat, Registry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// How long the drain phase waits after the grace deadline for abandoned
/// handlers to notice cancellation.
const ABANDON_WAIT: Duration = Duration::from_secs(1);

/// One host's agent. Clones share every handle.
pub struct AgentRuntime<B: MessageBus, C: Clock> {
    bus: Arc<B>,
    store: JobStore<C>,
    registry: Registry,
    handlers: Arc<HandlerRegistry>,
    namespace: Namespace,
    hostname: Hostname,
    config: AgentConfig,
    facts: FactsReader,
    clock: C,
    started_at_ms: u64,
}

impl<B: MessageBus, C: Clock> Clone for AgentRuntime<B, C> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            handlers: self.handlers.clone(),
            namespace: self.namespace.clone(),
            hostname: self.hostname.clone(),
            config: self.config.clone(),
            facts: self.facts.clone(),
            clock: self.clock.clone(),
            started_at_ms: self.started_at_ms,
        }
    }
}

impl<B: MessageBus, C: Clock> AgentRuntime<B, C> {
    pub fn new(
        bus: Arc<B>,
        namespace: Namespace,
        hostname: Hostname,
        handlers: Arc<HandlerRegistry>,
        config: AgentConfig,
        clock: C,
    ) -> Self {
        let store = JobStore::new(bus.as_ref(), &namespace, clock.clone());
        let registry = Registry::new(bus.as_ref(), &namespace);
        let started_at_ms = clock.epoch_ms();
        Self {
            bus,
            store,
            registry,
            handlers,
            namespace,
            hostname,
            config,
            facts: FactsReader::new(),
            clock,
            started_at_ms,
        }
    }

    /// Swap the facts source (tests point it at a fixture root).
    pub fn with_facts(mut self, facts: FactsReader) -> Self {
        self.facts = facts;
        self
    }

    fn make_info(&self) -> AgentInfo {
        AgentInfo {
            hostname: self.hostname.clone(),
            labels: self.config.agent.labels.clone(),
            os_info: self.facts.os_info(),
            load_average: self.facts.load_average(),
            memory: self.facts.memory(),
            uptime_secs: self.facts.uptime_secs(),
            started_at_ms: self.started_at_ms,
            registered_at_ms: self.clock.epoch_ms(),
        }
    }

    fn backoff_delay(&self, attempt: u64) -> Duration {
        let ladder = self.config.backoff();
        let index = (attempt.max(1) - 1) as usize;
        ladder[index.min(ladder.len() - 1)]
    }

    /// Run until cancelled: register + heartbeat, answer probes, consume
    /// and execute. Returns only on cancellation or a dead bus.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AgentError> {
        tracing::info!(
            hostname = %self.hostname,
            namespace = %self.namespace,
            operations = ?self.handlers.operations(),
            "agent starting"
        );

        let heartbeat = {
            let runtime = self.clone();
            let heartbeat =
                Heartbeat::new(self.registry.clone(), self.config.registry_ttl());
            let cancel = cancel.clone();
            tokio::spawn(async move {
                heartbeat.run(move || runtime.make_info(), cancel).await;
            })
        };

        let probe = {
            let runtime = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { runtime.probe_loop(cancel).await })
        };

        let mut deliveries = self
            .bus
            .consume(ConsumerSpec {
                stream: self.namespace.jobs_stream(),
                durable: self.namespace.agent_durable(&self.hostname),
                filter_subject: self.namespace.agent_filter(&self.hostname),
                max_deliver: self.config.consumer.max_deliver,
                ack_wait: self.config.ack_wait(),
                max_ack_pending: self.config.consumer.max_ack_pending,
            })
            .await?;

        let pool = Arc::new(Semaphore::new(self.config.agent.max_jobs.max(1)));
        let tracker = TaskTracker::new();
        let handler_cancel = CancellationToken::new();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else {
                        break Err(AgentError::from(BusError::Closed));
                    };
                    // Bounded pool: intake waits for a slot; the
                    // consumer's max_ack_pending caps what piles up here.
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => break Ok(()),
                        permit = pool.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break Err(AgentError::from(BusError::Closed)),
                        },
                    };
                    let runtime = self.clone();
                    let child = handler_cancel.child_token();
                    tracker.spawn(async move {
                        runtime.process(delivery, child).await;
                        drop(permit);
                    });
                }
            }
        };

        // Cooperative drain: stop intake, give in-flight handlers the
        // grace window, then cancel stragglers. Their unacked messages
        // redeliver after ack-wait.
        tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace(), tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!("shutdown grace exceeded, cancelling in-flight handlers");
            handler_cancel.cancel();
            let _ = tokio::time::timeout(ABANDON_WAIT, tracker.wait()).await;
        }
        let _ = heartbeat.await;
        let _ = probe.await;
        tracing::info!(hostname = %self.hostname, "agent stopped");
        result
    }

    /// Answer live-probe requests with current metadata.
    async fn probe_loop(&self, cancel: CancellationToken) {
        let subject = self.namespace.registry_probe_subject(&self.hostname);
        let mut rx = match self.bus.subscribe(&subject).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "probe subscription failed; live probes disabled");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                msg = rx.recv() => {
                    let Some(msg) = msg else { return };
                    let Some(reply) = msg.reply else { continue };
                    match serde_json::to_vec(&self.make_info()) {
                        Ok(payload) => {
                            if let Err(e) =
                                self.bus.publish(&reply, &[], Bytes::from(payload)).await
                            {
                                tracing::warn!(error = %e, "probe reply failed");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "probe serialize failed"),
                    }
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery, cancel: CancellationToken) {
        let attempt = delivery.delivery_attempt;
        let trace_id = delivery
            .header(headers::TRACE_ID)
            .unwrap_or("-")
            .to_string();

        let envelope = match JobEnvelope::parse(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    subject = %delivery.subject,
                    error = %e,
                    "malformed envelope terminated"
                );
                // Leave a trace on the record when the job id header
                // survived the corruption.
                if let Some(job_id) = delivery.header(headers::JOB_ID).map(JobId::from) {
                    let host = self.hostname.clone();
                    let error = e.to_string();
                    let _ = self
                        .store
                        .mutate(&job_id, |job, now| {
                            job.append_timeline(
                                TimelineEvent::Malformed,
                                Some(&host),
                                "envelope parse failed",
                                Some(&error),
                                now,
                            );
                            true
                        })
                        .await;
                }
                let _ = delivery.term().await;
                return;
            }
        };

        let span = tracing::info_span!(
            "job",
            job = %envelope.job_id,
            trace = %trace_id,
            host = %self.hostname,
            operation = %envelope.operation,
            attempt,
        );
        self.execute(envelope, delivery, cancel).instrument(span).await;
    }

    async fn execute(&self, envelope: JobEnvelope, delivery: Delivery, cancel: CancellationToken) {
        let attempt = delivery.delivery_attempt;
        self.mark(&envelope.job_id, WorkerState::acknowledged()).await;

        let Some(handler) = self.handlers.get(envelope.operation.kind()) else {
            // Response-level failure, acked: redelivery cannot conjure a
            // handler this host does not carry.
            let error = format!("unknown operation: {}", envelope.operation.kind());
            tracing::warn!(%error, "operation has no handler on this host");
            self.finish(&envelope, Err(HandlerError::Failed(error)), delivery).await;
            return;
        };

        if let Err(e) = handler.validate(&envelope.operation) {
            self.finish(&envelope, Err(e), delivery).await;
            return;
        }

        self.mark(&envelope.job_id, WorkerState::started(self.clock.epoch_ms())).await;

        let budget = handler.timeout(&envelope.operation);
        let outcome = tokio::select! {
            // Shutdown abandoned us past the grace deadline: leave the
            // delivery unresolved so the bus redelivers after ack-wait.
            _ = cancel.cancelled() => {
                tracing::info!("handler abandoned at shutdown deadline");
                return;
            }
            result = tokio::time::timeout(budget, handler.execute(&envelope.operation)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(HandlerError::Timeout),
                }
            }
        };

        tracing::debug!(attempt, ok = outcome.is_ok(), "handler finished");
        self.finish(&envelope, outcome, delivery).await;
    }

    /// Publish the response, fold it into the job record, resolve the
    /// delivery.
    async fn finish(
        &self,
        envelope: &JobEnvelope,
        outcome: Result<Value, HandlerError>,
        delivery: Delivery,
    ) {
        let attempt = delivery.delivery_attempt;
        let now = self.clock.epoch_ms();
        let (response, transient) = match outcome {
            Ok(data) => (
                AgentResponse::ok(envelope.job_id.clone(), self.hostname.clone(), data, now),
                false,
            ),
            Err(e) => {
                let transient = e.is_transient();
                (
                    AgentResponse::failed(
                        envelope.job_id.clone(),
                        self.hostname.clone(),
                        e.to_string(),
                        now,
                    ),
                    transient,
                )
            }
        };

        let subject = self
            .namespace
            .responses_subject(&envelope.job_id, &self.hostname);
        match serde_json::to_vec(&response) {
            Ok(payload) => {
                if let Err(e) = self.bus.publish(&subject, &[], Bytes::from(payload)).await {
                    tracing::warn!(error = %e, "response publish failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "response serialize failed"),
        }

        // Direct CAS merge as well: the aggregator path and this one are
        // idempotent against each other.
        let merge = response.clone();
        let merged = self
            .store
            .mutate(&envelope.job_id, |job, now| job.apply_response(merge.clone(), now))
            .await;
        if let Err(e) = merged {
            tracing::debug!(error = %e, "local response merge skipped");
        }

        if transient {
            let delay = self.backoff_delay(attempt);
            tracing::info!(attempt, delay_secs = delay.as_secs(), "transient failure, nak for redelivery");
            let _ = delivery.nak(delay).await;
        } else if let Err(e) = delivery.ack().await {
            tracing::warn!(error = %e, "ack failed; message will redeliver");
        }
    }

    /// Best-effort worker-state CAS. A missing record (deleted mid-flight
    /// or TTL-expired) does not stop execution: delete does not cancel
    /// in-flight work.
    async fn mark(&self, job_id: &JobId, state: WorkerState) {
        let host = self.hostname.clone();
        let result = self
            .store
            .mutate(job_id, |job, now| job.apply_worker_state(&host, state.clone(), now))
            .await;
        if let Err(e) = result {
            tracing::debug!(job = %job_id, error = %e, "worker state update skipped");
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
