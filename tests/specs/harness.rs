// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-stack in-process control plane for scenario tests.

use osapi_agent::{AgentConfig, AgentRuntime};
use osapi_bus::{MemoryBus, MessageBus};
use osapi_core::id::SeqIdGen;
use osapi_core::{FakeClock, Hostname, Job, JobId, Namespace};
use osapi_dispatch::{ensure_topology, Aggregator, Dispatcher, DlqWatcher, TopologyConfig};
use osapi_handlers::HandlerRegistry;
use osapi_registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ControlPlane {
    pub bus: MemoryBus,
    pub namespace: Namespace,
    pub clock: FakeClock,
    pub dispatcher: Dispatcher<MemoryBus, FakeClock>,
    pub registry: Registry,
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ControlPlane {
    /// Topology + aggregator + DLQ watcher, no agents yet.
    pub async fn start() -> Self {
        let bus = MemoryBus::new();
        let namespace = Namespace::new("osapi").unwrap();
        ensure_topology(&bus, &namespace, &TopologyConfig::default())
            .await
            .unwrap();

        let clock = FakeClock::new();
        let dispatcher = Dispatcher::new(
            Arc::new(bus.clone()),
            namespace.clone(),
            Arc::new(HandlerRegistry::builtin("dispatcher".into())),
            clock.clone(),
            Arc::new(SeqIdGen::new("job")),
        );
        let registry = Registry::new(&bus, &namespace);

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        {
            let aggregator = Aggregator::new(
                Arc::new(bus.clone()),
                namespace.clone(),
                clock.clone(),
            );
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let _ = aggregator.run(cancel).await;
            }));
        }
        {
            let watcher =
                DlqWatcher::new(Arc::new(bus.clone()), namespace.clone(), clock.clone());
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let _ = watcher.run(cancel).await;
            }));
        }

        Self { bus, namespace, clock, dispatcher, registry, cancel, tasks }
    }

    /// Start an agent with the built-in handler set. Returns its stop
    /// token; the harness also stops it at shutdown.
    pub async fn start_agent(&mut self, hostname: &str, labels: &[(&str, &str)]) -> CancellationToken {
        self.start_agent_with(hostname, labels, HandlerRegistry::builtin(hostname.into()))
            .await
    }

    /// Start an agent with a custom handler set and wait until it
    /// appears in the registry.
    pub async fn start_agent_with(
        &mut self,
        hostname: &str,
        labels: &[(&str, &str)],
        handlers: HandlerRegistry,
    ) -> CancellationToken {
        let mut config = AgentConfig::default();
        // Compressed redelivery timings so scenarios resolve inside the
        // polling budget; the production ladder is covered by config
        // tests.
        config.consumer.ack_wait_secs = 5;
        config.consumer.backoff_secs = vec![1, 2, 3];
        config.agent.shutdown_grace_secs = 2;
        for (key, value) in labels {
            config.agent.labels.insert(key.to_string(), value.to_string());
        }

        let runtime = AgentRuntime::new(
            Arc::new(self.bus.clone()),
            self.namespace.clone(),
            Hostname::new(hostname),
            Arc::new(handlers),
            config,
            self.clock.clone(),
        );
        let agent_cancel = self.cancel.child_token();
        {
            let agent_cancel = agent_cancel.clone();
            self.tasks.push(tokio::spawn(async move {
                let _ = runtime.run(agent_cancel).await;
            }));
        }

        let host = Hostname::new(hostname);
        for _ in 0..300 {
            if self.registry.get(&host).await.unwrap().is_some() {
                return agent_cancel;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("agent {hostname} never registered");
    }

    /// Poll the job until `done` holds (or fail after ~30 simulated
    /// seconds; redelivery scenarios stretch across backoff windows).
    pub async fn wait_job<F>(&self, id: &JobId, mut done: F) -> Job
    where
        F: FnMut(&Job) -> bool,
    {
        for _ in 0..600 {
            if let Ok(job) = self.dispatcher.get(id).await {
                if done(&job) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {id} never reached the expected state");
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Jobs-stream consumer counters for one hostname.
pub async fn agent_consumer_stats(
    plane: &ControlPlane,
    hostname: &str,
) -> osapi_bus::ConsumerStats {
    plane
        .bus
        .consumer_stats(
            &plane.namespace.jobs_stream(),
            &plane.namespace.agent_durable(&Hostname::new(hostname)),
        )
        .await
        .unwrap()
}
