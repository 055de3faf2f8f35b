// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for dispatch tests.

use crate::{ensure_topology, Dispatcher, TopologyConfig};
use osapi_bus::MemoryBus;
use osapi_core::agent_info::AgentInfoBuilder;
use osapi_core::id::SeqIdGen;
use osapi_core::{FakeClock, Namespace, Operation};
use osapi_handlers::HandlerRegistry;
use osapi_registry::Registry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct TestHarness {
    pub bus: MemoryBus,
    pub dispatcher: Dispatcher<MemoryBus, FakeClock>,
    pub clock: FakeClock,
    pub namespace: Namespace,
}

/// A memory bus with the full bucket/stream topology and `hosts`
/// registered as live agents.
pub async fn harness(hosts: &[&str]) -> TestHarness {
    let bus = MemoryBus::new();
    let namespace = Namespace::new("osapi").unwrap();
    ensure_topology(&bus, &namespace, &TopologyConfig::default())
        .await
        .unwrap();

    let registry = Registry::new(&bus, &namespace);
    for host in hosts {
        registry
            .register(&AgentInfoBuilder::default().hostname(*host).build())
            .await
            .unwrap();
    }

    let clock = FakeClock::new();
    let dispatcher = Dispatcher::new(
        Arc::new(bus.clone()),
        namespace.clone(),
        Arc::new(HandlerRegistry::builtin("dispatcher".into())),
        clock.clone(),
        Arc::new(SeqIdGen::new("job")),
    );
    TestHarness { bus, dispatcher, clock, namespace }
}

pub fn hostname_op() -> Operation {
    Operation::new("system.hostname").unwrap()
}

/// Poll until `check` yields `Some`, or panic after ~2 simulated seconds.
pub async fn wait_until<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..200 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
