// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry heartbeat task.

use crate::Registry;
use osapi_core::AgentInfo;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Refreshes one agent's registry key ahead of the bucket TTL.
///
/// Refresh interval is TTL/3, so two consecutive write failures still
/// leave one attempt before the key expires. A failed write is logged and
/// retried on the next tick; the agent itself keeps running.
pub struct Heartbeat {
    registry: Registry,
    ttl: Duration,
}

impl Heartbeat {
    pub fn new(registry: Registry, ttl: Duration) -> Self {
        Self { registry, ttl }
    }

    pub fn interval(&self) -> Duration {
        self.ttl / 3
    }

    /// Run until cancelled, then deregister (best effort).
    ///
    /// `make_info` is called per tick so each refresh carries current
    /// host facts (load, memory, uptime).
    pub async fn run<F>(self, mut make_info: F, cancel: CancellationToken)
    where
        F: FnMut() -> AgentInfo + Send,
    {
        let mut ticker = tokio::time::interval(self.interval());
        let mut hostname = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                // First tick fires immediately: the initial registration.
                _ = ticker.tick() => {
                    let info = make_info();
                    let host = info.hostname.clone();
                    if let Err(e) = self.registry.register(&info).await {
                        tracing::warn!(hostname = %host, error = %e, "registry heartbeat failed");
                    }
                    hostname = Some(host);
                }
            }
        }
        if let Some(host) = hostname {
            let _ = self.registry.deregister(&host).await;
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
