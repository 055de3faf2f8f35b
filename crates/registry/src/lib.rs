// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! osapi-registry: agent liveness registry over the worker-registry bucket.
//!
//! Agents write their own hostname key and refresh it ahead of the bucket
//! TTL; the dispatcher reads the bucket to resolve targets. Presence of a
//! key *is* liveness; there is no separate health protocol.

mod heartbeat;
mod resolve;

pub use heartbeat::Heartbeat;
pub use resolve::resolve_against;

use bytes::Bytes;
use osapi_bus::{BusError, KvBucket, MessageBus};
use osapi_core::{AgentInfo, Hostname, Namespace};
use std::sync::Arc;

/// Handle to the worker-registry bucket.
///
/// Single-writer per hostname (each agent writes only its own key),
/// many-reader. No locking: the TTL and last-write-wins puts are the
/// whole coordination story.
#[derive(Clone)]
pub struct Registry {
    kv: Arc<dyn KvBucket>,
    bucket: String,
}

impl Registry {
    pub fn new<B: MessageBus>(bus: &B, namespace: &Namespace) -> Self {
        let bucket = namespace.registry_bucket();
        Self { kv: bus.kv(&bucket), bucket }
    }

    /// Write (or refresh) one agent's record. Agents call this only for
    /// their own hostname.
    pub async fn register(&self, info: &AgentInfo) -> Result<(), RegistryError> {
        let value = serde_json::to_vec(info)?;
        self.kv.put(info.hostname.as_str(), Bytes::from(value)).await?;
        tracing::debug!(hostname = %info.hostname, bucket = %self.bucket, "registry entry written");
        Ok(())
    }

    /// Remove an agent's record on clean shutdown. Silent agents are
    /// reaped by the bucket TTL instead.
    pub async fn deregister(&self, host: &Hostname) -> Result<(), RegistryError> {
        self.kv.delete(host.as_str()).await?;
        Ok(())
    }

    /// Fetch one agent's record.
    pub async fn get(&self, host: &Hostname) -> Result<Option<AgentInfo>, RegistryError> {
        let Some(entry) = self.kv.get(host.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&entry.value)?))
    }

    /// Read every live record.
    ///
    /// Keys whose value fails to parse are reported in `malformed` and
    /// excluded from routing.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let mut agents = Vec::new();
        let mut malformed = Vec::new();
        for key in self.kv.keys().await? {
            let Some(entry) = self.kv.get(&key).await? else {
                // Expired between the key listing and the read.
                continue;
            };
            match serde_json::from_slice::<AgentInfo>(&entry.value) {
                Ok(info) => agents.push(info),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "malformed registry entry skipped");
                    malformed.push(key);
                }
            }
        }
        agents.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(RegistrySnapshot { agents, malformed })
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Live agents, ordered by hostname.
    pub agents: Vec<AgentInfo>,
    /// Keys present but unparseable; never routed to.
    pub malformed: Vec<String>,
}

impl RegistrySnapshot {
    pub fn hostnames(&self) -> Vec<Hostname> {
        self.agents.iter().map(|a| a.hostname.clone()).collect()
    }

    pub fn contains(&self, host: &Hostname) -> bool {
        self.agents.iter().any(|a| &a.hostname == host)
    }
}

/// Registry read/write failure
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("registry entry is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Target resolution failure
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A literal hostname target that is not registered.
    #[error("no such agent: {0}")]
    NoSuchAgent(Hostname),
    /// The selector matched zero live agents.
    #[error("target matched no live agents")]
    TargetEmpty,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
