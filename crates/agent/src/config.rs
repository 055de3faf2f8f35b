// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent daemon configuration: TOML file with environment overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default redelivery backoff ladder.
const DEFAULT_BACKOFF_SECS: [u64; 5] = [30, 120, 300, 900, 1800];

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub bus: BusSection,
    pub agent: AgentSection,
    pub consumer: ConsumerSection,
    pub registry: RegistrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub url: String,
    pub namespace: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self { url: "nats://127.0.0.1:4222".to_string(), namespace: "osapi".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    /// Defaults to the kernel hostname when unset.
    pub hostname: Option<String>,
    pub labels: HashMap<String, String>,
    /// Concurrent handler executions.
    pub max_jobs: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { hostname: None, labels: HashMap::new(), max_jobs: 4, shutdown_grace_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumerSection {
    pub max_deliver: i64,
    pub ack_wait_secs: u64,
    pub max_ack_pending: i64,
    pub backoff_secs: Vec<u64>,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            max_deliver: 5,
            ack_wait_secs: 30,
            max_ack_pending: 16,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub ttl_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

impl AgentConfig {
    /// Load from a TOML file, then apply `OSAPI_*` env overrides.
    /// `None` starts from defaults (env still applies).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
                toml::from_str(&raw)
                    .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OSAPI_BUS_URL") {
            self.bus.url = url;
        }
        if let Ok(ns) = std::env::var("OSAPI_NAMESPACE") {
            self.bus.namespace = ns;
        }
        if let Ok(hostname) = std::env::var("OSAPI_HOSTNAME") {
            self.agent.hostname = Some(hostname);
        }
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.consumer.ack_wait_secs)
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.ttl_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.agent.shutdown_grace_secs)
    }

    /// Backoff ladder as durations; the last rung repeats for deeper
    /// redelivery attempts.
    pub fn backoff(&self) -> Vec<Duration> {
        if self.consumer.backoff_secs.is_empty() {
            DEFAULT_BACKOFF_SECS.iter().copied().map(Duration::from_secs).collect()
        } else {
            self.consumer.backoff_secs.iter().copied().map(Duration::from_secs).collect()
        }
    }
}

/// Configuration load failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {0}: {1}")]
    Read(String, String),
    #[error("cannot parse config {0}: {1}")]
    Parse(String, String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
