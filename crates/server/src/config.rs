// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server daemon configuration: TOML file with environment overrides.

use osapi_dispatch::TopologyConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub http: HttpSection,
    pub bus: BusSection,
    pub auth: AuthSection,
    pub retention: RetentionSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    pub listen: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self { listen: "127.0.0.1:8080".to_string() }
    }
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

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    /// HS256 shared secret for bearer tokens.
    pub secret: String,
    /// Development only: skip token checks entirely.
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionSection {
    pub jobs_max_age_secs: u64,
    pub duplicate_window_secs: u64,
    pub dlq_max_age_secs: u64,
    pub job_ttl_secs: u64,
    pub response_ttl_secs: u64,
    pub registry_ttl_secs: u64,
    pub audit_ttl_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        let defaults = TopologyConfig::default();
        Self {
            jobs_max_age_secs: defaults.jobs_max_age.as_secs(),
            duplicate_window_secs: defaults.duplicate_window.as_secs(),
            dlq_max_age_secs: defaults.dlq_max_age.as_secs(),
            job_ttl_secs: defaults.job_ttl.as_secs(),
            response_ttl_secs: defaults.response_ttl.as_secs(),
            registry_ttl_secs: defaults.registry_ttl.as_secs(),
            audit_ttl_secs: defaults.audit_ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Log to this file (daily rotation) in addition to stderr.
    pub file: Option<PathBuf>,
}

impl ServerConfig {
    /// Load from a TOML file, then apply `OSAPI_*` env overrides, then
    /// validate.
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
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OSAPI_BUS_URL") {
            self.bus.url = url;
        }
        if let Ok(ns) = std::env::var("OSAPI_NAMESPACE") {
            self.bus.namespace = ns;
        }
        if let Ok(listen) = std::env::var("OSAPI_LISTEN") {
            self.http.listen = listen;
        }
        if let Ok(secret) = std::env::var("OSAPI_AUTH_SECRET") {
            self.auth.secret = secret;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.auth.disabled && self.auth.secret.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.secret is required unless auth.disabled = true".to_string(),
            ));
        }
        Ok(())
    }

    pub fn topology(&self) -> TopologyConfig {
        TopologyConfig {
            jobs_max_age: Duration::from_secs(self.retention.jobs_max_age_secs),
            duplicate_window: Duration::from_secs(self.retention.duplicate_window_secs),
            dlq_max_age: Duration::from_secs(self.retention.dlq_max_age_secs),
            job_ttl: Duration::from_secs(self.retention.job_ttl_secs),
            response_ttl: Duration::from_secs(self.retention.response_ttl_secs),
            registry_ttl: Duration::from_secs(self.retention.registry_ttl_secs),
            audit_ttl: Duration::from_secs(self.retention.audit_ttl_secs),
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
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
