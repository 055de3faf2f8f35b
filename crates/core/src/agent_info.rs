// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registration record.
//!
//! Written by each agent to its own key in the worker-registry bucket and
//! refreshed on every heartbeat. The bucket TTL reaps silent agents, so a
//! record's presence *is* the liveness signal; the metadata is advisory.

use crate::hostname::Hostname;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operating system identity, read from `/etc/os-release` at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub kernel: String,
}

/// 1/5/15-minute load averages from `/proc/loadavg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Memory totals from `/proc/meminfo`, in kibibytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

/// One agent's registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub hostname: Hostname,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub os_info: OsInfo,
    pub load_average: LoadAverage,
    pub memory: MemoryInfo,
    pub uptime_secs: u64,
    /// When the agent process started.
    pub started_at_ms: u64,
    /// When this record was last written (heartbeat time).
    pub registered_at_ms: u64,
}

impl AgentInfo {
    /// True when `labels` contains every `k=v` pair of `selector`.
    pub fn has_labels(&self, selector: &[(String, String)]) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).map(String::as_str) == Some(v.as_str()))
    }
}

crate::builder! {
    pub struct AgentInfoBuilder => AgentInfo {
        into {
            hostname: Hostname = "test-host",
        }
        set {
            labels: HashMap<String, String> = HashMap::new(),
            os_info: OsInfo = OsInfo::default(),
            load_average: LoadAverage = LoadAverage::default(),
            memory: MemoryInfo = MemoryInfo::default(),
            uptime_secs: u64 = 0,
            started_at_ms: u64 = 1_000_000,
            registered_at_ms: u64 = 1_000_000,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AgentInfoBuilder {
    /// Convenience: add one label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
#[path = "agent_info_tests.rs"]
mod tests;
