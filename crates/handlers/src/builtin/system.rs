// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `system.*` handlers.

use crate::facts::FactsReader;
use crate::{Handler, HandlerError};
use async_trait::async_trait;
use osapi_core::{Hostname, Operation};
use serde_json::{json, Value};

/// `system.hostname`: report the hostname the agent is bound to.
pub struct SystemHostname {
    hostname: Hostname,
}

impl SystemHostname {
    pub fn new(hostname: Hostname) -> Self {
        Self { hostname }
    }
}

#[async_trait]
impl Handler for SystemHostname {
    fn operation(&self) -> &'static str {
        "system.hostname"
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        Ok(json!({ "hostname": self.hostname.as_str() }))
    }
}

/// `system.status`: load, memory, and uptime snapshot.
pub struct SystemStatus {
    facts: FactsReader,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self { facts: FactsReader::new() }
    }

    pub fn with_facts(facts: FactsReader) -> Self {
        Self { facts }
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for SystemStatus {
    fn operation(&self) -> &'static str {
        "system.status"
    }

    async fn execute(&self, _operation: &Operation) -> Result<Value, HandlerError> {
        let load = self.facts.load_average();
        let memory = self.facts.memory();
        Ok(json!({
            "os": self.facts.os_info(),
            "load_average": { "one": load.one, "five": load.five, "fifteen": load.fifteen },
            "memory": { "total_kb": memory.total_kb, "available_kb": memory.available_kb },
            "uptime_secs": self.facts.uptime_secs(),
        }))
    }
}
