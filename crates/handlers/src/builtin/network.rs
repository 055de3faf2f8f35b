// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `network.*` handlers.

use crate::{Handler, HandlerError};
use async_trait::async_trait;
use osapi_core::Operation;
use serde_json::{json, Value};
use std::time::Duration;

/// `network.ping`: name resolution reachability probe.
///
/// Resolves `host` and reports the addresses found. ICMP needs raw
/// sockets the agent does not carry; resolution answers the operational
/// question ("does this name route from that box") without them.
pub struct NetworkPing;

#[async_trait]
impl Handler for NetworkPing {
    fn operation(&self) -> &'static str {
        "network.ping"
    }

    fn timeout(&self, _operation: &Operation) -> Duration {
        Duration::from_secs(10)
    }

    fn validate(&self, operation: &Operation) -> Result<(), HandlerError> {
        host_field(operation).map(|_| ())
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, HandlerError> {
        let host = host_field(operation)?;
        let addrs = tokio::net::lookup_host((host.as_str(), 0))
            .await
            .map_err(|e| HandlerError::Failed(format!("resolve {host}: {e}")))?;
        let addrs: Vec<String> = addrs.map(|a| a.ip().to_string()).collect();
        Ok(json!({ "host": host, "resolved": !addrs.is_empty(), "addresses": addrs }))
    }
}

fn host_field(operation: &Operation) -> Result<String, HandlerError> {
    operation
        .field("host")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| HandlerError::Invalid("missing required field \"host\"".to_string()))
}

/// `network.dns.update`: validate a resolver change for an interface.
///
/// The mutation mechanics (resolved D-Bus, resolv.conf writes) are
/// deployment-specific; this handler validates the request shape and
/// echoes the configuration it would apply.
pub struct NetworkDnsUpdate;

impl NetworkDnsUpdate {
    fn parse(operation: &Operation) -> Result<(String, Vec<String>, Vec<String>), HandlerError> {
        let interface = operation
            .field("interface")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerError::Invalid("missing required field \"interface\"".to_string())
            })?
            .to_string();

        let servers = string_list(operation, "servers")?;
        if servers.is_empty() {
            return Err(HandlerError::Invalid("\"servers\" must not be empty".to_string()));
        }
        for server in &servers {
            if server.parse::<std::net::IpAddr>().is_err() {
                return Err(HandlerError::Invalid(format!(
                    "\"servers\" entry {server:?} is not an IP address"
                )));
            }
        }
        let search = string_list(operation, "search_domains")?;
        Ok((interface, servers, search))
    }
}

fn string_list(operation: &Operation, field: &str) -> Result<Vec<String>, HandlerError> {
    match operation.field(field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| HandlerError::Invalid(format!("\"{field}\" must be strings")))
            })
            .collect(),
        Some(_) => Err(HandlerError::Invalid(format!("\"{field}\" must be a list"))),
    }
}

#[async_trait]
impl Handler for NetworkDnsUpdate {
    fn operation(&self) -> &'static str {
        "network.dns.update"
    }

    fn validate(&self, operation: &Operation) -> Result<(), HandlerError> {
        Self::parse(operation).map(|_| ())
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, HandlerError> {
        let (interface, servers, search) = Self::parse(operation)?;
        Ok(json!({
            "interface": interface,
            "servers": servers,
            "search_domains": search,
        }))
    }
}
