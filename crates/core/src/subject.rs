// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment namespace and bus naming.
//!
//! The namespace prefixes every subject, stream, and KV bucket so several
//! deployments can share one broker. All naming goes through here; nothing
//! else in the workspace formats a subject by hand.

use crate::hostname::Hostname;
use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue group shared by agent consumers: within one hostname, only one
/// active instance receives each message (active/standby pairs).
pub const AGENT_QUEUE_GROUP: &str = "job-agents";

/// Deployment namespace.
///
/// Must stay within the subject-token alphabet. No dots: a dotted
/// namespace would split into extra subject tokens and break filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn new(ns: impl Into<String>) -> Result<Self, NamespaceError> {
        let ns = ns.into();
        if ns.is_empty() {
            return Err(NamespaceError::Empty);
        }
        if !ns
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(NamespaceError::InvalidCharacter(ns));
        }
        Ok(Self(ns))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // ── Streams ──────────────────────────────────────────────────────────

    /// Stream capturing all job envelopes (`<ns>.jobs.>`).
    pub fn jobs_stream(&self) -> String {
        format!("{}-jobs", self.0)
    }

    /// Stream capturing max-deliveries advisories for the jobs stream.
    pub fn dlq_stream(&self) -> String {
        format!("{}-dlq", self.0)
    }

    /// Broker advisory subject emitted when a message exhausts
    /// max_deliver on any consumer of the jobs stream.
    pub fn dlq_advisory_subject(&self) -> String {
        format!(
            "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.{}.*",
            self.jobs_stream()
        )
    }

    // ── Subjects ─────────────────────────────────────────────────────────

    /// Envelope subject for one host + operation type.
    pub fn jobs_subject(&self, host: &Hostname, operation_kind: &str) -> String {
        format!("{}.jobs.{}.{}", self.0, host, operation_kind)
    }

    /// Everything the jobs stream captures.
    pub fn jobs_wildcard(&self) -> String {
        format!("{}.jobs.>", self.0)
    }

    /// Filter subject for one agent's durable consumer.
    pub fn agent_filter(&self, host: &Hostname) -> String {
        format!("{}.jobs.{}.>", self.0, host)
    }

    /// Response subject for one job on one host.
    pub fn responses_subject(&self, job_id: &JobId, host: &Hostname) -> String {
        format!("{}.responses.{}.{}", self.0, job_id, host)
    }

    /// Every response in the deployment (aggregator subscription).
    pub fn responses_wildcard(&self) -> String {
        format!("{}.responses.>", self.0)
    }

    /// Live-probe subject one agent answers with its current metadata.
    pub fn registry_probe_subject(&self, host: &Hostname) -> String {
        format!("{}.registry.{}", self.0, host)
    }

    // ── KV buckets ───────────────────────────────────────────────────────

    pub fn jobs_bucket(&self) -> String {
        format!("{}-jobs", self.0)
    }

    pub fn responses_bucket(&self) -> String {
        format!("{}-responses", self.0)
    }

    pub fn registry_bucket(&self) -> String {
        format!("{}-worker-registry", self.0)
    }

    pub fn audit_bucket(&self) -> String {
        format!("{}-audit-log", self.0)
    }

    // ── Durable consumer names ───────────────────────────────────────────

    /// Durable name for one hostname's agent consumer. All instances for
    /// the host share it, which is what serializes delivery within the
    /// [`AGENT_QUEUE_GROUP`].
    pub fn agent_durable(&self, host: &Hostname) -> String {
        format!("{}-{}", AGENT_QUEUE_GROUP, host)
    }

    /// Durable name for the dispatcher's DLQ advisory watcher.
    pub fn dlq_durable(&self) -> String {
        format!("{}-dlq-watch", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Namespace::new(s)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> String {
        ns.0
    }
}

/// Invalid namespace input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("namespace is empty")]
    Empty,
    #[error("namespace contains characters outside [a-z0-9_-]: {0:?}")]
    InvalidCharacter(String),
}

#[cfg(test)]
#[path = "subject_tests.rs"]
mod tests;
