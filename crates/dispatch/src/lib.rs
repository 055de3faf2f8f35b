// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! osapi-dispatch: job submission, persistence, and aggregation.
//!
//! The dispatcher turns one `POST /jobs` into per-host envelopes on the
//! bus and a job record in KV; the aggregator and DLQ watcher fold agent
//! outcomes back into that record. Every job mutation is a CAS
//! read-modify-write; there are no locks anywhere on this path.

mod aggregate;
mod audit;
mod dispatcher;
mod dlq_watch;
mod error;
mod store;
mod topology;

#[cfg(test)]
mod test_helpers;

pub use aggregate::Aggregator;
pub use audit::{AuditAction, AuditEntry, AuditSink, KvAuditSink};
pub use dispatcher::{AgentProbe, Dispatcher, JobPage, QueueSummary, SubmitReceipt};
pub use dlq_watch::DlqWatcher;
pub use error::{DispatchError, StoreError};
pub use store::JobStore;
pub use topology::{ensure_topology, TopologyConfig};
