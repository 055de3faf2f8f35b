// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::hostname::Hostname;
use crate::job::{WorkerState, WorkerStatus};
use std::collections::BTreeMap;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for the job state machine.
pub mod strategies {
    use super::*;
    use proptest::collection::btree_map;
    use proptest::prelude::*;

    pub fn arb_worker_status() -> impl Strategy<Value = WorkerStatus> {
        prop_oneof![
            Just(WorkerStatus::Acknowledged),
            Just(WorkerStatus::Started),
            Just(WorkerStatus::Completed),
            Just(WorkerStatus::Failed),
            Just(WorkerStatus::DeadLetter),
        ]
    }

    pub fn arb_terminal_worker_status() -> impl Strategy<Value = WorkerStatus> {
        prop_oneof![
            Just(WorkerStatus::Completed),
            Just(WorkerStatus::Failed),
            Just(WorkerStatus::DeadLetter),
        ]
    }

    pub fn arb_worker_state() -> impl Strategy<Value = WorkerState> {
        arb_worker_status().prop_map(|status| WorkerState {
            status,
            started_at_ms: status.is_terminal().then_some(1_000),
            finished_at_ms: status.is_terminal().then_some(2_000),
            duration_ms: None,
            error: matches!(status, WorkerStatus::Failed).then(|| "boom".to_string()),
        })
    }

    fn arb_hostname() -> impl Strategy<Value = Hostname> {
        "[a-z]{2,5}-[0-9]{2}".prop_map(Hostname::new)
    }

    /// A resolved host list plus a worker-state map over a subset of it.
    ///
    /// The map may omit hosts (not yet reported) but never names a host
    /// outside the resolved set, matching the dispatcher's write pattern.
    pub fn arb_worker_snapshot(
    ) -> impl Strategy<Value = (Vec<Hostname>, BTreeMap<Hostname, WorkerState>)> {
        btree_map(arb_hostname(), (arb_worker_state(), any::<bool>()), 1..8).prop_map(|m| {
            let resolved: Vec<Hostname> = m.keys().cloned().collect();
            let states = m
                .into_iter()
                .filter(|(_, (_, include))| *include)
                .map(|(h, (s, _))| (h, s))
                .collect();
            (resolved, states)
        })
    }
}

// ── Record factories ────────────────────────────────────────────────────

/// A worker-state map from `(host, status)` pairs with fixed timestamps.
pub fn worker_states(
    entries: &[(&str, WorkerStatus)],
) -> BTreeMap<Hostname, WorkerState> {
    entries
        .iter()
        .map(|(host, status)| {
            let state = match status {
                WorkerStatus::Acknowledged => WorkerState::acknowledged(),
                WorkerStatus::Started => WorkerState::started(1_000),
                WorkerStatus::Completed => WorkerState {
                    status: WorkerStatus::Completed,
                    started_at_ms: Some(1_000),
                    finished_at_ms: Some(2_000),
                    duration_ms: Some(1_000),
                    error: None,
                },
                WorkerStatus::Failed => WorkerState::failed("boom", 2_000),
                WorkerStatus::DeadLetter => WorkerState::dead_letter(2_000),
            };
            (Hostname::new(*host), state)
        })
        .collect()
}
