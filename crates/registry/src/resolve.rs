// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target resolution against the live registry.

use crate::{Registry, RegistrySnapshot, ResolveError};
use osapi_core::{Hostname, Target};

impl Registry {
    /// Resolve a target to an ordered, deduplicated hostname list.
    ///
    /// Snapshot-in-time: agents registering after this call do not
    /// retroactively receive the job.
    pub async fn resolve(&self, target: &Target) -> Result<Vec<Hostname>, ResolveError> {
        let snapshot = self.snapshot().await?;
        resolve_against(target, &snapshot)
    }
}

/// Pure resolution against a snapshot (separated for tests and reuse).
pub fn resolve_against(
    target: &Target,
    snapshot: &RegistrySnapshot,
) -> Result<Vec<Hostname>, ResolveError> {
    match target {
        // Deterministic pick: smallest hostname. Callers must not
        // depend on which agent this lands on.
        Target::Any => {
            let host = snapshot
                .agents
                .first()
                .map(|a| a.hostname.clone())
                .ok_or(ResolveError::TargetEmpty)?;
            Ok(vec![host])
        }
        Target::All => {
            let hosts = snapshot.hostnames();
            if hosts.is_empty() {
                return Err(ResolveError::TargetEmpty);
            }
            Ok(hosts)
        }
        Target::Host(host) => {
            if snapshot.contains(host) {
                Ok(vec![host.clone()])
            } else {
                Err(ResolveError::NoSuchAgent(host.clone()))
            }
        }
        Target::Labels(pairs) => {
            let hosts: Vec<Hostname> = snapshot
                .agents
                .iter()
                .filter(|a| a.has_labels(pairs))
                .map(|a| a.hostname.clone())
                .collect();
            if hosts.is_empty() {
                return Err(ResolveError::TargetEmpty);
            }
            Ok(hosts)
        }
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
