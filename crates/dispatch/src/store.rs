// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record persistence over the jobs KV bucket.

use crate::error::StoreError;
use bytes::Bytes;
use osapi_bus::{KvBucket, MessageBus};
use osapi_core::{Clock, Job, JobId, Namespace};
use std::sync::Arc;
use std::time::Duration;

/// Bounded CAS retry: lost revisions back off exponentially, then the
/// update is surfaced as a conflict instead of spinning.
const MAX_CAS_ATTEMPTS: u32 = 5;
const CAS_BACKOFF_BASE: Duration = Duration::from_millis(10);

/// Jobs bucket handle. Clones share the underlying bucket.
#[derive(Clone)]
pub struct JobStore<C: Clock> {
    kv: Arc<dyn KvBucket>,
    clock: C,
}

impl<C: Clock> JobStore<C> {
    pub fn new<B: MessageBus>(bus: &B, namespace: &Namespace, clock: C) -> Self {
        Self { kv: bus.kv(&namespace.jobs_bucket()), clock }
    }

    /// Persist a brand-new record. Returns the initial revision.
    pub async fn create(&self, job: &Job) -> Result<u64, StoreError> {
        let value = serde_json::to_vec(job)?;
        Ok(self.kv.create(job.id.as_str(), Bytes::from(value)).await?)
    }

    /// Fetch a record with its revision. `None` covers both never-existed
    /// and TTL-expired.
    pub async fn get(&self, id: &JobId) -> Result<Option<(Job, u64)>, StoreError> {
        let Some(entry) = self.kv.get(id.as_str()).await? else {
            return Ok(None);
        };
        let job = serde_json::from_slice(&entry.value)?;
        Ok(Some((job, entry.revision)))
    }

    /// Read every record in the bucket. Unparseable values are skipped
    /// with a warning (a newer writer may be mid-rollout).
    pub async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        for key in self.kv.keys().await? {
            let Some(entry) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<Job>(&entry.value) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!(key = %key, error = %e, "unparseable job record skipped"),
            }
        }
        Ok(jobs)
    }

    /// Delete a record. Errors with `NotFound` when it does not exist.
    pub async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        if self.kv.get(id.as_str()).await?.is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.kv.delete(id.as_str()).await?;
        Ok(())
    }

    /// One CAS write against a known revision.
    pub async fn put(&self, job: &Job, expected_revision: u64) -> Result<u64, StoreError> {
        let value = serde_json::to_vec(job)?;
        Ok(self
            .kv
            .update(job.id.as_str(), Bytes::from(value), expected_revision)
            .await?)
    }

    /// Read-modify-CAS loop.
    ///
    /// `apply` receives the current record and the clock reading and
    /// returns whether it changed anything; an unchanged record is not
    /// rewritten (replayed responses land here). Lost revisions re-read
    /// and retry with exponential backoff up to [`MAX_CAS_ATTEMPTS`].
    pub async fn mutate<F>(&self, id: &JobId, mut apply: F) -> Result<(Job, u64), StoreError>
    where
        F: FnMut(&mut Job, u64) -> bool + Send,
    {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let (mut job, revision) = self
                .get(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            if !apply(&mut job, self.clock.epoch_ms()) {
                return Ok((job, revision));
            }

            match self.put(&job, revision).await {
                Ok(new_revision) => return Ok((job, new_revision)),
                Err(StoreError::Bus(e)) if e.is_conflict() => {
                    tracing::debug!(job = %id, attempt, "job CAS lost, retrying");
                    tokio::time::sleep(CAS_BACKOFF_BASE * 2u32.saturating_pow(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict { id: id.clone(), attempts: MAX_CAS_ATTEMPTS })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
