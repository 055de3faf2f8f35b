// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher error taxonomy.

use osapi_bus::BusError;
use osapi_core::{Hostname, JobId};
use osapi_registry::{RegistryError, ResolveError};
use thiserror::Error;

/// Job store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// CAS lost every bounded retry; the caller's update was dropped.
    #[error("revision conflict on job {id} after {attempts} attempts")]
    Conflict { id: JobId, attempts: u32 },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("job record is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// API-visible dispatcher failure, mapped onto HTTP statuses by the
/// server.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no such agent: {0}")]
    NoSuchAgent(Hostname),

    #[error("target matched no live agents")]
    TargetEmpty,

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("job update lost a revision conflict after bounded retries")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => DispatchError::NotFound(id),
            StoreError::Conflict { .. } => DispatchError::Conflict,
            StoreError::Bus(e) if e.is_unavailable() => {
                DispatchError::BusUnavailable(e.to_string())
            }
            StoreError::Bus(e) => DispatchError::Internal(e.to_string()),
            StoreError::Serialization(e) => DispatchError::Internal(e.to_string()),
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NoSuchAgent(host) => DispatchError::NoSuchAgent(host),
            ResolveError::TargetEmpty => DispatchError::TargetEmpty,
            ResolveError::Registry(e) => e.into(),
        }
    }
}

impl From<RegistryError> for DispatchError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Bus(e) if e.is_unavailable() => {
                DispatchError::BusUnavailable(e.to_string())
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}

impl From<BusError> for DispatchError {
    fn from(e: BusError) -> Self {
        if e.is_unavailable() {
            DispatchError::BusUnavailable(e.to_string())
        } else {
            DispatchError::Internal(e.to_string())
        }
    }
}
