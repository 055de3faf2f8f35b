// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! osapi-handlers: operation handler framework and built-in handlers.
//!
//! A handler owns one operation type. The agent looks handlers up by the
//! envelope's `operation.type`; unknown types are a response-level failure,
//! not a dispatch reject, so heterogeneous fleets can register different
//! handler sets per host.

pub mod builtin;
pub mod facts;
mod registry;

pub use registry::HandlerRegistry;

use async_trait::async_trait;
use osapi_core::Operation;
use serde_json::Value;
use std::time::Duration;

/// Default execution bound when a handler declares nothing stricter.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One operation type's implementation.
///
/// `execute` futures must be cancel-safe: the runtime drops them on
/// timeout and on shutdown, so spawned subprocesses use kill-on-drop and
/// cleanup happens in Drop, never after an `.await` that may not return.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// The dotted operation type this handler owns.
    fn operation(&self) -> &'static str;

    /// Execution bound for one operation. May inspect the operation
    /// (e.g. a caller-supplied timeout field, clamped by policy).
    fn timeout(&self, _operation: &Operation) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Synchronous shape check, run at submission time by the dispatcher
    /// so malformed operations reject with 400 instead of failing on the
    /// agent.
    fn validate(&self, _operation: &Operation) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, HandlerError>;
}

/// Handler failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Operation shape is wrong; rejected at submit when possible.
    #[error("invalid operation: {0}")]
    Invalid(String),

    /// The operation ran and failed. Acked: retrying without operator
    /// action would fail the same way.
    #[error("{0}")]
    Failed(String),

    /// Execution exceeded the handler's timeout.
    #[error("timeout")]
    Timeout,

    /// Environmental failure worth a redelivery (nak with backoff).
    #[error("transient: {0}")]
    Transient(String),
}

impl HandlerError {
    /// True when the agent should nak for redelivery instead of acking a
    /// failure response.
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}
