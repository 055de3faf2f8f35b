// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runtime errors.

use osapi_bus::BusError;
use osapi_registry::RegistryError;
use thiserror::Error;

/// Fatal agent failure (startup or a closed bus). Per-message failures
/// never surface here; they resolve through responses and ack decisions.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid agent configuration: {0}")]
    Config(String),
}
