// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! osapi-server: the control-plane REST surface.
//!
//! Hosts the dispatcher behind axum: job submission and queries, agent
//! views, and the health endpoints. Auth is bearer-token JWT with flat
//! permission strings; handlers map [`DispatchError`] onto the HTTP
//! error taxonomy through a single [`ApiError`] type.
//!
//! [`DispatchError`]: osapi_dispatch::DispatchError

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod health;
pub mod routes;
mod state;

pub use error::ApiError;
pub use state::AppState;
