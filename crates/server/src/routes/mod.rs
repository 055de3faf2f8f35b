// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route table.

mod agents;
mod health;
mod jobs;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use osapi_bus::MessageBus;
use osapi_core::Clock;
use tower_http::trace::TraceLayer;

/// The full REST surface.
pub fn router<B: MessageBus, C: Clock>(state: AppState<B, C>) -> Router {
    Router::new()
        .route("/jobs", post(jobs::submit::<B, C>).get(jobs::list::<B, C>))
        .route("/jobs/queue", get(jobs::queue::<B, C>))
        .route(
            "/jobs/:id",
            get(jobs::detail::<B, C>).delete(jobs::delete::<B, C>),
        )
        .route("/jobs/:id/retry", post(jobs::retry::<B, C>))
        .route("/agents", get(agents::list::<B, C>))
        .route("/agents/:hostname", get(agents::detail::<B, C>))
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness::<B, C>))
        .route("/health/status", get(health::status::<B, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
