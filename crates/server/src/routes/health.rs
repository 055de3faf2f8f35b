// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/health` handlers.

use crate::auth::{permissions, Caller};
use crate::error::ApiError;
use crate::health::{self, HealthReport};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use osapi_bus::MessageBus;
use osapi_core::Clock;
use serde_json::json;

/// Liveness: the process is up. No auth, no dependencies.
pub async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: 200 only when the broker answers.
pub async fn readiness<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let ready = health::ready(&state).await;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(json!({ "ready": ready })))
}

/// Aggregated component report; 503 when the bus is unreachable.
pub async fn status<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
) -> Result<(StatusCode, Json<HealthReport>), ApiError> {
    caller.require(permissions::HEALTH_READ)?;
    let report = health::report(&state).await;
    let code = if report.serving() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((code, Json(report)))
}
