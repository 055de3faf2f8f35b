// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/agents` handlers.

use crate::auth::{permissions, Caller};
use crate::dto::{AgentDetailResponse, AgentListResponse};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use osapi_bus::MessageBus;
use osapi_core::{Clock, Hostname};
use osapi_dispatch::DispatchError;

pub async fn list<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
) -> Result<Json<AgentListResponse>, ApiError> {
    caller.require(permissions::AGENTS_READ)?;
    let snapshot = state.dispatcher.list_agents().await?;
    let total = snapshot.agents.len();
    Ok(Json(AgentListResponse {
        agents: snapshot.agents,
        malformed: snapshot.malformed,
        total,
    }))
}

pub async fn detail<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Path(hostname): Path<String>,
) -> Result<Json<AgentDetailResponse>, ApiError> {
    caller.require(permissions::AGENTS_READ)?;
    let host = Hostname::parse(&hostname)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let probe = state.dispatcher.probe_agent(&host).await.map_err(|e| match e {
        // Unlike submit, an unknown hostname here is a missing resource.
        DispatchError::NoSuchAgent(host) => ApiError::NotFound(format!("no such agent: {host}")),
        other => other.into(),
    })?;
    Ok(Json(probe.into()))
}
