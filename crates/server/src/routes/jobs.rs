// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/jobs` handlers.

use crate::auth::{permissions, Caller};
use crate::dto::{
    JobListResponse, JobSummary, QueueStatsResponse, RetryRequest, SubmitRequest, SubmitResponse,
};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use osapi_bus::MessageBus;
use osapi_core::{Clock, Job, JobId, JobStatus};
use osapi_dispatch::AuditAction;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 500;

pub async fn submit<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    caller.require(permissions::JOBS_WRITE)?;
    let request: SubmitRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?;

    let target = request.target.clone();
    let receipt = state.dispatcher.submit(request.operation, request.target).await?;
    if let Err(e) = state
        .audit
        .record(
            &caller.subject,
            AuditAction::JobSubmitted,
            Some(&receipt.job_id),
            &format!("target {target}"),
        )
        .await
    {
        tracing::warn!(error = %e, "audit write failed");
    }
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub async fn list<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    caller.require(permissions::JOBS_READ)?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let page = state.dispatcher.list(status, limit, offset).await?;
    Ok(Json(JobListResponse {
        items: page.items.iter().map(JobSummary::from).collect(),
        total_items: page.total_items,
    }))
}

pub async fn detail<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    caller.require(permissions::JOBS_READ)?;
    let job = state.dispatcher.get(&JobId::new(id)).await?;
    Ok(Json(job))
}

pub async fn delete<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(permissions::JOBS_WRITE)?;
    let id = JobId::new(id);
    state.dispatcher.delete(&id).await?;
    if let Err(e) = state
        .audit
        .record(&caller.subject, AuditAction::JobDeleted, Some(&id), "")
        .await
    {
        tracing::warn!(error = %e, "audit write failed");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Option<Json<Value>>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    caller.require(permissions::JOBS_WRITE)?;
    let request: RetryRequest = match body {
        Some(Json(value)) => serde_json::from_value(value)
            .map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?,
        None => RetryRequest::default(),
    };

    let id = JobId::new(id);
    let receipt = state.dispatcher.retry(&id, request.target).await?;
    if let Err(e) = state
        .audit
        .record(
            &caller.subject,
            AuditAction::JobRetried,
            Some(&id),
            &format!("retried as {}", receipt.job_id),
        )
        .await
    {
        tracing::warn!(error = %e, "audit write failed");
    }
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

pub async fn queue<B: MessageBus, C: Clock>(
    State(state): State<AppState<B, C>>,
    caller: Caller,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    caller.require(permissions::JOBS_READ)?;
    let summary = state.dispatcher.queue_summary().await?;
    Ok(Json(summary.into()))
}
