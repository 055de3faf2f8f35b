// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use osapi_dispatch::DispatchError;
use serde::Serialize;

/// API failure: a taxonomy kind plus a human message.
///
/// Serializes as `{"error": "<kind>", "message": "..."}` with the
/// matching status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NoSuchAgent(String),
    #[error("{0}")]
    TargetEmpty(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BusUnavailable(String),
    #[error("{0}")]
    KvConflict(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NoSuchAgent(_) => "no_such_agent",
            ApiError::TargetEmpty(_) => "target_empty",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::BusUnavailable(_) => "bus_unavailable",
            ApiError::KvConflict(_) => "kv_conflict",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::NoSuchAgent(_) | ApiError::TargetEmpty(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BusUnavailable(_) | ApiError::KvConflict(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), message = %self, "request failed");
        }
        let body = Json(ErrorBody { error: self.kind(), message: &self.to_string() });
        (status, body).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::BadRequest(msg) => ApiError::BadRequest(msg),
            DispatchError::NoSuchAgent(host) => {
                ApiError::NoSuchAgent(format!("no such agent: {host}"))
            }
            DispatchError::TargetEmpty => {
                ApiError::TargetEmpty("target matched no live agents".to_string())
            }
            DispatchError::NotFound(id) => ApiError::NotFound(format!("job not found: {id}")),
            DispatchError::BusUnavailable(msg) => ApiError::BusUnavailable(msg),
            DispatchError::Conflict => {
                ApiError::KvConflict("update lost a revision conflict after retries".to_string())
            }
            DispatchError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        bad_request  = { ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "bad_request" },
        no_agent     = { ApiError::NoSuchAgent("x".into()), StatusCode::BAD_REQUEST, "no_such_agent" },
        target_empty = { ApiError::TargetEmpty("x".into()), StatusCode::BAD_REQUEST, "target_empty" },
        unauthorized = { ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "unauthorized" },
        forbidden    = { ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN, "forbidden" },
        not_found    = { ApiError::NotFound("x".into()), StatusCode::NOT_FOUND, "not_found" },
        unavailable  = { ApiError::BusUnavailable("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "bus_unavailable" },
        conflict     = { ApiError::KvConflict("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "kv_conflict" },
    )]
    fn taxonomy_mapping(error: ApiError, status: StatusCode, kind: &str) {
        assert_eq!(error.status(), status);
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn dispatch_errors_map_onto_the_taxonomy() {
        let e: ApiError = DispatchError::TargetEmpty.into();
        assert_eq!(e.kind(), "target_empty");

        let e: ApiError = DispatchError::NoSuchAgent("web-99".into()).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e: ApiError = DispatchError::NotFound("j".into()).into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
    }
}
