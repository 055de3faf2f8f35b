// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication and permission checks.
//!
//! Tokens are HS256 JWTs carrying `sub`, `roles`, and `permissions`
//! claims; issuance is external. Permissions are flat strings
//! (`jobs:read`, `jobs:write`, `agents:read`, `health:read`); the
//! `admin` role implies everything.

use crate::error::ApiError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

pub mod permissions {
    pub const JOBS_READ: &str = "jobs:read";
    pub const JOBS_WRITE: &str = "jobs:write";
    pub const AGENTS_READ: &str = "agents:read";
    pub const HEALTH_READ: &str = "health:read";
}

/// Token validation settings.
#[derive(Clone)]
pub struct AuthConfig {
    secret: String,
    /// Development escape hatch; every request acts as an anonymous
    /// admin. Never enable where the API is reachable.
    disabled: bool,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), disabled: false }
    }

    pub fn disabled() -> Self {
        Self { secret: String::new(), disabled: true }
    }

    fn decode(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    exp: u64,
}

/// The authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct Caller {
    pub subject: String,
    roles: Vec<String>,
    permissions: Vec<String>,
}

impl Caller {
    fn admin(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            roles: vec!["admin".to_string()],
            permissions: Vec::new(),
        }
    }

    pub fn can(&self, permission: &str) -> bool {
        self.roles.iter().any(|r| r == "admin")
            || self.permissions.iter().any(|p| p == permission)
    }

    /// 403 unless the caller holds `permission`.
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("missing permission {permission}")))
        }
    }
}

/// State that can hand out the auth settings (implemented by
/// [`AppState`]).
///
/// [`AppState`]: crate::state::AppState
pub trait AuthState: Send + Sync {
    fn auth(&self) -> &AuthConfig;
}

#[async_trait]
impl<S: AuthState> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = state.auth();
        if auth.disabled {
            return Ok(Caller::admin("anonymous"));
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("authorization is not a bearer token".to_string()))?;

        let claims = auth.decode(token)?;
        Ok(Caller {
            subject: claims.sub,
            roles: claims.roles,
            permissions: claims.permissions,
        })
    }
}

/// Token minting for tests.
#[cfg(test)]
#[allow(clippy::expect_used)]
impl AuthConfig {
    pub fn issue(&self, subject: &str, roles: &[&str], permissions: &[&str]) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &Claims {
                sub: subject.to_string(),
                roles: roles.iter().map(|s| s.to_string()).collect(),
                permissions: permissions.iter().map(|s| s.to_string()).collect(),
                exp: far_future(),
            },
            &jsonwebtoken::EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("token encode")
    }
}

#[cfg(test)]
fn far_future() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + 3600
}
