// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handler state.

use crate::auth::{AuthConfig, AuthState};
use osapi_bus::MessageBus;
use osapi_core::{Clock, Namespace};
use osapi_dispatch::{AuditSink, Dispatcher};
use std::sync::Arc;

/// Everything a request handler needs. Cheap to clone.
pub struct AppState<B: MessageBus, C: Clock> {
    pub dispatcher: Dispatcher<B, C>,
    pub bus: Arc<B>,
    pub audit: Arc<dyn AuditSink>,
    pub auth: Arc<AuthConfig>,
    pub namespace: Namespace,
}

impl<B: MessageBus, C: Clock> Clone for AppState<B, C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            bus: self.bus.clone(),
            audit: self.audit.clone(),
            auth: self.auth.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<B: MessageBus, C: Clock> AuthState for AppState<B, C> {
    fn auth(&self) -> &AuthConfig {
        &self.auth
    }
}
