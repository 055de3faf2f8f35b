// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation type → handler lookup.

use crate::{Handler, HandlerError};
use osapi_core::Operation;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable-after-startup handler set for one process.
///
/// Agents build one with the handlers their host supports; the dispatcher
/// builds one from the built-ins purely for submit-time validation.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Re-registering a type replaces the previous
    /// handler (last one wins, logged).
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        let kind = handler.operation();
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!(operation = kind, "handler replaced an earlier registration");
        }
        self
    }

    /// The full built-in set for an agent bound to `hostname`.
    pub fn builtin(hostname: osapi_core::Hostname) -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(crate::builtin::SystemHostname::new(hostname)))
            .register(Arc::new(crate::builtin::SystemStatus::new()))
            .register(Arc::new(crate::builtin::NetworkPing))
            .register(Arc::new(crate::builtin::NetworkDnsUpdate))
            .register(Arc::new(crate::builtin::CommandShell));
        registry
    }

    pub fn get(&self, operation_kind: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(operation_kind).cloned()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.handlers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Submit-time validation: known types get their handler's shape
    /// check; unknown types pass (another agent in a heterogeneous fleet
    /// may carry the handler).
    pub fn validate(&self, operation: &Operation) -> Result<(), HandlerError> {
        match self.get(operation.kind()) {
            Some(handler) => handler.validate(operation),
            None => Ok(()),
        }
    }
}
