// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifiers and ID generation.
//!
//! Job IDs are 128-bit UUIDs in canonical textual form. Generation goes
//! through [`IdGen`] so tests can pin IDs deterministically.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a job submission.
///
/// One ID per `POST /jobs` call, shared by every envelope the submission
/// fans out to. Canonical form is the hyphenated lowercase UUID text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generator for unique IDs
pub trait IdGen: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v4 generator (production)
#[derive(Clone, Copy, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Fixed-sequence generator for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct SeqIdGen {
    prefix: String,
    counter: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-support"))]
impl SeqIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), counter: std::sync::atomic::AtomicU64::new(0) }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl IdGen for SeqIdGen {
    fn generate(&self) -> String {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("{}-{:04}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
