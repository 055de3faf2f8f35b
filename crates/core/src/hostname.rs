// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent hostname identifier.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Hostname of an agent, globally unique within the fleet.
///
/// Hostnames appear as bus subject tokens, so they must stay within the
/// token alphabet (ASCII, no dots, spaces, or wildcards). Use
/// [`Hostname::parse`] at trust boundaries; `new` is for values already
/// validated or produced by this process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hostname(pub String);

impl Hostname {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Validate and construct a hostname from untrusted input.
    pub fn parse(name: &str) -> Result<Self, HostnameError> {
        if name.is_empty() {
            return Err(HostnameError::Empty);
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(HostnameError::InvalidCharacter(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Hostname {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Hostname {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for Hostname {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Hostname {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for Hostname {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Invalid hostname input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostnameError {
    #[error("hostname is empty")]
    Empty,
    #[error("hostname contains characters outside [A-Za-z0-9_-]: {0:?}")]
    InvalidCharacter(String),
}

#[cfg(test)]
#[path = "hostname_tests.rs"]
mod tests;
