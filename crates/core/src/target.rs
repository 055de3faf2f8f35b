// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job target selector.

use crate::hostname::{Hostname, HostnameError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which agents a job should reach.
///
/// Serializes to/from the wire string forms: `"_any"`, `"_all"`,
/// `"label:k=v,k2=v2"`, or a bare hostname. Resolution against the live
/// registry happens at submit time; see the registry crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One live agent, chosen deterministically. Callers must not depend
    /// on which.
    Any,
    /// Every live agent at resolution time.
    All,
    /// A single named agent.
    Host(Hostname),
    /// Every live agent matching all `k=v` equalities.
    Labels(Vec<(String, String)>),
}

impl Target {
    pub fn host(name: impl Into<Hostname>) -> Self {
        Target::Host(name.into())
    }

    pub fn labels<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Target::Labels(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// True when `labels` satisfies this selector's equalities.
    ///
    /// Only meaningful for the `Labels` variant; the broadcast and host
    /// variants return false because they do not select by label.
    pub fn matches_labels(&self, labels: &std::collections::HashMap<String, String>) -> bool {
        match self {
            Target::Labels(pairs) => {
                pairs.iter().all(|(k, v)| labels.get(k).map(String::as_str) == Some(v.as_str()))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Any => write!(f, "_any"),
            Target::All => write!(f, "_all"),
            Target::Host(host) => write!(f, "{}", host),
            Target::Labels(pairs) => {
                write!(f, "label:")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(TargetError::Empty),
            "_any" => Ok(Target::Any),
            "_all" => Ok(Target::All),
            _ => {
                if let Some(selector) = s.strip_prefix("label:") {
                    parse_label_selector(selector)
                } else {
                    Ok(Target::Host(Hostname::parse(s)?))
                }
            }
        }
    }
}

fn parse_label_selector(selector: &str) -> Result<Target, TargetError> {
    let mut pairs = Vec::new();
    for clause in selector.split(',') {
        let (key, value) = clause
            .split_once('=')
            .ok_or_else(|| TargetError::InvalidSelector(selector.to_string()))?;
        if key.is_empty() || value.is_empty() {
            return Err(TargetError::InvalidSelector(selector.to_string()));
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    if pairs.is_empty() {
        return Err(TargetError::InvalidSelector(selector.to_string()));
    }
    Ok(Target::Labels(pairs))
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Invalid target input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target is empty")]
    Empty,
    #[error("invalid label selector {0:?}: expected k=v[,k=v…]")]
    InvalidSelector(String),
    #[error(transparent)]
    InvalidHostname(#[from] HostnameError),
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
