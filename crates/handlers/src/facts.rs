// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host fact collection from /proc and /etc/os-release.
//!
//! Facts are advisory registry metadata; a missing or unreadable file
//! yields the type's default rather than an error, so registration never
//! fails because a kernel interface moved.

use osapi_core::{Hostname, LoadAverage, MemoryInfo, OsInfo};
use std::fs;
use std::path::PathBuf;

/// Reads host facts relative to a filesystem root (tests point this at a
/// fixture directory).
#[derive(Debug, Clone)]
pub struct FactsReader {
    root: PathBuf,
}

impl Default for FactsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FactsReader {
    pub fn new() -> Self {
        Self { root: PathBuf::from("/") }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.root.join(rel)).ok()
    }

    /// Kernel hostname; `None` when unreadable (caller falls back to
    /// configuration).
    pub fn hostname(&self) -> Option<Hostname> {
        let raw = self.read("proc/sys/kernel/hostname")?;
        Hostname::parse(raw.trim()).ok()
    }

    pub fn os_info(&self) -> OsInfo {
        let mut info = OsInfo {
            kernel: self
                .read("proc/sys/kernel/osrelease")
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            ..OsInfo::default()
        };
        let Some(release) = self.read("etc/os-release") else {
            return info;
        };
        for line in release.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key {
                "NAME" => info.name = value,
                "VERSION_ID" => info.version = value,
                _ => {}
            }
        }
        info
    }

    pub fn load_average(&self) -> LoadAverage {
        let Some(raw) = self.read("proc/loadavg") else {
            return LoadAverage::default();
        };
        let mut fields = raw.split_whitespace();
        let mut next = || fields.next().and_then(|f| f.parse().ok()).unwrap_or(0.0);
        LoadAverage { one: next(), five: next(), fifteen: next() }
    }

    pub fn memory(&self) -> MemoryInfo {
        let Some(raw) = self.read("proc/meminfo") else {
            return MemoryInfo::default();
        };
        let mut memory = MemoryInfo::default();
        for line in raw.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let kb = rest
                .trim()
                .trim_end_matches(" kB")
                .parse()
                .unwrap_or(0);
            match key {
                "MemTotal" => memory.total_kb = kb,
                "MemAvailable" => memory.available_kb = kb,
                _ => {}
            }
        }
        memory
    }

    pub fn uptime_secs(&self) -> u64 {
        self.read("proc/uptime")
            .and_then(|raw| {
                raw.split_whitespace()
                    .next()
                    .and_then(|f| f.parse::<f64>().ok())
            })
            .map(|secs| secs as u64)
            .unwrap_or(0)
    }
}
