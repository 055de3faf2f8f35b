// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `command.shell` handler.

use crate::{Handler, HandlerError, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use osapi_core::Operation;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Hard ceiling on shell execution, regardless of what the caller asks for.
pub const MAX_SHELL_TIMEOUT: Duration = Duration::from_secs(300);

/// `command.shell`: run a shell command and capture its output.
///
/// A caller-supplied `timeout_secs` is honored up to [`MAX_SHELL_TIMEOUT`].
/// Non-zero exit is a handler failure carrying the exit status and
/// trailing stderr; the captured output still rides along in the
/// response's error text rather than the data field.
pub struct CommandShell;

impl CommandShell {
    fn command_field(operation: &Operation) -> Result<String, HandlerError> {
        operation
            .field("command")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| HandlerError::Invalid("missing required field \"command\"".to_string()))
    }
}

#[async_trait]
impl Handler for CommandShell {
    fn operation(&self) -> &'static str {
        "command.shell"
    }

    fn timeout(&self, operation: &Operation) -> Duration {
        let requested = operation
            .field("timeout_secs")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        requested.min(MAX_SHELL_TIMEOUT)
    }

    fn validate(&self, operation: &Operation) -> Result<(), HandlerError> {
        Self::command_field(operation).map(|_| ())
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, HandlerError> {
        let command = Self::command_field(operation)?;

        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HandlerError::Transient(format!("spawn /bin/sh: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(0) => Ok(json!({ "exit_code": 0, "stdout": stdout, "stderr": stderr })),
            Some(code) => Err(HandlerError::Failed(format!(
                "exit status {code}: {}",
                stderr.trim_end()
            ))),
            None => Err(HandlerError::Failed("killed by signal".to_string())),
        }
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
