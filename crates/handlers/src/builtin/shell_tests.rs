// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn shell_op(command: &str) -> Operation {
    Operation::new("command.shell").unwrap().with_field("command", command)
}

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let data = CommandShell.execute(&shell_op("echo hello")).await.unwrap();
    assert_eq!(data["exit_code"], 0);
    assert_eq!(data["stdout"], "hello\n");
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_with_stderr() {
    let err = CommandShell
        .execute(&shell_op("echo oops >&2; exit 3"))
        .await
        .unwrap_err();
    match err {
        HandlerError::Failed(msg) => {
            assert!(msg.contains("exit status 3"), "message: {msg}");
            assert!(msg.contains("oops"), "message: {msg}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_command_rejects_at_validation() {
    let op = Operation::new("command.shell").unwrap();
    assert!(matches!(CommandShell.validate(&op), Err(HandlerError::Invalid(_))));
}

#[yare::parameterized(
    default_when_absent = { None, DEFAULT_TIMEOUT },
    honored_below_cap   = { Some(60), Duration::from_secs(60) },
    clamped_to_cap      = { Some(3_600), MAX_SHELL_TIMEOUT },
)]
fn timeout_policy(requested: Option<u64>, expected: Duration) {
    let mut op = Operation::new("command.shell").unwrap().with_field("command", "true");
    if let Some(secs) = requested {
        op = op.with_field("timeout_secs", secs);
    }
    assert_eq!(CommandShell.timeout(&op), expected);
}

#[tokio::test]
async fn runtime_timeout_bounds_execution() {
    // The runtime enforces the bound by racing the handler future; the
    // handler only declares it. Emulate the runtime here.
    let op = shell_op("sleep 30");
    let result =
        tokio::time::timeout(Duration::from_millis(100), CommandShell.execute(&op)).await;
    assert!(result.is_err());
}
