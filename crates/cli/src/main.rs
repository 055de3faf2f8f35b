// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! osapi operator CLI.
//!
//! Thin REST client: every command maps onto one API call. Exit codes
//! are 0 on success and 1 on any failure, including argument errors;
//! never 2.

mod client;
mod commands;
mod output;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use client::ApiClient;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "osapi", version, about = "osapi control-plane client")]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "OSAPI_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Bearer token
    #[arg(long, global = true, env = "OSAPI_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit and inspect jobs
    #[command(subcommand)]
    Job(commands::job::JobCommand),

    /// Inspect registered agents
    #[command(subcommand)]
    Agent(commands::agent::AgentCommand),

    /// Control-plane health
    Health(commands::health::HealthArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are successes; anything else is a plain
            // failure. Argument errors never exit 2.
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            let _ = e.print();
            return code;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("osapi: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("osapi: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ApiClient::new(cli.api_url, cli.token)?;
    match cli.command {
        Command::Job(command) => commands::job::run(&client, command, cli.json).await,
        Command::Agent(command) => commands::agent::run(&client, command, cli.json).await,
        Command::Health(args) => commands::health::run(&client, args, cli.json).await,
    }
}
