// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `osapi health` command.

use crate::client::ApiClient;
use crate::output;
use clap::Args;

#[derive(Args)]
pub struct HealthArgs {
    /// Check readiness only (no auth required)
    #[arg(long)]
    ready: bool,
}

pub async fn run(client: &ApiClient, args: HealthArgs, json_output: bool) -> anyhow::Result<()> {
    if args.ready {
        let body = client.get("/health/ready").await?;
        if json_output {
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!("ready: {}", body["ready"]);
        }
        return Ok(());
    }

    let report = client.get("/health/status").await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("status: {}", output::field(&report, "status"));
    let rows: Vec<Vec<String>> = report["components"]
        .as_array()
        .map(|components| {
            components
                .iter()
                .map(|component| {
                    vec![
                        output::field(component, "name"),
                        output::field(component, "status"),
                        output::field(component, "error"),
                    ]
                })
                .collect()
        })
        .unwrap_or_default();
    print!("{}", output::table(&["component", "status", "error"], &rows));
    Ok(())
}
