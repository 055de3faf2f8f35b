// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `osapi agent` subcommands.

use crate::client::ApiClient;
use crate::output;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List live agents
    List,
    /// Show one agent (live probe, registry fallback)
    Show { hostname: String },
}

pub async fn run(client: &ApiClient, command: AgentCommand, json_output: bool) -> anyhow::Result<()> {
    match command {
        AgentCommand::List => list(client, json_output).await,
        AgentCommand::Show { hostname } => show(client, &hostname, json_output).await,
    }
}

async fn list(client: &ApiClient, json_output: bool) -> anyhow::Result<()> {
    let body = client.get("/agents").await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = body["agents"]
        .as_array()
        .map(|agents| {
            agents
                .iter()
                .map(|agent| {
                    let labels = agent["labels"]
                        .as_object()
                        .map(|labels| {
                            labels
                                .iter()
                                .map(|(k, v)| format!("{k}={}", v.as_str().unwrap_or("?")))
                                .collect::<Vec<_>>()
                                .join(",")
                        })
                        .unwrap_or_default();
                    vec![
                        output::field(agent, "hostname"),
                        labels,
                        format!("{}s", agent["uptime_secs"].as_u64().unwrap_or(0)),
                        output::format_ms(agent["registered_at_ms"].as_u64().unwrap_or(0)),
                    ]
                })
                .collect()
        })
        .unwrap_or_default();
    print!("{}", output::table(&["hostname", "labels", "uptime", "registered"], &rows));
    println!("{} total", body["total"].as_u64().unwrap_or(0));
    Ok(())
}

async fn show(client: &ApiClient, hostname: &str, json_output: bool) -> anyhow::Result<()> {
    let agent = client.get(&format!("/agents/{hostname}")).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&agent)?);
        return Ok(());
    }

    println!("hostname:   {}", output::field(&agent, "hostname"));
    println!("os:         {} {} ({})",
        agent["os_info"]["name"].as_str().unwrap_or("-"),
        agent["os_info"]["version"].as_str().unwrap_or(""),
        agent["os_info"]["kernel"].as_str().unwrap_or("-"),
    );
    println!(
        "load:       {} {} {}",
        agent["load_average"]["one"],
        agent["load_average"]["five"],
        agent["load_average"]["fifteen"],
    );
    println!(
        "memory:     {}/{} kB available",
        agent["memory"]["available_kb"],
        agent["memory"]["total_kb"],
    );
    println!("uptime:     {}s", agent["uptime_secs"].as_u64().unwrap_or(0));
    println!("started:    {}", output::format_ms(agent["started_at_ms"].as_u64().unwrap_or(0)));
    println!("registered: {}", output::format_ms(agent["registered_at_ms"].as_u64().unwrap_or(0)));
    if agent["stale"].as_bool() == Some(true) {
        println!("stale:      registry snapshot (agent did not answer the live probe)");
    }
    Ok(())
}
