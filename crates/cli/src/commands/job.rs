// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `osapi job` subcommands.

use crate::client::ApiClient;
use crate::output;
use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Subcommand)]
pub enum JobCommand {
    /// Submit a job to one or many agents
    Submit(SubmitArgs),
    /// Show one job in full
    Get { id: String },
    /// List jobs
    List(ListArgs),
    /// Delete a job record (does not cancel in-flight work)
    Delete { id: String },
    /// Re-dispatch a job's operation as a new job
    Retry(RetryArgs),
    /// Queue summary: counts by status, DLQ depth
    Queue,
}

#[derive(Args)]
pub struct SubmitArgs {
    /// Operation type, e.g. system.hostname
    #[arg(long = "type", value_name = "CATEGORY.NAME")]
    operation: String,

    /// Target: _any, _all, a hostname, or label:k=v[,k=v]
    #[arg(long, default_value = "_any")]
    target: String,

    /// Operation field, k=v (repeatable; v parsed as JSON when possible)
    #[arg(long = "field", value_name = "K=V")]
    fields: Vec<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Filter by status (submitted, processing, completed, failed,
    /// partial_failure, dead_letter)
    #[arg(long)]
    status: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args)]
pub struct RetryArgs {
    id: String,

    /// Override the original target
    #[arg(long)]
    target: Option<String>,
}

pub async fn run(client: &ApiClient, command: JobCommand, json_output: bool) -> anyhow::Result<()> {
    match command {
        JobCommand::Submit(args) => submit(client, args, json_output).await,
        JobCommand::Get { id } => get(client, &id, json_output).await,
        JobCommand::List(args) => list(client, args, json_output).await,
        JobCommand::Delete { id } => {
            client.delete(&format!("/jobs/{id}")).await?;
            println!("deleted {id}");
            Ok(())
        }
        JobCommand::Retry(args) => retry(client, args, json_output).await,
        JobCommand::Queue => queue(client, json_output).await,
    }
}

async fn submit(client: &ApiClient, args: SubmitArgs, json_output: bool) -> anyhow::Result<()> {
    let mut operation = Map::new();
    operation.insert("type".to_string(), Value::String(args.operation.clone()));
    for field in &args.fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("invalid --field {field:?}: expected k=v"))?;
        // Numbers, booleans, and lists pass through as JSON; anything
        // unparseable is a plain string.
        let value = serde_json::from_str(value).unwrap_or(Value::String(value.to_string()));
        operation.insert(key.to_string(), value);
    }

    let body = json!({ "operation": operation, "target": args.target });
    let receipt = client.post("/jobs", &body).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!("{}", output::field(&receipt, "job_id"));
    }
    Ok(())
}

async fn get(client: &ApiClient, id: &str, json_output: bool) -> anyhow::Result<()> {
    let job = client.get(&format!("/jobs/{id}")).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!("id:        {}", output::field(&job, "id"));
    println!("operation: {}", job["operation"]["type"].as_str().unwrap_or("-"));
    println!("target:    {}", output::field(&job, "target"));
    println!("status:    {}", output::field(&job, "status"));
    println!("created:   {}", output::format_ms(job["created_at_ms"].as_u64().unwrap_or(0)));
    println!("updated:   {}", output::format_ms(job["updated_at_ms"].as_u64().unwrap_or(0)));
    if let Some(error) = job["error"].as_str() {
        println!("error:     {error}");
    }

    if let Some(states) = job["worker_states"].as_object() {
        let rows: Vec<Vec<String>> = states
            .iter()
            .map(|(host, state)| {
                vec![
                    host.clone(),
                    output::field(state, "status"),
                    state["duration_ms"]
                        .as_u64()
                        .map(|ms| format!("{ms}ms"))
                        .unwrap_or_else(|| "-".to_string()),
                    output::field(state, "error"),
                ]
            })
            .collect();
        if !rows.is_empty() {
            println!();
            print!("{}", output::table(&["host", "status", "duration", "error"], &rows));
        }
    }

    if let Some(timeline) = job["timeline"].as_array() {
        println!();
        for entry in timeline {
            println!(
                "{}  {:<16} {:<8} {}",
                output::format_ms(entry["timestamp_ms"].as_u64().unwrap_or(0)),
                output::field(entry, "event"),
                output::field(entry, "hostname"),
                entry["error"]
                    .as_str()
                    .or(entry["message"].as_str())
                    .unwrap_or(""),
            );
        }
    }
    Ok(())
}

async fn list(client: &ApiClient, args: ListArgs, json_output: bool) -> anyhow::Result<()> {
    let mut path = format!("/jobs?limit={}&offset={}", args.limit, args.offset);
    if let Some(status) = &args.status {
        path.push_str(&format!("&status={status}"));
    }
    let page = client.get(&path).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = page["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|job| {
                    vec![
                        output::field(job, "id"),
                        output::field(job, "operation"),
                        output::field(job, "target"),
                        output::field(job, "status"),
                        output::format_ms(job["created_at_ms"].as_u64().unwrap_or(0)),
                    ]
                })
                .collect()
        })
        .unwrap_or_default();
    print!("{}", output::table(&["id", "operation", "target", "status", "created"], &rows));
    println!("{} total", page["total_items"].as_u64().unwrap_or(0));
    Ok(())
}

async fn retry(client: &ApiClient, args: RetryArgs, json_output: bool) -> anyhow::Result<()> {
    let body = match &args.target {
        Some(target) => json!({ "target": target }),
        None => json!({}),
    };
    let receipt = client.post(&format!("/jobs/{}/retry", args.id), &body).await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!("{}", output::field(&receipt, "job_id"));
    }
    Ok(())
}

async fn queue(client: &ApiClient, json_output: bool) -> anyhow::Result<()> {
    let stats = client.get("/jobs/queue").await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("jobs: {}   dlq: {}", output::field(&stats, "total_jobs"), output::field(&stats, "dlq_messages"));
    if let Some(by_status) = stats["by_status"].as_object() {
        let rows: Vec<Vec<String>> = by_status
            .iter()
            .map(|(status, count)| vec![status.clone(), count.to_string()])
            .collect();
        print!("{}", output::table(&["status", "count"], &rows));
    }
    if let Some(by_operation) = stats["by_operation"].as_object() {
        let rows: Vec<Vec<String>> = by_operation
            .iter()
            .map(|(operation, count)| vec![operation.clone(), count.to_string()])
            .collect();
        print!("{}", output::table(&["operation", "count"], &rows));
    }
    Ok(())
}
