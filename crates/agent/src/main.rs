// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! osapi-agent daemon entry point.

use clap::Parser;
use osapi_agent::{AgentConfig, AgentRuntime};
use osapi_bus::NatsBus;
use osapi_core::{Hostname, Namespace, SystemClock};
use osapi_dispatch::{ensure_topology, TopologyConfig};
use osapi_handlers::{facts::FactsReader, HandlerRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "osapi-agent", version, about = "osapi per-host agent")]
struct Cli {
    /// Path to the agent config file (TOML)
    #[arg(long, env = "OSAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Bus URL override
    #[arg(long)]
    bus_url: Option<String>,

    /// Hostname override (defaults to the kernel hostname)
    #[arg(long)]
    hostname: Option<String>,

    /// Extra label, k=v (repeatable)
    #[arg(long = "label", value_name = "K=V")]
    labels: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("OSAPI_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.bus_url {
        config.bus.url = url;
    }
    if let Some(hostname) = cli.hostname {
        config.agent.hostname = Some(hostname);
    }
    for label in &cli.labels {
        let Some((key, value)) = label.split_once('=') else {
            return Err(format!("invalid --label {label:?}: expected k=v").into());
        };
        config.agent.labels.insert(key.to_string(), value.to_string());
    }

    let facts = FactsReader::new();
    let hostname = match &config.agent.hostname {
        Some(name) => Hostname::parse(name)?,
        None => facts
            .hostname()
            .ok_or("cannot determine hostname; set agent.hostname or OSAPI_HOSTNAME")?,
    };
    let namespace = Namespace::new(config.bus.namespace.clone())?;

    let bus = Arc::new(NatsBus::connect(&config.bus.url).await?);
    ensure_topology(
        &*bus,
        &namespace,
        &TopologyConfig { registry_ttl: config.registry_ttl(), ..TopologyConfig::default() },
    )
    .await?;

    let handlers = Arc::new(HandlerRegistry::builtin(hostname.clone()));
    let runtime = AgentRuntime::new(
        bus,
        namespace,
        hostname,
        handlers,
        config,
        SystemClock,
    )
    .with_facts(facts);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());
    runtime.run(cancel).await?;
    Ok(())
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let (mut interrupt, mut terminate) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(i), Ok(t)) => (i, t),
            (i, t) => {
                tracing::error!(
                    interrupt_ok = i.is_ok(),
                    terminate_ok = t.is_ok(),
                    "signal handler installation failed; shutdown only via kill -9"
                );
                return;
            }
        };
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("SIGINT received, shutting down"),
            _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
        }
        cancel.cancel();
    });
}
