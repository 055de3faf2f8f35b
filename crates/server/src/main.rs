// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! osapid: the control-plane server daemon.
//!
//! Wires bus → dispatcher → aggregation tasks → REST, with cooperative
//! shutdown: SIGINT/SIGTERM stops the HTTP listener first, then the
//! aggregator and DLQ watcher.

use clap::Parser;
use osapi_bus::NatsBus;
use osapi_core::{Hostname, Namespace, SystemClock, UuidIdGen};
use osapi_dispatch::{ensure_topology, Aggregator, Dispatcher, DlqWatcher, KvAuditSink};
use osapi_handlers::HandlerRegistry;
use osapi_server::auth::AuthConfig;
use osapi_server::config::ServerConfig;
use osapi_server::{routes, AppState};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "osapid", version, about = "osapi control-plane server")]
struct Cli {
    /// Path to the server config file (TOML)
    #[arg(long, env = "OSAPI_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    listen: Option<String>,

    /// Bus URL override
    #[arg(long)]
    bus_url: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(listen) = cli.listen {
                config.http.listen = listen;
            }
            if let Some(url) = cli.bus_url {
                config.bus.url = url;
            }
            config
        }
        Err(e) => {
            eprintln!("osapid: {e}");
            return ExitCode::FAILURE;
        }
    };

    // File logging needs the appender guard alive for the process
    // lifetime, so initialize before entering the runtime.
    let filter = EnvFilter::try_from_env("OSAPI_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _guard = match &config.log.file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let prefix = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let appender = tracing_appender::rolling::daily(
                directory,
                prefix.unwrap_or_else(|| "osapid.log".to_string()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "runtime startup failed");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "osapid failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let namespace = Namespace::new(config.bus.namespace.clone())?;
    let bus = Arc::new(NatsBus::connect(&config.bus.url).await?);
    ensure_topology(&*bus, &namespace, &config.topology()).await?;

    let clock = SystemClock;
    let ids = Arc::new(UuidIdGen);
    let dispatcher = Dispatcher::new(
        bus.clone(),
        namespace.clone(),
        // Validation-only registry; nothing executes on the server.
        Arc::new(HandlerRegistry::builtin(Hostname::new("dispatcher"))),
        clock.clone(),
        ids.clone(),
    );
    let audit = Arc::new(KvAuditSink::new(bus.as_ref(), &namespace, ids, clock.clone()));
    let auth = if config.auth.disabled {
        tracing::warn!("authentication disabled; every caller is anonymous admin");
        Arc::new(AuthConfig::disabled())
    } else {
        Arc::new(AuthConfig::new(config.auth.secret.clone()))
    };

    let state = AppState {
        dispatcher,
        bus: bus.clone(),
        audit,
        auth,
        namespace: namespace.clone(),
    };

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let aggregator = tokio::spawn(
        Aggregator::new(bus.clone(), namespace.clone(), clock.clone()).run(cancel.clone()),
    );
    let dlq_watcher =
        tokio::spawn(DlqWatcher::new(bus, namespace, clock).run(cancel.clone()));

    let listener = tokio::net::TcpListener::bind(&config.http.listen).await?;
    tracing::info!(listen = %config.http.listen, "osapid serving");
    let shutdown = cancel.clone();
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    // HTTP is down; stop the background tasks too.
    cancel.cancel();
    match aggregator.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "aggregator exited with error"),
        Err(e) => tracing::warn!(error = %e, "aggregator task panicked"),
    }
    match dlq_watcher.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "dlq watcher exited with error"),
        Err(e) => tracing::warn!(error = %e, "dlq watcher task panicked"),
    }
    tracing::info!("osapid stopped");
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
