// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # vols3 controller binary
//!
//! Boots the per-node mount controller: configuration from `VOLS3_*`
//! environment variables, JSON logs, the HTTP status surface, and the
//! reconcile loop. `--validate-config` prints the validation JSON and exits
//! without touching the runtime.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vols3_core::application::MountController;
use vols3_core::domain::config::Config;
use vols3_core::infrastructure::DockerRuntime;

/// Per-node S3 mount controller.
#[derive(Parser)]
#[command(name = "vols3")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print configuration validation JSON and exit (0 valid, 1 invalid).
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    if cli.validate_config {
        let report = config.validate();
        println!("{}", serde_json::to_string(&report)?);
        std::process::exit(if report.ok { 0 } else { 1 });
    }

    init_tracing(&config.log_level);

    let report = config.validate();
    info!(
        summary = %serde_json::to_string(&report.summary).unwrap_or_default(),
        "effective_config"
    );
    for warning in &report.warnings {
        warn!("config: {}", warning);
    }
    for problem in &report.errors {
        error!("config: {}", problem);
    }

    let runtime = Arc::new(DockerRuntime::new(None).context("init container runtime")?);
    let controller = Arc::new(MountController::new(config.clone(), runtime));

    let cancel = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "http listening");
    let app = vols3_core::presentation::app(controller.clone());
    let http_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .await
        {
            error!("http server: {}", e);
        }
    });

    let run_handle = tokio::spawn(controller.clone().run(cancel.clone()));

    shutdown_signal().await;
    info!("shutdown signal received");
    cancel.cancel();

    let _ = run_handle.await;
    let _ = server.await;

    // Cleanup issues fresh runtime calls, so it runs after the loop has
    // observed cancellation rather than under the cancelled token.
    controller.shutdown_cleanup().await;
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
