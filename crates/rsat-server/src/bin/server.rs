//! # RSAT REST Server
//!
//! Standalone binary serving the configured RSAT tools over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Run with config/rsat-rest.toml
//! cargo run --bin rsat-server
//!
//! # Explicit config and bind address
//! rsat-server --config /etc/rsat-rest.toml --bind 127.0.0.1:9000
//!
//! # Override any setting from the environment
//! RSAT_REST__EXECUTION__SYNC_TIMEOUT_SECONDS=60 rsat-server
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;

use rsat_server::{router, AppState, ToolRegistry};
use rsat_shared::config::{ServiceConfig, CONFIG_PATH_ENV};
use rsat_shared::execution::ProcessExecutor;
use rsat_shared::logging;

#[derive(Debug, Parser)]
#[command(name = "rsat-server", version, about = "REST endpoints for RSAT command-line tools")]
struct Args {
    /// Service configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load service config")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    // Initialize logging once the config has told us how
    logging::init_tracing(&config.logging);

    info!("Starting RSAT REST Server...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    tokio::fs::create_dir_all(&config.storage.tmp_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create result root {}",
                config.storage.tmp_root.display()
            )
        })?;

    let registry = ToolRegistry::from_config(&config, Arc::new(ProcessExecutor))
        .context("Failed to register tools")?;
    info!("   Tools: {}", registry.len());
    info!("   Results: {}", config.storage.tmp_root.display());

    let bind_address = config.server.bind_address.clone();
    let app = router(AppState::new(registry, config));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!("   Listening on {bind_address}");
    info!("   Press Ctrl+C to shutdown gracefully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("RSAT REST Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
