//! # mission-relay
//!
//! Relay server binary: loads settings, starts logging and metrics, and
//! serves the mission relay until interrupted.

#![deny(unsafe_code)]

mod telemetry;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::{RelayServer, ServerConfig};

/// How long open sessions get to wind down after ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Mission relay server.
#[derive(Parser, Debug)]
#[command(name = "mission-relay", about = "Mission command and status relay")]
struct Cli {
    /// Settings file (defaults to `~/.mission-relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive, e.g. `debug` or `relay_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    telemetry::init_logging(&settings.logging, args.log_level.as_deref())
        .context("Failed to initialize logging")?;

    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(ServerConfig::from(&settings.server), Some(metrics));
    let handle = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "Mission relay listening on ws://{}{} ({} events registered)",
        handle.addr,
        server.config().path,
        server.registry().events().len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle.task], Some(SHUTDOWN_GRACE))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
