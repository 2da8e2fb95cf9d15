//! # parley
//!
//! Parley signaling relay binary: loads settings, starts the server and
//! shuts it down on ctrl-c.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use parley_core::RegistryDirectory;
use parley_server::{ParleyServer, ServerConfig};
use parley_settings::{ParleySettings, load_settings_from_path, settings_path};

/// Parley signaling relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "WebSocket signaling relay", version)]
struct Cli {
    /// Settings file (default `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    /// Settings from file and environment, with CLI flags on top.
    fn load_settings(&self) -> Result<ParleySettings> {
        let path = match &self.config {
            Some(path) => {
                if !path.exists() {
                    bail!("Settings file not found: {}", path.display());
                }
                path.clone()
            }
            None => settings_path(),
        };
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut ParleySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    logging::init(&settings.logging)?;

    let metrics_handle =
        parley_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    tracing::info!(
        max_connections = config.max_connections,
        duplicate_policy = ?config.duplicate_policy,
        heartbeat_interval_secs = config.heartbeat_interval_secs,
        "Starting Parley relay"
    );

    let server = ParleyServer::new(config, Arc::new(RegistryDirectory::new()), metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Parley relay listening on ws://{addr}/signal/{{group_code}}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let drained = server.graceful_shutdown().await;
    let _ = handle.await;

    tracing::info!(drained, "Shutdown complete");
    Ok(())
}
