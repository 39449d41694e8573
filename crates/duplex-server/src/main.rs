//! # duplex-server
//!
//! Binary entry point: loads settings, starts the server, and closes every
//! session on ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use duplex_core::logging;
use duplex_core::settings::{self, DuplexSettings};
use duplex_server::DuplexServer;

/// Duplex WebSocket session server.
#[derive(Parser, Debug)]
#[command(name = "duplex-server", about = "Duplex WebSocket session server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter, e.g. `debug` or `duplex_ws=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Settings file (defaults to `~/.duplex/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn load_settings(&self) -> Result<DuplexSettings> {
        let mut loaded = match &self.settings {
            Some(path) => settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            loaded.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            loaded.server.port = port;
        }
        if let Some(level) = &self.log_level {
            loaded.log_level.clone_from(level);
        }
        Ok(loaded)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    logging::init_subscriber(&settings.log_level);

    let server = DuplexServer::new(settings);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("duplex server listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(server.hub(), None).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
