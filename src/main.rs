//! # sockjs
//!
//! SockJS protocol test server: mounts the services a protocol test suite
//! expects and serves them until Ctrl-C.

#![deny(unsafe_code)]

mod services;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sockjs_server::{Endpoint, EndpointOptions, ServerConfig, SockJsServer};
use sockjs_telemetry::{TelemetryConfig, init_telemetry};

use crate::services::{CloseService, EchoService};

/// SockJS protocol test server.
#[derive(Parser, Debug)]
#[command(name = "sockjs", about = "SockJS protocol test server")]
struct Cli {
    /// Settings file (defaults to `$SOCKJS_CONFIG` or `sockjs.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings, 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,
}

/// Endpoints served by the test server.
fn endpoints(options: &EndpointOptions) -> Vec<Endpoint> {
    let echo = Arc::new(EchoService);
    vec![
        Endpoint::new("/echo", echo.clone(), options.clone()),
        Endpoint::new("/close", Arc::new(CloseService), options.clone()),
        Endpoint::new(
            "/disabled_websocket_echo",
            echo.clone(),
            options.clone().without_websocket(),
        ),
        Endpoint::new(
            "/cookie_needed_echo",
            echo,
            options.clone().with_cookie_needed(),
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => sockjs_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => sockjs_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let telemetry = TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json)
        .context("Invalid log level")?;
    let _telemetry = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let metrics_handle =
        sockjs_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let options = EndpointOptions::from(&settings.sockjs);
    let mut server = SockJsServer::new(ServerConfig::from(&settings.server)).with_metrics(metrics_handle);
    for endpoint in endpoints(&options) {
        server = server.endpoint(endpoint);
    }
    let server = Arc::new(server);

    let listener = server.bind().await.context("Failed to bind server")?;
    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.run(listener).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.begin_shutdown();
    handle
        .await
        .context("Server task panicked")?
        .context("Server error")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
