//! socket-relay
//!
//! WebSocket relay server built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──upgrade──▶ http::server ──▶ http::websocket ──▶ relay::Relay
//!                                                              │
//!                         ┌────────────────────────────────────┤
//!                         ▼                                    ▼
//!                  reader loop ──▶ reassembler ──▶ processor   liveness monitor
//!                  writer loop ◀── outbound queue ◀──┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use socket_relay::config::{self, validation::validate_config, RelayServerConfig};
use socket_relay::lifecycle::{signals, Shutdown};
use socket_relay::observability::{logging, metrics};
use socket_relay::relay::EchoProcessor;
use socket_relay::HttpServer;

#[derive(Parser)]
#[command(name = "socket-relay")]
#[command(about = "WebSocket message relay server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => RelayServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        if let Err(errors) = validate_config(&config) {
            return Err(config::ConfigError::Validation(errors).into());
        }
    }

    logging::init_logging(&config.observability);
    tracing::info!("socket-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        path = %config.relay.path,
        max_message_bytes = config.relay.max_message_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::forward_signals(shutdown.clone()));

    let server = HttpServer::new(config, Arc::new(EchoProcessor));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
