//! Catalog gateway
//!
//! One public origin in front of several catalog backends (anime, manga,
//! comics, novels, films). Each backend is reached under its own path prefix.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                   GATEWAY                    │
//!                         │                                              │
//!   Client Request        │  ┌─────────┐   ┌──────────┐   ┌──────────┐   │
//!   ──────────────────────┼─▶│  http   │──▶│ backend  │──▶│  proxy   │───┼──▶ Backend
//!                         │  │ server  │   │ registry │   │ dispatch │   │    API
//!                         │  └────┬────┘   └──────────┘   └────┬─────┘   │
//!                         │       │                            │         │
//!                         │       ├─▶ health probe             ▼         │
//!                         │       └─▶ image fetch ──────▶ relay          │
//!   Client Response       │                                    │         │
//!   ◀─────────────────────┼────────────────────────────────────┘         │
//!                         │                                              │
//!                         │  config · observability · resilience ·       │
//!                         │  lifecycle                                   │
//!                         └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use catalog_gateway::config::load_config;
use catalog_gateway::lifecycle::{build_server, signals, Shutdown};
use catalog_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "catalog-gateway")]
#[command(about = "HTTP gateway in front of media-catalog APIs", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "catalog-gateway starting"
    );

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = build_server(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
