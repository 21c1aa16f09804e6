//! Graph relay
//!
//! Accepts graph-processing requests from clients and forwards each one to
//! the next backend in rotation.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌───────────────────────────────────────────────┐
//!                     │                  GRAPH RELAY                  │
//!                     │                                               │
//!   Client request    │  ┌──────────┐   ┌──────────┐   ┌────────────┐ │
//!   ──────────────────┼─▶│   net    │──▶│ protocol │──▶│load_balancer│─┼──▶ Backend
//!                     │  │ listener │   │  framer  │   │ round robin│ │   (fresh conn)
//!                     │  └──────────┘   └──────────┘   └────────────┘ │
//!                     │                                               │
//!   Client reply      │  ┌──────────────────────────┐                 │
//!   ◀─────────────────┼──│ proxy: normalize identity│◀────────────────┼─── Backend reply
//!                     │  └──────────────────────────┘                 │
//!                     │                                               │
//!                     │  config · observability · lifecycle           │
//!                     └───────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use graph_relay::config::validation::validate_config;
use graph_relay::config::{read_config, ConfigError, RelayConfig};
use graph_relay::lifecycle::{signals, Shutdown};
use graph_relay::net::Listener;
use graph_relay::observability::{logging, metrics};
use graph_relay::RelayServer;

#[derive(Parser)]
#[command(name = "graph-relay")]
#[command(about = "Round-robin relay for graph-processing requests", long_about = None)]
struct Cli {
    /// Address to listen on
    host: IpAddr,

    /// Port to listen on
    port: u16,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => RelayConfig::default(),
    };
    config.listener.bind_address = SocketAddr::new(cli.host, cli.port).to_string();
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability.log_level);
    tracing::info!("graph-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        backends = config.backends.len(),
        client_idle_ms = config.timeouts.client_idle_ms,
        backend_ms = config.timeouts.backend_ms,
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

    let listener = Listener::bind(&config.listener).await?;
    let server = RelayServer::new(&config)?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
