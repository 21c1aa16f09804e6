use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use graph_relay::backend::BackendServer;
use graph_relay::config::{load_config, ListenerConfig, RelayConfig};
use graph_relay::lifecycle::{signals, Shutdown};
use graph_relay::net::Listener;
use graph_relay::observability::logging;
use graph_relay::store::CorrelationStore;

#[derive(Parser)]
#[command(name = "graph-backend")]
#[command(about = "Graph worker that answers with the vertex count", long_about = None)]
struct Cli {
    /// Address to bind; also reported as this worker's identity
    ip: IpAddr,

    #[arg(default_value_t = 6000)]
    port: u16,

    /// Shared TOML configuration; its store and framing sections apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Correlation log file, overriding the configured one
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// How long to wait for a request on an accepted connection
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    let store = match cli.store {
        Some(path) => CorrelationStore::new(path),
        None => CorrelationStore::from_config(&config.store),
    };
    store.ensure()?;

    let listener = Listener::bind(&ListenerConfig {
        bind_address: SocketAddr::new(cli.ip, cli.port).to_string(),
        ..ListenerConfig::default()
    })
    .await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    BackendServer::new(cli.ip.to_string())
        .with_store(store)
        .with_framing(config.framing)
        .with_request_timeout(Duration::from_millis(cli.timeout_ms))
        .run(listener, shutdown.subscribe())
        .await?;
    Ok(())
}
