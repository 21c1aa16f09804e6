use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use graph_relay::client::{read_edge_list, sample_input_path, GraphClient, RequestCounter};
use graph_relay::config::{load_config, RelayConfig};
use graph_relay::observability::logging;
use graph_relay::store::CorrelationStore;

#[derive(Parser)]
#[command(name = "graph-client")]
#[command(about = "Send sample graphs through the relay and check the replies", long_about = None)]
struct Cli {
    /// Number of requests to send
    num_requests: usize,

    proxy_ip: IpAddr,

    proxy_port: u16,

    /// Directory holding sample_input_N.txt edge lists
    #[arg(long, default_value = "sample_inputs")]
    inputs: PathBuf,

    /// Shared TOML configuration; its store and framing sections apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Correlation log file, overriding the configured one
    #[arg(long)]
    store: Option<PathBuf>,

    /// How long to wait for each reply
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Where per-address request counters live
    #[arg(long, default_value = "/tmp/graph_relay_request_ids")]
    counter_dir: PathBuf,

    #[arg(long, default_value = "warn")]
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

    let client = GraphClient::new(
        SocketAddr::new(cli.proxy_ip, cli.proxy_port),
        RequestCounter::new(cli.counter_dir),
    )
    .with_store(store)
    .with_framing(config.framing)
    .with_timeout(Duration::from_millis(cli.timeout_ms));

    let mut failures = 0;
    for i in 0..cli.num_requests {
        let path = sample_input_path(&cli.inputs, i + 1);
        let graph = read_edge_list(&path).map_err(|e| format!("{}: {}", path.display(), e))?;

        match client.send(graph).await {
            Ok(trip) => {
                for mismatch in &trip.mismatches {
                    println!("{}", mismatch);
                }
                println!(
                    "[Client] backend={} req_id={} vertices={} correct={}",
                    trip.reply.backend,
                    trip.req_id,
                    trip.reply.vertex_count,
                    trip.is_correct()
                );
                if !trip.is_correct() {
                    failures += 1;
                }
            }
            Err(e) => {
                eprintln!("[Client] request {} failed: {}", i, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} requests failed", failures, cli.num_requests).into());
    }
    Ok(())
}
