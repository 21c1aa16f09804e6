//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use graph_relay::backend::BackendServer;
use graph_relay::config::{BackendConfig, RelayConfig};
use graph_relay::lifecycle::Shutdown;
use graph_relay::net::{Listener, ListenerError};
use graph_relay::protocol::{encode_message, FrameError, Framer, JsonObject};
use graph_relay::store::{CorrelationRecord, CorrelationStore};
use graph_relay::RelayServer;

/// What a mock backend does with one request.
pub enum MockReply {
    /// Write this line (newline added) and close.
    Line(String),
    /// Hold the connection open without answering.
    Hang(Duration),
    /// Close without answering.
    Close,
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_mock_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(JsonObject) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let request: JsonObject = match Framer::new(1 << 20)
                    .read_message(&mut socket, Duration::from_secs(5))
                    .await
                {
                    Ok(request) => request,
                    Err(_) => return,
                };
                match f(request).await {
                    MockReply::Line(line) => {
                        let _ = socket.write_all(format!("{}\n", line).as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    MockReply::Hang(duration) => tokio::time::sleep(duration).await,
                    MockReply::Close => {}
                }
            });
        }
    });
    addr
}

/// A mock backend that answers like a real worker reporting `advertise`.
pub async fn start_counting_backend(advertise: &'static str) -> SocketAddr {
    start_mock_backend(move |request| async move {
        let vertex_count = request["graph"]
            .as_object()
            .map(|graph| {
                let mut vertices: Vec<String> = graph.keys().cloned().collect();
                for neighbors in graph.values().filter_map(Value::as_array) {
                    vertices.extend(neighbors.iter().map(|id| match id {
                        Value::String(name) => name.clone(),
                        other => other.to_string(),
                    }));
                }
                vertices.sort_unstable();
                vertices.dedup();
                vertices.len()
            })
            .unwrap_or(0);
        MockReply::Line(
            serde_json::json!({
                "backend": advertise,
                "vertex_count": vertex_count,
                "client_ip": request.get("client_ip"),
                "req_id": request.get("req_id"),
            })
            .to_string(),
        )
    })
    .await
}

/// Start a real backend worker, optionally recording into `store`.
pub async fn start_worker(store: Option<CorrelationStore>) -> (SocketAddr, Shutdown) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_std(tcp, 64).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = BackendServer::new("127.0.0.1");
    if let Some(store) = store {
        server = server.with_store(store);
    }
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(server.run(listener, rx));
    (addr, shutdown)
}

/// Relay configuration for the given `(name, address)` backends.
pub fn relay_config(backends: &[(Option<&str>, SocketAddr)]) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.backends = backends
        .iter()
        .map(|(name, addr)| BackendConfig {
            name: name.map(str::to_string),
            address: addr.to_string(),
        })
        .collect();
    config.timeouts.client_idle_ms = 5_000;
    config.timeouts.backend_ms = 2_000;
    config
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ListenerError>>,
}

pub async fn start_relay(config: RelayConfig) -> RunningRelay {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::from_std(tcp, config.listener.max_connections).unwrap();
    let addr = listener.local_addr().unwrap();

    let server = RelayServer::new(&config).unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, rx));
    RunningRelay { addr, shutdown, handle }
}

/// A test client connection speaking the line protocol.
pub struct Conn {
    pub stream: TcpStream,
    framer: Framer,
}

impl Conn {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            framer: Framer::new(1 << 20),
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn send(&mut self, message: &Value) {
        let bytes = encode_message(message).unwrap();
        self.send_raw(&bytes).await;
    }

    pub async fn read(&mut self) -> Result<JsonObject, FrameError> {
        self.framer.read_message(&mut self.stream, Duration::from_secs(5)).await
    }

    pub async fn request(&mut self, message: &Value) -> JsonObject {
        self.send(message).await;
        self.read().await.unwrap()
    }
}

pub fn graph_request(req_id: u64) -> Value {
    serde_json::json!({"graph": {"A": ["B"]}, "req_id": req_id})
}

/// Poll until the row for `key` satisfies `done`, since backends write after replying.
pub async fn wait_for_row<F>(store: &CorrelationStore, client_ip: &str, request_id: u64, done: F) -> CorrelationRecord
where
    F: Fn(&CorrelationRecord) -> bool,
{
    for _ in 0..100 {
        if let Some(row) = store.get(client_ip, request_id).unwrap() {
            if done(&row) {
                return row;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("row ({}, {}) never completed", client_ip, request_id);
}
