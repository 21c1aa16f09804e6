//! One request/reply exchange with the relay.

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::client::RequestCounter;
use crate::config::{FramingConfig, RelayConfig};
use crate::protocol::{write_message, ErrorPayload, FrameError, Framer, Graph, GraphReply, GraphRequest, Reply};
use crate::store::{CorrelationRecord, CorrelationStore};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to relay {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply from relay: {0}")]
    Frame(#[from] FrameError),

    #[error("relay returned {}", .0.error)]
    Remote(ErrorPayload),
}

/// A field of the reply that disagrees with what was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ClientIp { expected: String, received: Option<String> },
    ReqId { expected: u64, received: Option<u64> },
    VertexCount { expected: u64, received: u64 },
    BackendName(String),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::ClientIp { expected, received } => {
                write!(f, "client_ip mismatch: sent {}, got {:?}", expected, received)
            }
            Mismatch::ReqId { expected, received } => {
                write!(f, "req_id mismatch: sent {}, got {:?}", expected, received)
            }
            Mismatch::VertexCount { expected, received } => {
                write!(f, "vertex_count mismatch: expected {}, got {}", expected, received)
            }
            Mismatch::BackendName(name) => write!(f, "backend name mismatch: {:?}", name),
        }
    }
}

/// Summary of one completed exchange.
#[derive(Debug, Clone)]
pub struct RoundTrip {
    pub client_ip: String,
    pub req_id: u64,
    pub local_vertex_count: u64,
    pub reply: GraphReply,
    pub mismatches: Vec<Mismatch>,
}

impl RoundTrip {
    pub fn is_correct(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Client for the graph relay.
#[derive(Debug, Clone)]
pub struct GraphClient {
    relay: SocketAddr,
    counter: RequestCounter,
    store: Option<CorrelationStore>,
    expected_backends: BTreeSet<String>,
    framing: FramingConfig,
    timeout: Duration,
}

impl GraphClient {
    pub fn new(relay: SocketAddr, counter: RequestCounter) -> Self {
        let expected_backends = RelayConfig::default()
            .backends
            .into_iter()
            .filter_map(|backend| backend.name)
            .collect();
        Self {
            relay,
            counter,
            store: None,
            expected_backends,
            framing: FramingConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_store(mut self, store: CorrelationStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Logical names a reply may carry.
    pub fn with_expected_backends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_backends = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    /// How long to wait for the relay's reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `graph` through the relay and check the answer.
    pub async fn send(&self, graph: Graph) -> Result<RoundTrip, ClientError> {
        let mut stream = TcpStream::connect(self.relay)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.relay,
                source,
            })?;
        let client_ip = stream.local_addr()?.ip().to_string();
        let req_id = self.counter.load(&client_ip);
        let local_vertex_count = graph.vertex_count();

        write_message(&mut stream, &GraphRequest::new(graph, req_id)).await?;
        if let Err(e) = self.counter.store(&client_ip, req_id + 1) {
            tracing::error!(error = %e, dir = %self.counter.dir().display(), "Failed to persist request counter");
        }
        tracing::debug!(client_ip = %client_ip, req_id, relay = %self.relay, "Request sent");

        self.record(CorrelationRecord::client_sent(&client_ip, req_id, local_vertex_count))
            .await;

        let mut framer = Framer::from_config(&self.framing);
        let reply = match framer.read_message::<Reply, _>(&mut stream, self.timeout).await? {
            Reply::Success(reply) => reply,
            Reply::Failure(payload) => {
                tracing::warn!(req_id, error = %payload.error, detail = ?payload.detail, "Relay reported failure");
                return Err(ClientError::Remote(payload));
            }
        };
        drop(stream);

        let local_vertex_count = local_vertex_count as u64;
        let mismatches = self.check(&client_ip, req_id, local_vertex_count, &reply);
        for mismatch in &mismatches {
            tracing::warn!(req_id, %mismatch, "Reply does not match request");
        }

        self.record(CorrelationRecord::client_received(
            &client_ip,
            req_id,
            reply.req_id,
            &reply.backend,
            reply.vertex_count,
        ))
        .await;

        Ok(RoundTrip {
            client_ip,
            req_id,
            local_vertex_count,
            reply,
            mismatches,
        })
    }

    fn check(&self, client_ip: &str, req_id: u64, local_vertex_count: u64, reply: &GraphReply) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        if reply.client_ip.as_deref() != Some(client_ip) {
            mismatches.push(Mismatch::ClientIp {
                expected: client_ip.to_string(),
                received: reply.client_ip.clone(),
            });
        }
        if reply.req_id != Some(req_id) {
            mismatches.push(Mismatch::ReqId {
                expected: req_id,
                received: reply.req_id,
            });
        }
        if reply.vertex_count != local_vertex_count {
            mismatches.push(Mismatch::VertexCount {
                expected: local_vertex_count,
                received: reply.vertex_count,
            });
        }
        if !self.expected_backends.contains(&reply.backend) {
            mismatches.push(Mismatch::BackendName(reply.backend.clone()));
        }
        mismatches
    }

    async fn record(&self, partial: CorrelationRecord) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.upsert_blocking(partial).await {
            tracing::error!(error = %e, path = %store.path().display(), "Failed to record client half");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GraphClient {
        GraphClient::new("127.0.0.1:5000".parse().unwrap(), RequestCounter::new("/nonexistent"))
    }

    fn reply(backend: &str, vertex_count: u64, client_ip: &str, req_id: u64) -> GraphReply {
        GraphReply {
            backend: backend.to_string(),
            vertex_count,
            client_ip: Some(client_ip.to_string()),
            req_id: Some(req_id),
        }
    }

    #[test]
    fn consistent_reply_has_no_mismatches() {
        assert!(client().check("10.0.0.1", 3, 2, &reply("b2", 2, "10.0.0.1", 3)).is_empty());
    }

    #[test]
    fn reports_every_disagreement() {
        let found = client().check("10.0.0.1", 3, 2, &reply("UNKNOWN", 5, "10.0.0.9", 4));
        assert_eq!(found.len(), 4);
        assert!(found.contains(&Mismatch::BackendName("UNKNOWN".into())));
        assert!(found.contains(&Mismatch::VertexCount {
            expected: 2,
            received: 5
        }));
    }

    #[test]
    fn expected_backends_are_configurable() {
        let client = client().with_expected_backends(["alpha"]);
        assert!(client.check("10.0.0.1", 0, 1, &reply("alpha", 1, "10.0.0.1", 0)).is_empty());
        assert_eq!(client.check("10.0.0.1", 0, 1, &reply("b1", 1, "10.0.0.1", 0)).len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = silent.local_addr().unwrap();
        let client = GraphClient::new(relay, RequestCounter::new(dir.path())).with_timeout(Duration::from_millis(100));

        let err = client.send(Graph::from_edges([("A", "B")])).await.unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::Timeout)), "{:?}", err);
        // The id is spent once the request is out.
        assert_eq!(client.counter.load("127.0.0.1"), 1);
        drop(silent);
    }

    #[tokio::test]
    async fn reply_size_follows_framing() {
        let dir = tempfile::tempdir().unwrap();
        let relay = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = relay.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let (mut socket, _) = relay.accept().await.unwrap();
            let padding = "x".repeat(512);
            let line = format!("{{\"backend\":\"b1\",\"vertex_count\":2,\"pad\":\"{}\"}}\n", padding);
            let _ = socket.write_all(line.as_bytes()).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let framing = FramingConfig {
            max_message_bytes: 128,
            ..FramingConfig::default()
        };
        let client = GraphClient::new(addr, RequestCounter::new(dir.path())).with_framing(framing);
        let err = client.send(Graph::from_edges([("A", "B")])).await.unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::Oversized { .. })), "{:?}", err);
    }

    #[test]
    fn remote_error_message_names_kind() {
        let err = ClientError::Remote(ErrorPayload::invalid_request());
        assert_eq!(err.to_string(), "relay returned invalid_request");
    }
}
