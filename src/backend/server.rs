//! Graph worker: counts vertices for one request per connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::FramingConfig;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::protocol::{write_message, ErrorPayload, FrameError, Framer, GraphReply, GraphRequest};
use crate::store::{CorrelationRecord, CorrelationStore};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct WorkerState {
    advertise: String,
    store: Option<CorrelationStore>,
    framing: FramingConfig,
    request_timeout: Duration,
}

/// A backend that answers graph requests with their vertex count.
///
/// `advertise` is the address the worker reports about itself in every reply.
#[derive(Debug)]
pub struct BackendServer {
    state: WorkerState,
    tracker: ConnectionTracker,
}

impl BackendServer {
    pub fn new(advertise: impl Into<String>) -> Self {
        Self {
            state: WorkerState {
                advertise: advertise.into(),
                store: None,
                framing: FramingConfig::default(),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            tracker: ConnectionTracker::new(),
        }
    }

    /// Record the backend half of every processed request.
    pub fn with_store(mut self, store: CorrelationStore) -> Self {
        self.state.store = Some(store);
        self
    }

    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.state.framing = framing;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.state.request_timeout = timeout;
        self
    }

    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let state = Arc::new(self.state);
        tracing::info!(
            address = ?listener.local_addr().ok(),
            advertise = %state.advertise,
            "Backend worker ready"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let state = Arc::clone(&state);
                        let guard = self.tracker.track();
                        let span = tracing::info_span!("request", connection_id = %guard.id(), peer = %peer);
                        tokio::spawn(
                            async move {
                                serve_one(state, stream, peer).await;
                                drop(guard);
                                drop(permit);
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Backend worker stopping");
                    break;
                }
            }
        }

        if !self.tracker.wait_for_idle(state.request_timeout).await {
            tracing::warn!(active = self.tracker.active_count(), "Requests still in flight at shutdown");
        }
        Ok(())
    }
}

async fn serve_one(state: Arc<WorkerState>, mut stream: TcpStream, peer: SocketAddr) {
    let mut framer = Framer::from_config(&state.framing);
    let request: GraphRequest = match framer.read_message(&mut stream, state.request_timeout).await {
        Ok(request) => request,
        Err(FrameError::ConnectionClosed | FrameError::Timeout) => {
            tracing::debug!("No request received");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unprocessable request");
            if let Err(e) = write_message(&mut stream, &ErrorPayload::backend_failed()).await {
                tracing::debug!(error = %e, "Could not deliver error");
            }
            return;
        }
    };

    let vertex_count = request.graph.vertex_count();
    let client_ip = request
        .client_ip
        .clone()
        .unwrap_or_else(|| peer.ip().to_string());
    let reply = GraphReply {
        backend: state.advertise.clone(),
        vertex_count: vertex_count as u64,
        client_ip: Some(client_ip.clone()),
        req_id: Some(request.req_id),
    };

    if let Err(e) = write_message(&mut stream, &reply).await {
        tracing::warn!(error = %e, req_id = request.req_id, "Failed to send reply");
    }
    drop(stream);

    tracing::info!(client_ip = %client_ip, req_id = request.req_id, vertex_count, "Processed request");

    if let Some(store) = &state.store {
        let record = CorrelationRecord::backend_half(&client_ip, request.req_id, &state.advertise, vertex_count);
        if let Err(e) = store.upsert_blocking(record).await {
            tracing::error!(error = %e, path = %store.path().display(), "Failed to record backend result");
        }
    }
}
