//! Relay accept loop and per-connection handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{FramingConfig, RelayConfig, TimeoutConfig};
use crate::load_balancer::{BackendDirectory, Endpoint, RoundRobin};
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::protocol::{write_message, ErrorPayload, FrameError, Framer, GraphRequest, JsonObject};
use crate::proxy::normalize::{is_error_payload, normalize_reply};
use crate::proxy::{forward, SetupError};

/// What the relay writes back for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Reply(JsonObject),
    Failure(ErrorPayload),
}

/// Shared, read-only state for every connection task.
#[derive(Debug)]
pub struct RelayState {
    pub dispatcher: RoundRobin,
    pub directory: BackendDirectory,
    pub timeouts: TimeoutConfig,
    pub framing: FramingConfig,
}

impl RelayState {
    pub fn from_config(config: &RelayConfig) -> Result<Self, SetupError> {
        let directory = BackendDirectory::from_config(&config.backends)?;
        let dispatcher = RoundRobin::new(directory.endpoints().to_vec())?;
        Ok(Self {
            dispatcher,
            directory,
            timeouts: config.timeouts.clone(),
            framing: config.framing.clone(),
        })
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.client_idle_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.backend_ms)
    }

    /// Run one request through the next backend and build the client's answer.
    pub async fn forward(&self, request: &GraphRequest) -> Outcome {
        let exchange_id = Uuid::new_v4();
        let endpoint = self.dispatcher.next();
        let start = Instant::now();

        tracing::debug!(
            exchange_id = %exchange_id,
            req_id = request.req_id,
            backend = %endpoint.addr,
            "Forwarding request"
        );

        let mut reply = match forward::exchange(endpoint, request, &self.framing, self.backend_timeout()).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(exchange_id = %exchange_id, req_id = request.req_id, error = %e, "Backend leg failed");
                metrics::record_request("backend_failure");
                return Outcome::Failure(ErrorPayload::backend_comm_failure(e.to_string()));
            }
        };
        metrics::record_dispatch(endpoint.logical_name(), start);

        if is_error_payload(&reply) {
            tracing::warn!(
                exchange_id = %exchange_id,
                req_id = request.req_id,
                backend = endpoint.logical_name(),
                error = ?reply.get("error"),
                "Backend returned an error"
            );
            metrics::record_request("backend_error");
            return Outcome::Reply(reply);
        }

        let identity = normalize_reply(&mut reply, request, &self.directory, endpoint);
        tracing::info!(
            exchange_id = %exchange_id,
            req_id = request.req_id,
            backend = identity.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Exchange complete"
        );
        metrics::record_request("ok");
        Outcome::Reply(reply)
    }

    fn endpoints(&self) -> &[Endpoint] {
        self.dispatcher.endpoints()
    }
}

/// TCP relay between graph clients and backends.
pub struct RelayServer {
    state: Arc<RelayState>,
    tracker: ConnectionTracker,
}

impl RelayServer {
    pub fn new(config: &RelayConfig) -> Result<Self, SetupError> {
        Ok(Self::from_state(RelayState::from_config(config)?))
    }

    pub fn from_state(state: RelayState) -> Self {
        Self {
            state: Arc::new(state),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept clients until `shutdown` fires, then wait for open connections.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let backends: Vec<String> = self.state.endpoints().iter().map(|e| e.addr.to_string()).collect();
        tracing::info!(
            address = ?listener.local_addr().ok(),
            backends = ?backends,
            "Relay accepting connections"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let state = Arc::clone(&self.state);
                        let guard = self.tracker.track();
                        let span = tracing::info_span!("connection", connection_id = %guard.id(), peer = %peer);
                        tokio::spawn(
                            async move {
                                handle_connection(state, stream, peer).await;
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
                    tracing::info!("Relay stopped accepting connections");
                    break;
                }
            }
        }

        let grace = self.state.client_idle_timeout() + self.state.backend_timeout();
        if !self.tracker.wait_for_idle(grace).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Connections still open after shutdown grace period"
            );
        }
        Ok(())
    }
}

/// Serve requests on one client connection until it closes or idles out.
pub async fn handle_connection(state: Arc<RelayState>, mut stream: TcpStream, peer: SocketAddr) {
    let mut framer = Framer::from_config(&state.framing);
    let client_ip = peer.ip().to_string();
    tracing::debug!("Client connected");

    loop {
        let mut request: GraphRequest = match framer.read_message(&mut stream, state.client_idle_timeout()).await {
            Ok(request) => request,
            Err(FrameError::Timeout) => {
                tracing::debug!("Client idle, closing");
                break;
            }
            Err(FrameError::ConnectionClosed) => {
                tracing::debug!("Client closed connection");
                break;
            }
            Err(FrameError::Io(e)) => {
                tracing::debug!(error = %e, "Client read failed");
                break;
            }
            Err(e) => {
                metrics::record_frame_error(e.kind());
                metrics::record_request("invalid_request");
                tracing::warn!(error = %e, "Rejecting client input");
                if let Err(e) = write_message(&mut stream, &ErrorPayload::invalid_request()).await {
                    tracing::debug!(error = %e, "Could not deliver error to client");
                }
                break;
            }
        };

        if let Some(claimed) = request.client_ip.as_deref() {
            if claimed != client_ip {
                tracing::debug!(claimed, observed = %client_ip, "Replacing client-supplied address");
            }
        }
        request.client_ip = Some(client_ip.clone());

        let outcome = state.forward(&request).await;
        if let Err(e) = write_message(&mut stream, &outcome).await {
            tracing::debug!(error = %e, "Client went away before reply");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use serde_json::json;

    fn config_with(addresses: &[&str]) -> RelayConfig {
        let mut config = RelayConfig::default();
        config.backends = addresses
            .iter()
            .enumerate()
            .map(|(i, address)| BackendConfig {
                name: Some(format!("b{}", i + 1)),
                address: address.to_string(),
            })
            .collect();
        config
    }

    #[test]
    fn builds_state_from_config() {
        let state = RelayState::from_config(&RelayConfig::default()).unwrap();
        assert_eq!(state.dispatcher.len(), 3);
        assert_eq!(state.directory.endpoints()[1].logical_name(), "b2");
        assert_eq!(state.backend_timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn rejects_bad_backend_address() {
        let err = RelayState::from_config(&config_with(&["not-an-address"])).unwrap_err();
        assert!(matches!(err, SetupError::Address(_)));
    }

    #[test]
    fn rejects_empty_backend_list() {
        let err = RelayState::from_config(&config_with(&[])).unwrap_err();
        assert!(matches!(err, SetupError::Dispatch(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_becomes_error_payload() {
        let port = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let address = format!("127.0.0.1:{}", port);
        let mut config = config_with(&[address.as_str()]);
        config.timeouts.backend_ms = 500;
        let state = RelayState::from_config(&config).unwrap();

        let request = GraphRequest::new(crate::protocol::Graph::from_edges([("A", "B")]), 0);
        let outcome = state.forward(&request).await;

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["error"], json!("backend_comm_failure"));
        assert!(value["detail"].as_str().unwrap().contains("unreachable"));
    }
}
