//! Backend leg of one exchange.
//!
//! # Responsibilities
//! - Open a fresh connection to the selected endpoint
//! - Send the request and read exactly one reply
//! - Bound the whole leg by the backend timeout
//!
//! The backend connection never outlives the exchange; it is dropped (and
//! closed) on every return path.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::FramingConfig;
use crate::load_balancer::Endpoint;
use crate::protocol::{write_message, FrameError, Framer, GraphRequest, JsonObject};
use crate::proxy::ProxyError;

/// What went wrong talking to a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendLegError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("no reply: {0}")]
    Receive(#[source] FrameError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Send `request` to `endpoint` and return its raw reply object.
pub async fn exchange(
    endpoint: &Endpoint,
    request: &GraphRequest,
    framing: &FramingConfig,
    limit: Duration,
) -> Result<JsonObject, ProxyError> {
    let leg = async {
        let mut stream = TcpStream::connect(endpoint.addr)
            .await
            .map_err(BackendLegError::Connect)?;
        write_message(&mut stream, request)
            .await
            .map_err(BackendLegError::Send)?;

        let mut framer = Framer::from_config(framing);
        framer
            .read_message::<JsonObject, _>(&mut stream, limit)
            .await
            .map_err(BackendLegError::Receive)
    };

    let outcome = match tokio::time::timeout(limit, leg).await {
        Ok(result) => result,
        Err(_) => Err(BackendLegError::Timeout(limit)),
    };

    outcome.map_err(|source| ProxyError::BackendUnreachable {
        addr: endpoint.addr,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Graph;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> GraphRequest {
        GraphRequest::new(Graph::from_edges([("A", "B")]), 1)
    }

    #[tokio::test]
    async fn returns_backend_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"{\"backend\":\"127.0.0.1\",\"vertex_count\":2}\n")
                .await
                .unwrap();
        });

        let endpoint = Endpoint::named(addr, "b1");
        let reply = exchange(&endpoint, &request(), &FramingConfig::default(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reply["vertex_count"], 2);
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let endpoint = Endpoint::named(addr, "b1");

        let err = exchange(&endpoint, &request(), &FramingConfig::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::BackendUnreachable {
                source: BackendLegError::Connect(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn silent_backend_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let endpoint = Endpoint::named(addr, "b1");
        let err = exchange(&endpoint, &request(), &FramingConfig::default(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn closing_without_reply_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let endpoint = Endpoint::named(addr, "b1");
        let err = exchange(&endpoint, &request(), &FramingConfig::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::BackendUnreachable { .. }));
    }
}
