//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! Client connection (one task each)
//!     → protocol::Framer (one request at a time, idle timeout)
//!     → client_ip overwritten with the observed peer address
//!     → load_balancer::RoundRobin (pick next endpoint)
//!     → forward.rs (fresh backend connection, bounded by backend timeout)
//!     → normalize.rs (logical backend name, correlation key)
//!     → reply written back, newline terminated
//! ```
//!
//! # Design Decisions
//! - A failed backend leg is answered with an error payload; the client
//!   connection stays open for the next request
//! - Malformed client input is answered once, then the connection closes
//! - Backend error payloads are relayed unchanged

pub mod forward;
pub mod normalize;
pub mod server;

use std::net::SocketAddr;

pub use forward::{exchange, BackendLegError};
pub use normalize::{normalize_reply, Identity, IDENTITY_FIELDS};
pub use server::{Outcome, RelayServer, RelayState};

/// Failures on the relay's backend side.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("backend {addr} unreachable: {source}")]
    BackendUnreachable {
        addr: SocketAddr,
        #[source]
        source: BackendLegError,
    },

    #[error("backend reported unrecognized identity {reported:?}")]
    UnknownBackendIdentity { reported: String },
}

/// Errors building a relay from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid backend address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error(transparent)]
    Dispatch(#[from] crate::load_balancer::DispatchError),
}
