//! Backend worker subsystem.
//!
//! # Data Flow
//! ```text
//! Relay connection
//!     → protocol::Framer (exactly one request)
//!     → vertex count
//!     → reply {backend, vertex_count, client_ip, req_id}, connection closed
//!     → store (backend half of the correlation row)
//! ```
//!
//! # Design Decisions
//! - The reply goes out before the store write; a slow or failing store
//!   never delays the relay
//! - Store failures are logged, never sent to the peer

pub mod server;

pub use server::BackendServer;
