//! Graph relay library: TCP relay, backend worker and client for
//! graph-processing requests, with a shared correlation log.

// Wire and dispatch
pub mod config;
pub mod load_balancer;
pub mod net;
pub mod protocol;

// Roles
pub mod backend;
pub mod client;
pub mod proxy;

// Audit trail
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use lifecycle::Shutdown;
pub use proxy::RelayServer;
