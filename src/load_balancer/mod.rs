//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request framed
//!     → round_robin.rs (rotate through the fixed backend list)
//!     → backend.rs (endpoint address + logical name)
//!     → Proxy opens its own connection to the endpoint
//!
//! Response framed
//!     → backend.rs (directory maps reported address → logical name)
//! ```
//!
//! # Design Decisions
//! - Backend list is fixed at startup; no health-based exclusion
//! - Selection state lives only inside the dispatcher
//! - Connections are not pooled; the dispatcher hands out addresses only

pub mod backend;
pub mod round_robin;

pub use backend::{BackendDirectory, Endpoint, ReportedAddr, UNKNOWN_BACKEND};
pub use round_robin::{DispatchError, RoundRobin};
