//! Graph client subsystem.
//!
//! # Data Flow
//! ```text
//! sample_input_N.txt
//!     → inputs.rs (edge list → Graph)
//!     → session.rs (connect, counter id, send, frame one reply, check)
//!     → store (client-sent and client-received halves)
//! ```
//!
//! # Design Decisions
//! - One connection per request
//! - Request ids come from a per-address counter file and survive restarts
//! - The client's address is whatever the local socket reports

pub mod counter;
pub mod inputs;
pub mod session;

pub use counter::RequestCounter;
pub use inputs::{parse_edge_list, read_edge_list, sample_input_path};
pub use session::{ClientError, GraphClient, Mismatch, RoundTrip};
