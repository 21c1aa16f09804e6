//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! TCP byte stream
//!     → framing.rs (accumulate, split one JSON message)
//!     → message.rs (typed request / reply / error payload)
//!
//! Outbound:
//!     message.rs → framing.rs (compact JSON + '\n') → TCP
//! ```
//!
//! # Design Decisions
//! - One JSON object per message, newline terminated on send
//! - Receivers tolerate missing terminators and blank lines
//! - Each hop has its own framer; framers are never shared across connections

pub mod framing;
pub mod message;

pub use framing::{encode_message, write_message, FrameError, Framer, DELIMITER};
pub use message::{ErrorPayload, Graph, GraphReply, GraphRequest, JsonObject, Reply, VertexId};
