//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → In-flight connections finish → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Accept loops subscribe to one broadcast channel
//! - Connection tasks are not cancelled; their own timeouts bound them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
