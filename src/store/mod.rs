//! Correlation log store subsystem.
//!
//! # Data Flow
//! ```text
//! client (send leg)    ─┐
//! backend (result)     ─┼→ partial CorrelationRecord
//! client (receive leg) ─┘      → table.rs: lock → load → merge → rewrite → unlock
//!                                  → one row per (client_ip, request_id)
//! ```
//!
//! # Design Decisions
//! - Flat CSV file with a fixed eight-column header
//! - Exclusive advisory lock for every access, reads included
//! - Whole-file rewrite per update; record counts are bounded by lab traffic
//! - Writers never wait for each other; a row fills in as halves arrive

pub mod record;
pub mod table;

pub use record::{CorrelationRecord, HEADER};
pub use table::{CorrelationStore, StoreError};
