//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.
//! Defaults describe the three-backend lab deployment, so a relay started
//! without a config file behaves exactly like the fixed topology.

use serde::{Deserialize, Serialize};

/// Root configuration for the graph relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Client-facing listener configuration.
    pub listener: ListenerConfig,

    /// Backend endpoints in dispatch order.
    pub backends: Vec<BackendConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Stream framing limits.
    pub framing: FramingConfig,

    /// Correlation log store location.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            backends: default_backends(),
            timeouts: TimeoutConfig::default(),
            framing: FramingConfig::default(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    [("b1", "20.0.0.3:6000"), ("b2", "20.0.0.4:6000"), ("b3", "20.0.0.5:6000")]
        .into_iter()
        .map(|(name, address)| BackendConfig {
            name: Some(name.to_string()),
            address: address.to_string(),
        })
        .collect()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_connections: 1024,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Logical name reported to clients (e.g. "b1").
    /// A backend without a name is dispatched to but reported as "UNKNOWN".
    #[serde(default)]
    pub name: Option<String>,

    /// Backend address (e.g., "20.0.0.3:6000").
    pub address: String,
}

/// Timeout configuration for both legs of an exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Idle deadline for a client to deliver one complete request, in milliseconds.
    pub client_idle_ms: u64,

    /// Deadline for the whole backend leg (connect, send, receive), in milliseconds.
    pub backend_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_idle_ms: 10_000,
            backend_ms: 10_000,
        }
    }
}

/// Stream framing limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FramingConfig {
    /// Largest number of buffered bytes while waiting for one message.
    pub max_message_bytes: usize,

    /// Capacity reserved for each socket read.
    pub read_chunk_bytes: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 2_000_000,
            read_chunk_bytes: 8192,
        }
    }
}

/// Correlation log store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the shared record file.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/tmp/student_id.csv".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
