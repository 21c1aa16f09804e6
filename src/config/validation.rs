//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate backend addresses and name uniqueness
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one backend must be configured")]
    NoBackends,
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: String, value: String },
    #[error("duplicate backend address: {0}")]
    DuplicateAddress(String),
    #[error("duplicate backend name: {0}")]
    DuplicateName(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address".to_string(),
            value: config.listener.bind_address.clone(),
        });
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut addresses = HashSet::new();
    let mut names = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        match backend.address.parse::<SocketAddr>() {
            Ok(addr) => {
                if !addresses.insert(addr) {
                    errors.push(ValidationError::DuplicateAddress(backend.address.clone()));
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                field: format!("backends[{}].address", i),
                value: backend.address.clone(),
            }),
        }
        if let Some(name) = &backend.name {
            if !names.insert(name.as_str()) {
                errors.push(ValidationError::DuplicateName(name.clone()));
            }
        }
    }

    let ranges = [
        ("listener.max_connections", config.listener.max_connections as u64),
        ("timeouts.client_idle_ms", config.timeouts.client_idle_ms),
        ("timeouts.backend_ms", config.timeouts.backend_ms),
        ("framing.max_message_bytes", config.framing.max_message_bytes as u64),
        ("framing.read_chunk_bytes", config.framing.read_chunk_bytes as u64),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address".to_string(),
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
