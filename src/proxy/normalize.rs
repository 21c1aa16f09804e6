//! Backend reply normalization.
//!
//! Backends describe themselves inconsistently: the address may sit under any
//! of several field names, or be missing entirely. Before a reply reaches the
//! client its `backend` field is replaced with a logical name:
//!
//! 1. the first candidate field holding a recognized backend address,
//! 2. else the endpoint the relay actually contacted,
//! 3. else `"UNKNOWN"`.

use serde_json::Value;

use crate::load_balancer::{BackendDirectory, Endpoint, ReportedAddr, UNKNOWN_BACKEND};
use crate::protocol::{GraphRequest, JsonObject};
use crate::proxy::ProxyError;

/// Fields a backend may use for its own address, in priority order.
pub const IDENTITY_FIELDS: [&str; 4] = ["backend_ip", "backend", "backend_addr", "backend_address"];

/// How the logical name of a reply was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The backend's self-reported address is known.
    Reported(String),
    /// Fell back to the endpoint that was dialed.
    Contacted(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> &str {
        match self {
            Identity::Reported(name) | Identity::Contacted(name) => name,
            Identity::Unknown => UNKNOWN_BACKEND,
        }
    }
}

/// True if the object is an `{"error": ...}` payload rather than a result.
pub fn is_error_payload(reply: &JsonObject) -> bool {
    reply.contains_key("error")
}

/// First candidate field whose value parses as an address, with its raw text.
pub fn reported_address(reply: &JsonObject) -> Option<(&str, ReportedAddr)> {
    IDENTITY_FIELDS
        .iter()
        .filter_map(|field| reply.get(*field).and_then(Value::as_str))
        .find_map(|raw| ReportedAddr::parse(raw).map(|addr| (raw, addr)))
}

/// Decide the logical name for a reply from `contacted`.
pub fn resolve_identity(reply: &JsonObject, directory: &BackendDirectory, contacted: &Endpoint) -> Identity {
    if let Some((raw, reported)) = reported_address(reply) {
        if let Some(name) = directory.lookup(reported, contacted) {
            return Identity::Reported(name.to_string());
        }
        let err = ProxyError::UnknownBackendIdentity {
            reported: raw.to_string(),
        };
        tracing::warn!(error = %err, contacted = %contacted.addr, "Falling back to contacted backend");
    }

    match &contacted.name {
        Some(name) => Identity::Contacted(name.clone()),
        None => {
            tracing::warn!(contacted = %contacted.addr, "Contacted backend has no logical name");
            Identity::Unknown
        }
    }
}

/// Rewrite `backend` to a logical name and make sure the correlation key survives.
pub fn normalize_reply(
    reply: &mut JsonObject,
    request: &GraphRequest,
    directory: &BackendDirectory,
    contacted: &Endpoint,
) -> Identity {
    let identity = resolve_identity(reply, directory, contacted);
    reply.insert("backend".to_string(), Value::from(identity.name()));

    if !reply.contains_key("client_ip") {
        if let Some(client_ip) = &request.client_ip {
            reply.insert("client_ip".to_string(), Value::from(client_ip.as_str()));
        }
    }
    if !reply.contains_key("req_id") {
        reply.insert("req_id".to_string(), Value::from(request.req_id));
    }
    identity
}
