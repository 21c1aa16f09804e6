//! Wire message types.
//!
//! Every message is a single JSON object. Requests and replies that the relay
//! only inspects are kept as raw [`JsonObject`]s so fields it does not know
//! about survive the round trip untouched.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

/// A raw JSON object as it appeared on the wire.
pub type JsonObject = serde_json::Map<String, Value>;

/// A neighbor id as written by the client.
///
/// Object keys are always strings on the wire, but neighbor lists may name
/// vertices by number. The original form is kept so backends see exactly what
/// the client sent; `1` and `"1"` name the same vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VertexId {
    Name(String),
    Number(Number),
}

impl VertexId {
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            VertexId::Name(name) => Cow::Borrowed(name),
            VertexId::Number(number) => Cow::Owned(number.to_string()),
        }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<String> for VertexId {
    fn from(name: String) -> Self {
        VertexId::Name(name)
    }
}

impl PartialEq<str> for VertexId {
    fn eq(&self, other: &str) -> bool {
        self.as_key() == other
    }
}

impl PartialEq<&str> for VertexId {
    fn eq(&self, other: &&str) -> bool {
        self.as_key() == *other
    }
}

/// Adjacency mapping from vertex id to its ordered neighbor ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graph(BTreeMap<String, Vec<VertexId>>);

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from directed edges. Both endpoints of every edge become keys.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for (from, to) in edges {
            graph.add_edge(from.into(), to.into());
        }
        graph
    }

    pub fn add_edge(&mut self, from: String, to: String) {
        self.0.entry(to.clone()).or_default();
        self.0.entry(from).or_default().push(VertexId::Name(to));
    }

    /// Number of distinct vertices named as a key or as a neighbor.
    pub fn vertex_count(&self) -> usize {
        let mut vertices: BTreeSet<Cow<'_, str>> = self.0.keys().map(|key| Cow::Borrowed(key.as_str())).collect();
        for neighbors in self.0.values() {
            vertices.extend(neighbors.iter().map(VertexId::as_key));
        }
        vertices.len()
    }

    pub fn neighbors(&self, vertex: &str) -> Option<&[VertexId]> {
        self.0.get(vertex).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Vec<VertexId>)> for Graph {
    fn from_iter<T: IntoIterator<Item = (String, Vec<VertexId>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A graph-processing request.
///
/// `client_ip` is owned by the relay: whatever the client sends is replaced
/// with the observed peer address before the request reaches a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub graph: Graph,
    pub req_id: u64,
    #[serde(default, deserialize_with = "claimed_address", skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Fields the relay does not interpret, forwarded as-is.
    #[serde(flatten)]
    pub extra: JsonObject,
}

impl GraphRequest {
    pub fn new(graph: Graph, req_id: u64) -> Self {
        Self {
            graph,
            req_id,
            client_ip: None,
            extra: JsonObject::new(),
        }
    }
}

/// Any value is accepted for a claimed address; only a string is kept.
fn claimed_address<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(address) => Some(address),
        _ => None,
    })
}

/// A successful processing result.
///
/// Backends put their own address in `backend`; by the time a client sees
/// this message the relay has replaced it with a logical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphReply {
    pub backend: String,
    pub vertex_count: u64,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub req_id: Option<u64>,
}

/// Error payload sent on either hop: `{"error": kind, "detail"?: text}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorPayload {
    pub const INVALID_REQUEST: &'static str = "invalid_request";
    pub const BACKEND_COMM_FAILURE: &'static str = "backend_comm_failure";
    pub const BACKEND_FAILED: &'static str = "backend_failed";

    pub fn invalid_request() -> Self {
        Self {
            error: Self::INVALID_REQUEST.to_string(),
            detail: None,
        }
    }

    pub fn backend_comm_failure(detail: impl Into<String>) -> Self {
        Self {
            error: Self::BACKEND_COMM_FAILURE.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn backend_failed() -> Self {
        Self {
            error: Self::BACKEND_FAILED.to_string(),
            detail: None,
        }
    }
}

/// Anything a client can receive from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Failure(ErrorPayload),
    Success(GraphReply),
}
