//! Correlation record layout and merge rules.

/// Column names, in file order.
pub const HEADER: [&str; 8] = [
    "CLIENT_IP",
    "REQUEST_ID",
    "CLIENT_VERTEX_COUNT",
    "BACKEND_IP",
    "BACKEND_VERTEX_COUNT",
    "RECEIVED_REQUEST_ID",
    "BACKEND_NAME",
    "RECEIVED_VERTEX_COUNT",
];

/// Number of leading key columns.
const KEY_COLUMNS: usize = 2;

/// One row of the correlation log, keyed by `(client_ip, request_id)`.
///
/// Every column is kept as text; an empty string means "not recorded". A
/// partial write is just a record with only some columns filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationRecord {
    pub client_ip: String,
    pub request_id: String,
    pub client_vertex_count: String,
    pub backend_ip: String,
    pub backend_vertex_count: String,
    pub received_request_id: String,
    pub backend_name: String,
    pub received_vertex_count: String,
}

impl CorrelationRecord {
    /// An otherwise empty record for the given key.
    pub fn keyed(client_ip: &str, request_id: u64) -> Self {
        Self {
            client_ip: client_ip.trim().to_string(),
            request_id: request_id.to_string(),
            ..Self::default()
        }
    }

    /// What the client knew when it sent the request.
    pub fn client_sent(client_ip: &str, request_id: u64, client_vertex_count: usize) -> Self {
        Self {
            client_vertex_count: client_vertex_count.to_string(),
            ..Self::keyed(client_ip, request_id)
        }
    }

    /// What the backend computed.
    pub fn backend_half(client_ip: &str, request_id: u64, backend_ip: &str, backend_vertex_count: usize) -> Self {
        Self {
            backend_ip: backend_ip.trim().to_string(),
            backend_vertex_count: backend_vertex_count.to_string(),
            ..Self::keyed(client_ip, request_id)
        }
    }

    /// What the client saw come back.
    pub fn client_received(
        client_ip: &str,
        request_id: u64,
        received_request_id: Option<u64>,
        backend_name: &str,
        received_vertex_count: u64,
    ) -> Self {
        Self {
            received_request_id: received_request_id.map(|id| id.to_string()).unwrap_or_default(),
            backend_name: backend_name.trim().to_string(),
            received_vertex_count: received_vertex_count.to_string(),
            ..Self::keyed(client_ip, request_id)
        }
    }

    /// Build a record from file cells; missing trailing cells are empty.
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = Self::default();
        for (slot, cell) in record.cells_mut().into_iter().zip(cells) {
            *slot = cell.trim().to_string();
        }
        record
    }

    pub fn cells(&self) -> [&str; 8] {
        [
            self.client_ip.as_str(),
            self.request_id.as_str(),
            self.client_vertex_count.as_str(),
            self.backend_ip.as_str(),
            self.backend_vertex_count.as_str(),
            self.received_request_id.as_str(),
            self.backend_name.as_str(),
            self.received_vertex_count.as_str(),
        ]
    }

    fn cells_mut(&mut self) -> [&mut String; 8] {
        [
            &mut self.client_ip,
            &mut self.request_id,
            &mut self.client_vertex_count,
            &mut self.backend_ip,
            &mut self.backend_vertex_count,
            &mut self.received_request_id,
            &mut self.backend_name,
            &mut self.received_vertex_count,
        ]
    }

    pub fn key(&self) -> (&str, &str) {
        (self.client_ip.as_str(), self.request_id.as_str())
    }

    /// True for the literal header line.
    pub fn is_header(&self) -> bool {
        self.cells() == HEADER
    }

    /// True once every writer has contributed.
    pub fn is_complete(&self) -> bool {
        self.cells().iter().all(|c| !c.is_empty())
    }

    /// Copy every non-empty non-key column of `incoming` over this row.
    pub fn merge(&mut self, incoming: &CorrelationRecord) {
        let updates = incoming.cells();
        for (slot, value) in self.cells_mut().into_iter().zip(updates).skip(KEY_COLUMNS) {
            if !value.is_empty() {
                *slot = value.to_string();
            }
        }
    }
}
