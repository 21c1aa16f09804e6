//! File-backed correlation table.
//!
//! # Responsibilities
//! - Serialize every reader and writer, across processes, through `flock`
//! - Merge partial records into one row per key
//! - Rewrite the whole file durably before releasing the lock

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::StoreConfig;
use crate::observability::metrics;
use crate::store::record::{CorrelationRecord, HEADER};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to lock store: {0}")]
    Lock(#[source] std::io::Error),
    #[error("malformed store file: {0}")]
    Csv(#[from] csv::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shared table of correlation records, one row per `(client_ip, request_id)`.
///
/// Cloning is cheap; every clone refers to the same file.
#[derive(Debug, Clone)]
pub struct CorrelationStore {
    path: PathBuf,
}

impl CorrelationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with its header row if it is missing or empty.
    pub fn ensure(&self) -> Result<(), StoreError> {
        let mut locked = LockedFile::acquire(&self.path)?;
        if locked.file.metadata()?.len() == 0 {
            rewrite(&mut locked.file, &[])?;
        }
        Ok(())
    }

    /// Insert or merge one partial record.
    ///
    /// Only non-empty columns of `partial` are written; a row's key never changes.
    pub fn upsert(&self, partial: &CorrelationRecord) -> Result<(), StoreError> {
        let result = self.upsert_locked(partial);
        metrics::record_store_upsert(result.is_ok());
        result
    }

    fn upsert_locked(&self, partial: &CorrelationRecord) -> Result<(), StoreError> {
        let mut locked = LockedFile::acquire(&self.path)?;
        let mut rows = load(&mut locked.file)?;

        match rows.iter_mut().find(|row| row.key() == partial.key()) {
            Some(row) => row.merge(partial),
            None => rows.push(partial.clone()),
        }

        rewrite(&mut locked.file, &rows)?;
        tracing::trace!(
            path = %self.path.display(),
            client_ip = %partial.client_ip,
            request_id = %partial.request_id,
            rows = rows.len(),
            "Correlation record upserted"
        );
        Ok(())
    }

    pub fn record_client_sent(&self, client_ip: &str, request_id: u64, vertex_count: usize) -> Result<(), StoreError> {
        self.upsert(&CorrelationRecord::client_sent(client_ip, request_id, vertex_count))
    }

    pub fn record_backend_half(
        &self,
        client_ip: &str,
        request_id: u64,
        backend_ip: &str,
        vertex_count: usize,
    ) -> Result<(), StoreError> {
        self.upsert(&CorrelationRecord::backend_half(client_ip, request_id, backend_ip, vertex_count))
    }

    pub fn record_client_received(
        &self,
        client_ip: &str,
        request_id: u64,
        received_request_id: Option<u64>,
        backend_name: &str,
        vertex_count: u64,
    ) -> Result<(), StoreError> {
        self.upsert(&CorrelationRecord::client_received(
            client_ip,
            request_id,
            received_request_id,
            backend_name,
            vertex_count,
        ))
    }

    /// Upsert from async code without blocking the runtime.
    pub async fn upsert_blocking(&self, partial: CorrelationRecord) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.upsert(&partial)).await?
    }

    /// Every row currently in the store, in file order.
    pub fn read_all(&self) -> Result<Vec<CorrelationRecord>, StoreError> {
        let mut locked = LockedFile::acquire(&self.path)?;
        load(&mut locked.file)
    }

    /// The row for one key, if any writer has created it.
    pub fn get(&self, client_ip: &str, request_id: u64) -> Result<Option<CorrelationRecord>, StoreError> {
        let request_id = request_id.to_string();
        Ok(self
            .read_all()?
            .into_iter()
            .find(|row| row.key() == (client_ip, request_id.as_str())))
    }
}

/// An open store file holding the exclusive lock until dropped.
struct LockedFile {
    file: File,
}

impl LockedFile {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file).map_err(StoreError::Lock)?;
        Ok(Self { file })
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release store lock");
        }
    }
}

fn load(file: &mut File) -> Result<Vec<CorrelationRecord>, StoreError> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(&mut *file);

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = CorrelationRecord::from_cells(result?.iter());
        if i == 0 && row.is_header() {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn rewrite(file: &mut File, rows: &[CorrelationRecord]) -> Result<(), StoreError> {
    file.seek(SeekFrom::Start(0))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut *file);
        writer.write_record(HEADER)?;
        for row in rows {
            writer.write_record(row.cells())?;
        }
        writer.flush()?;
    }
    let end = file.stream_position()?;
    file.set_len(end)?;
    file.sync_all()?;
    Ok(())
}
