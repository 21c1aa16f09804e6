//! Per-client request id persistence.
//!
//! Each client address owns a `<ip>.counter` file holding the next id to use,
//! so ids keep increasing across client process restarts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RequestCounter {
    dir: PathBuf,
}

impl RequestCounter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, client_ip: &str) -> PathBuf {
        self.dir.join(format!("{}.counter", client_ip))
    }

    /// Next id for `client_ip`; a missing or unreadable counter starts at 0.
    pub fn load(&self, client_ip: &str) -> u64 {
        fs::read_to_string(self.path_for(client_ip))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Replace the counter atomically.
    pub fn store(&self, client_ip: &str, next: u64) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(client_ip);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, next.to_string())?;
        fs::rename(&tmp, &path)
    }
}
