//! Optional on-disk copies of converted scans, for debugging uploads.
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::threadfix::ThreadFixScan;

/// Writes `InsightAppSec-ScanID-<id>.json` files into a directory.
#[derive(Debug, Clone)]
pub struct ScanPersister {
    directory: PathBuf,
}

impl ScanPersister {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn file_path(&self, scan_id: &str) -> PathBuf {
        self.directory
            .join(format!("InsightAppSec-ScanID-{scan_id}.json"))
    }

    /// Serialise `scan` to its file, readable by the owner only on unix.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn persist(&self, scan_id: &str, scan: &ThreadFixScan) -> Result<PathBuf> {
        let json = serde_json::to_vec(scan)?;
        fs::create_dir_all(&self.directory)?;
        let path = self.file_path(scan_id);
        write_private(&path, &json)?;
        info!("Persisted scan ID {scan_id} to filesystem: {}", path.display());
        Ok(path)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}
