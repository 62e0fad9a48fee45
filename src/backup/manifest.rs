//! Snapshot metadata sidecar
//!
//! Written next to the copied data file as `metadata.json`:
//!
//! ```text
//! {
//!   "backupDate": "2024-03-01T02:00:00.123+00:00",
//!   "databaseSize": 40960,
//!   "version": "1.0.0",
//!   "description": "Automated backup",
//!   "sourceFile": "inventory.db",
//!   "sha256": "9f86d0..."
//! }
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{BackupError, BackupResult};

/// File name of the sidecar inside a snapshot
pub const METADATA_FILE: &str = "metadata.json";

/// Snapshot format version
pub const FORMAT_VERSION: &str = "1.0.0";

/// Snapshot metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub backup_date: DateTime<Utc>,

    /// Size of the copied data file in bytes
    pub database_size: u64,

    pub version: String,

    pub description: String,

    /// File name of the copied data file
    pub source_file: String,

    /// Hex SHA-256 of the copied bytes
    pub sha256: String,
}

impl SnapshotMetadata {
    pub fn new(
        backup_date: DateTime<Utc>,
        database_size: u64,
        description: impl Into<String>,
        source_file: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            backup_date,
            database_size,
            version: FORMAT_VERSION.to_string(),
            description: description.into(),
            source_file: source_file.into(),
            sha256: sha256.into(),
        }
    }

    /// Writes the sidecar with fsync
    pub fn write_to_file(&self, path: &Path) -> BackupResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BackupError::Snapshot(format!("failed to serialize metadata: {}", e)))?;

        let mut file = File::create(path).map_err(|e| BackupError::io_error_at_path(path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| BackupError::io_error_at_path(path, e))?;
        file.sync_all()
            .map_err(|e| BackupError::io_error(format!("fsync {}", path.display()), e))?;

        Ok(())
    }

    pub fn read_from_file(path: &Path) -> BackupResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| BackupError::io_error_at_path(path, e))?;
        serde_json::from_str(&contents)
            .map_err(|e| BackupError::Snapshot(format!("invalid metadata {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SnapshotMetadata {
        SnapshotMetadata::new(Utc::now(), 4096, "Automated backup", "inventory.db", "abc123")
    }

    #[test]
    fn test_version_is_fixed() {
        assert_eq!(sample().version, "1.0.0");
    }

    #[test]
    fn test_json_keys() {
        let json = serde_json::to_value(sample()).unwrap();

        for key in ["backupDate", "databaseSize", "version", "description", "sourceFile", "sha256"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE);
        let metadata = sample();

        metadata.write_to_file(&path).unwrap();

        assert_eq!(SnapshotMetadata::read_from_file(&path).unwrap(), metadata);
    }

    #[test]
    fn test_read_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(METADATA_FILE);
        fs::write(&path, "not valid json").unwrap();

        assert!(SnapshotMetadata::read_from_file(&path).is_err());
    }
}
