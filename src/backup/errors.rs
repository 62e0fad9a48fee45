//! # Backup Errors
//!
//! Stage failures are split by severity: `Snapshot` and `Compression` abort a
//! run, everything raised by the cloud leg or by retention is recorded and
//! the run continues.

use std::path::Path;

use thiserror::Error;

use crate::cloud::CloudError;
use crate::policy::ConfigError;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Backup errors
#[derive(Debug, Clone, Error)]
pub enum BackupError {
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Retention failed: {0}")]
    Retention(String),

    #[error("A backup is already running")]
    AlreadyRunning,

    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Invalid backup name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl BackupError {
    /// I/O failure with context
    pub fn io_error(context: impl AsRef<str>, err: std::io::Error) -> Self {
        BackupError::Io(format!("{}: {}", context.as_ref(), err))
    }

    /// I/O failure at a specific path
    pub fn io_error_at_path(path: &Path, err: std::io::Error) -> Self {
        Self::io_error(path.display().to_string(), err)
    }

    /// Whether this error aborts the run it occurred in
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackupError::Snapshot(_) | BackupError::Compression(_))
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            BackupError::Snapshot(_) => 500,
            BackupError::Compression(_) => 500,
            BackupError::Retention(_) => 500,
            BackupError::AlreadyRunning => 409,
            BackupError::NotFound(_) => 404,
            BackupError::InvalidName(_) => 400,
            BackupError::Io(_) => 500,
            BackupError::Config(e) => e.status_code(),
            BackupError::Cloud(e) => e.status_code(),
        }
    }
}
