//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::io;

use thiserror::Error;

use crate::backup::BackupError;
use crate::policy::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Service(#[from] BackupError),

    #[error("startup failed: {0}")]
    Boot(String),

    #[error("backup failed: {0}")]
    RunFailed(String),
}

impl CliError {
    /// Stable code string for scripted callers
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "DBVAULT_CLI_CONFIG_ERROR",
            CliError::Io(_) => "DBVAULT_CLI_IO_ERROR",
            CliError::Service(_) => "DBVAULT_CLI_SERVICE_ERROR",
            CliError::Boot(_) => "DBVAULT_CLI_BOOT_FAILED",
            CliError::RunFailed(_) => "DBVAULT_CLI_BACKUP_FAILED",
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
