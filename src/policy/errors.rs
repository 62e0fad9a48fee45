//! # Policy Errors

use thiserror::Error;

/// Result type for policy operations
pub type PolicyResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, saving, or validating a backup policy.
///
/// Load and save failures are recoverable: the caller keeps operating on
/// the in-memory policy.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Policy I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Policy file is not valid JSON: {0}")]
    Parse(String),

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigError::Io { .. } => 500,
            ConfigError::Parse(_) => 500,
            ConfigError::Invalid(_) => 400,
        }
    }
}
