//! # Cloud Errors

use thiserror::Error;

/// Result type for cloud operations
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors raised by the authenticator and the remote store.
///
/// None of these are fatal to a backup run: the pipeline downgrades the run
/// to a partial failure and keeps the local artifact.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    /// Missing session, rejected credentials, failed consent exchange
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Operation does not apply to the active strategy
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Credential file missing or malformed
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Upload rejected or interrupted
    #[error("Upload error: {0}")]
    Upload(String),

    /// Any other provider or transport failure
    #[error("Remote request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CloudError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            CloudError::Auth(_) => 401,
            CloudError::InvalidOperation(_) => 400,
            CloudError::Credentials(_) => 412,
            CloudError::Upload(_) => 502,
            CloudError::Http(_) => 502,
            CloudError::Io(_) => 500,
        }
    }
}

impl From<reqwest::Error> for CloudError {
    fn from(err: reqwest::Error) -> Self {
        CloudError::Http(err.to_string())
    }
}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        CloudError::Io(err.to_string())
    }
}
