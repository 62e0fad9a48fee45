//! Service configuration
//!
//! ```text
//! {
//!   "data_file": "./inventory.db",
//!   "backup_dir": "./backups",
//!   "policy_file": "./backupConfig.json",
//!   "credentials_file": "./credentials.json",
//!   "token_file": "./token.json",
//!   "artifact_prefix": "inventory_backup",
//!   "description": "Automated backup",
//!   "http": { "host": "0.0.0.0", "port": 3001, "cors_origins": [...] }
//! }
//! ```
//!
//! Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backup::PipelineConfig;
use crate::http_server::HttpServerConfig;
use crate::policy::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Primary data store file
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Local artifact directory
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Persisted backup policy
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,

    /// Cloud credential file (service account key or OAuth client)
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,

    /// OAuth token cache
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    /// Label written into snapshot metadata
    #[serde(default = "default_description")]
    pub description: String,

    #[serde(default)]
    pub http: HttpServerConfig,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("./inventory.db")
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backups")
}
fn default_policy_file() -> PathBuf {
    PathBuf::from("./backupConfig.json")
}
fn default_credentials_file() -> PathBuf {
    PathBuf::from("./credentials.json")
}
fn default_token_file() -> PathBuf {
    PathBuf::from("./token.json")
}
fn default_artifact_prefix() -> String {
    "inventory_backup".to_string()
}
fn default_description() -> String {
    "Automated backup".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            backup_dir: default_backup_dir(),
            policy_file: default_policy_file(),
            credentials_file: default_credentials_file(),
            token_file: default_token_file(),
            artifact_prefix: default_artifact_prefix(),
            description: default_description(),
            http: HttpServerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config: ServiceConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded service config");
        Ok(config)
    }

    /// Load from a JSON file, or use defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.artifact_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("artifact_prefix must not be empty".to_string()));
        }
        if crate::backup::validate_name(&self.artifact_prefix).is_err() {
            return Err(ConfigError::Invalid(format!(
                "artifact_prefix '{}' may only contain letters, digits, '_', '-' and '.'",
                self.artifact_prefix
            )));
        }
        self.http.validate()
    }

    /// Paths and labels used by the backup pipeline
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            data_file: self.data_file.clone(),
            backup_dir: self.backup_dir.clone(),
            artifact_prefix: self.artifact_prefix.clone(),
            description: self.description.clone(),
        }
    }
}
