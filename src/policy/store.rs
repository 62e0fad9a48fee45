//! Policy persistence
//!
//! Saves go through a temp file, fsync and rename so a crash never leaves a
//! half-written policy behind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::errors::{ConfigError, PolicyResult};
use super::BackupPolicy;

/// File-backed policy store
#[derive(Debug, Clone)]
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    /// Create a store for the given policy file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the policy file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted policy merged over the defaults.
    ///
    /// When no file exists the defaults are written back and returned.
    pub fn load(&self) -> PolicyResult<BackupPolicy> {
        if !self.path.exists() {
            let policy = BackupPolicy::with_defaults();
            self.save(&policy)?;
            info!(path = %self.path.display(), "wrote default backup policy");
            return Ok(policy);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))?;
        let policy: BackupPolicy =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        debug!(path = %self.path.display(), "loaded backup policy");
        Ok(policy)
    }

    /// Atomically replace the persisted policy
    pub fn save(&self, policy: &BackupPolicy) -> PolicyResult<()> {
        let json = serde_json::to_string_pretty(policy)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
            }
        }

        let temp_path = self.temp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| ConfigError::io(&temp_path, e))?;

        file.write_all(json.as_bytes())
            .map_err(|e| ConfigError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| ConfigError::io(&temp_path, e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| ConfigError::io(&self.path, e))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
