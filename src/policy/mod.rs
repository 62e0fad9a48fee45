//! Backup policy
//!
//! The policy decides whether scheduled backups run, when they run, how many
//! artifacts are retained on each side, and whether snapshots are compressed.
//!
//! # Persistence format
//!
//! ```text
//! {
//!   "enabled": false,
//!   "schedule": "0 2 * * *",
//!   "keepLocalCopies": 5,
//!   "keepCloudCopies": 10,
//!   "folderName": "Inventory_Backups",
//!   "compressBackups": true
//! }
//! ```
//!
//! Missing keys fall back to the built-in defaults, so a partial file on disk
//! merges over [`BackupPolicy::with_defaults`].

mod errors;
mod store;

pub use errors::{ConfigError, PolicyResult};
pub use store::PolicyStore;

use serde::{Deserialize, Serialize};

use crate::scheduler::CronSchedule;

/// Default schedule: daily at 02:00
pub const DEFAULT_SCHEDULE: &str = "0 2 * * *";

/// Default remote folder name
pub const DEFAULT_FOLDER_NAME: &str = "Inventory_Backups";

/// The effective backup policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPolicy {
    /// Whether scheduled backups (and the cloud leg) are enabled
    #[serde(default)]
    pub enabled: bool,

    /// Five-field cron expression
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Maximum number of local artifacts kept
    #[serde(default = "default_keep_local")]
    pub keep_local_copies: usize,

    /// Maximum number of remote artifacts kept in the backup folder
    #[serde(default = "default_keep_cloud")]
    pub keep_cloud_copies: usize,

    /// Remote folder that receives uploads
    #[serde(default = "default_folder_name")]
    pub folder_name: String,

    /// Fold each snapshot into a single archive
    #[serde(default = "default_compress")]
    pub compress_backups: bool,
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}
fn default_keep_local() -> usize {
    5
}
fn default_keep_cloud() -> usize {
    10
}
fn default_folder_name() -> String {
    DEFAULT_FOLDER_NAME.to_string()
}
fn default_compress() -> bool {
    true
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A partial policy update. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub keep_local_copies: Option<usize>,
    #[serde(default)]
    pub keep_cloud_copies: Option<usize>,
    #[serde(default)]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub compress_backups: Option<bool>,
}

impl BackupPolicy {
    /// The hard-coded defaults used before any file is loaded
    pub fn with_defaults() -> Self {
        Self {
            enabled: false,
            schedule: default_schedule(),
            keep_local_copies: default_keep_local(),
            keep_cloud_copies: default_keep_cloud(),
            folder_name: default_folder_name(),
            compress_backups: default_compress(),
        }
    }

    /// Merge a partial update over this policy.
    ///
    /// Pure: the receiver is untouched and the merged policy is returned.
    /// Empty strings are treated as absent.
    pub fn apply_update(&self, update: &PolicyUpdate) -> BackupPolicy {
        BackupPolicy {
            enabled: update.enabled.unwrap_or(self.enabled),
            schedule: update
                .schedule
                .as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| self.schedule.clone()),
            keep_local_copies: update.keep_local_copies.unwrap_or(self.keep_local_copies),
            keep_cloud_copies: update.keep_cloud_copies.unwrap_or(self.keep_cloud_copies),
            folder_name: update
                .folder_name
                .as_ref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| self.folder_name.clone()),
            compress_backups: update.compress_backups.unwrap_or(self.compress_backups),
        }
    }

    /// Range and shape checks. The store never calls this; callers that
    /// accept policies from outside do.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.keep_local_copies < 1 {
            return Err(ConfigError::Invalid(
                "keepLocalCopies must be at least 1".to_string(),
            ));
        }
        if self.keep_cloud_copies < 1 {
            return Err(ConfigError::Invalid(
                "keepCloudCopies must be at least 1".to_string(),
            ));
        }
        if self.folder_name.trim().is_empty() {
            return Err(ConfigError::Invalid("folderName must not be empty".to_string()));
        }
        CronSchedule::parse(&self.schedule)
            .map_err(|e| ConfigError::Invalid(format!("schedule: {}", e)))?;
        Ok(())
    }
}
