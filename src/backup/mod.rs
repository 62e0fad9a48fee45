//! Backup engine
//!
//! One run copies the primary data file into a local artifact, optionally
//! uploads it, and trims both artifact sets to the policy's limits.
//!
//! # Algorithm
//!
//! 1. Snapshot: copy the data file plus `metadata.json` into a new directory
//! 2. Compress: fold the directory into `<name>.tar.gz` (falls back to the
//!    directory if archiving fails)
//! 3. Sync: if the policy is enabled and credentials are configured, upload
//!    into the remote folder, then prune the remote folder
//! 4. Prune local artifacts
//!
//! Steps 1 and 2 abort the run on failure. Anything failing in 3 or 4 is
//! recorded on the [`BackupRun`] and the local artifact stands.
//!
//! # Layout
//!
//! ```text
//! backups/
//! ├── inventory_backup_20240301T020000123Z.tar.gz
//! ├── inventory_backup_20240302T020000045Z/      (compression off)
//! │   ├── inventory.db
//! │   └── metadata.json
//! └── .staging/                                  (upload scratch space)
//! ```

mod archive;
mod artifact;
mod errors;
mod manifest;
mod pipeline;
mod retention;
mod run;
mod snapshot;
mod sync;

pub use archive::{compress_snapshot, create_tar_archive};
pub use artifact::{
    artifact_name, delete_local, find_local, is_artifact_name, list_local, parse_name, unique_name,
    validate_name, ArtifactOrigin, BackupArtifact, ARCHIVE_EXTENSION, STAGING_DIR,
};
pub use errors::{BackupError, BackupResult};
pub use manifest::{SnapshotMetadata, FORMAT_VERSION, METADATA_FILE};
pub use pipeline::{finalize_artifact, BackupPipeline, PipelineConfig};
pub use retention::{prune_local, prune_remote, select_for_eviction, RetentionReport};
pub use run::{BackupRun, RunOutcome, RunTrigger};
pub use snapshot::{take_snapshot, Snapshot};
pub use sync::{CloudSync, SyncOutcome};
