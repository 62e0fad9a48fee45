//! Snapshot stage
//!
//! Copies the primary data file into a fresh, uniquely named directory and
//! writes the metadata sidecar next to it. The source file is only read.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::artifact::unique_name;
use super::errors::{BackupError, BackupResult};
use super::manifest::{SnapshotMetadata, METADATA_FILE};

/// Output of a successful snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub name: String,
    pub dir: PathBuf,
    pub metadata: SnapshotMetadata,
}

/// Copy a file with fsync, returning the byte count and hex SHA-256
fn copy_file_with_fsync(src: &Path, dst: &Path) -> BackupResult<(u64, String)> {
    let src_file = File::open(src).map_err(|e| BackupError::io_error_at_path(src, e))?;
    let mut reader = BufReader::new(src_file);
    let mut dst_file = File::create(dst).map_err(|e| BackupError::io_error_at_path(dst, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| BackupError::io_error_at_path(src, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dst_file
            .write_all(&buf[..n])
            .map_err(|e| BackupError::io_error_at_path(dst, e))?;
        total += n as u64;
    }

    dst_file
        .sync_all()
        .map_err(|e| BackupError::io_error(format!("fsync {}", dst.display()), e))?;

    Ok((total, format!("{:x}", hasher.finalize())))
}

fn fsync_dir(path: &Path) -> BackupResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| BackupError::io_error_at_path(path, e))?;
    dir.sync_all()
        .map_err(|e| BackupError::io_error(format!("fsync directory {}", path.display()), e))
}

fn populate(primary: &Path, dir: &Path, description: &str) -> BackupResult<SnapshotMetadata> {
    let file_name = primary
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "database".to_string());

    let (size, sha256) = copy_file_with_fsync(primary, &dir.join(&file_name))?;

    let metadata = SnapshotMetadata::new(Utc::now(), size, description, file_name, sha256);
    metadata.write_to_file(&dir.join(METADATA_FILE))?;
    fsync_dir(dir)?;

    Ok(metadata)
}

/// Take a snapshot of `primary` under `backup_dir`.
///
/// Any failure is a [`BackupError::Snapshot`]; the partially written
/// directory is removed before returning.
pub fn take_snapshot(
    primary: &Path,
    backup_dir: &Path,
    prefix: &str,
    description: &str,
) -> BackupResult<Snapshot> {
    if !primary.is_file() {
        return Err(BackupError::Snapshot(format!(
            "primary data file not found: {}",
            primary.display()
        )));
    }

    fs::create_dir_all(backup_dir).map_err(|e| {
        BackupError::Snapshot(format!("cannot create {}: {}", backup_dir.display(), e))
    })?;

    let name = unique_name(backup_dir, prefix, Utc::now());
    let dir = backup_dir.join(&name);
    fs::create_dir(&dir)
        .map_err(|e| BackupError::Snapshot(format!("cannot create {}: {}", dir.display(), e)))?;

    match populate(primary, &dir, description) {
        Ok(metadata) => {
            info!(
                snapshot = %name,
                bytes = metadata.database_size,
                "snapshot created"
            );
            Ok(Snapshot {
                name,
                dir,
                metadata,
            })
        }
        Err(e) => {
            debug!(snapshot = %name, "removing partial snapshot");
            let _ = fs::remove_dir_all(&dir);
            Err(match e {
                BackupError::Snapshot(msg) => BackupError::Snapshot(msg),
                other => BackupError::Snapshot(other.to_string()),
            })
        }
    }
}
