//! Backup artifacts and their naming scheme
//!
//! Artifact names carry their creation time:
//!
//! ```text
//! <prefix>_<YYYYMMDD>T<HHMMSS><mmm>Z[-<n>]
//! inventory_backup_20240301T020000123Z          (directory)
//! inventory_backup_20240301T020000123Z.tar.gz   (archive)
//! inventory_backup_20240301T020000123Z-1.tar.gz (same-millisecond collision)
//! ```

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::{BackupError, BackupResult};
use crate::cloud::RemoteObject;

/// Extension of compressed artifacts
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Directory under the backup root that is never listed as an artifact
pub const STAGING_DIR: &str = ".staging";

/// Where an artifact lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Local,
    Cloud,
}

/// A single point-in-time copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// Local path or remote object id
    pub location: String,
    pub origin: ArtifactOrigin,
}

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(?P<prefix>.+)_(?P<ts>\d{8}T\d{6})(?P<ms>\d{3})Z(?:-(?P<seq>\d+))?$").ok()
        })
        .as_ref()
}

fn safe_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").ok())
        .as_ref()
}

/// Name stem for an artifact created at `at`
pub fn artifact_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, at.format("%Y%m%dT%H%M%S%3fZ"))
}

/// A name not yet used in `dir`, either as a directory or as an archive
pub fn unique_name(dir: &Path, prefix: &str, at: DateTime<Utc>) -> String {
    let base = artifact_name(prefix, at);
    let taken = |name: &str| {
        dir.join(name).exists() || dir.join(format!("{}{}", name, ARCHIVE_EXTENSION)).exists()
    };

    if !taken(&base) {
        return base;
    }

    let mut seq = 1u32;
    loop {
        let candidate = format!("{}-{}", base, seq);
        if !taken(&candidate) {
            return candidate;
        }
        seq += 1;
    }
}

fn strip_extension(name: &str) -> &str {
    name.strip_suffix(ARCHIVE_EXTENSION)
        .or_else(|| name.strip_suffix(".tar"))
        .unwrap_or(name)
}

/// Creation time and collision sequence encoded in an artifact name
pub fn parse_name(name: &str) -> Option<(DateTime<Utc>, u32)> {
    let caps = name_pattern()?.captures(strip_extension(name))?;

    let ts = NaiveDateTime::parse_from_str(caps.name("ts")?.as_str(), "%Y%m%dT%H%M%S").ok()?;
    let ms: i64 = caps.name("ms")?.as_str().parse().ok()?;
    let seq = caps
        .name("seq")
        .and_then(|s| s.as_str().parse().ok())
        .unwrap_or(0);

    Some((ts.and_utc() + Duration::milliseconds(ms), seq))
}

/// Reject names that could escape the backup directory
pub fn validate_name(name: &str) -> BackupResult<()> {
    if name.is_empty()
        || name.contains("..")
        || name.starts_with('.')
        || !safe_name_pattern().is_some_and(|p| p.is_match(name))
    {
        return Err(BackupError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Oldest first; equal timestamps fall back to sequence, then name
pub fn chronological(a: &BackupArtifact, b: &BackupArtifact) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.sequence().cmp(&b.sequence()))
        .then_with(|| a.name.cmp(&b.name))
}

fn path_size(path: &Path) -> std::io::Result<u64> {
    let meta = fs::metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }

    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += path_size(&entry?.path())?;
    }
    Ok(total)
}

impl BackupArtifact {
    /// Describe an artifact already on disk
    pub fn from_path(path: &Path) -> BackupResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| BackupError::InvalidName(path.display().to_string()))?;

        let size_bytes = path_size(path).map_err(|e| BackupError::io_error_at_path(path, e))?;

        let created_at = match parse_name(&name) {
            Some((at, _)) => at,
            None => fs::metadata(path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .map_err(|e| BackupError::io_error_at_path(path, e))?,
        };

        Ok(Self {
            name,
            created_at,
            size_bytes,
            location: path.display().to_string(),
            origin: ArtifactOrigin::Local,
        })
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }

    /// Uncompressed artifacts are directories
    pub fn is_directory(&self) -> bool {
        self.origin == ArtifactOrigin::Local && self.path().is_dir()
    }

    fn sequence(&self) -> u32 {
        parse_name(&self.name).map(|(_, seq)| seq).unwrap_or(0)
    }
}

impl From<RemoteObject> for BackupArtifact {
    fn from(object: RemoteObject) -> Self {
        BackupArtifact {
            created_at: parse_name(&object.name)
                .map(|(at, _)| at)
                .unwrap_or(object.created_at),
            name: object.name,
            size_bytes: object.size_bytes,
            location: object.id,
            origin: ArtifactOrigin::Cloud,
        }
    }
}

/// Whether `name` is an artifact written under `prefix`: a directory stem or
/// a `.tar.gz` archive whose stem carries a parseable timestamp
pub fn is_artifact_name(name: &str, prefix: &str) -> bool {
    let stem = name.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(name);

    let owned = name_pattern()
        .and_then(|p| p.captures(stem))
        .and_then(|caps| caps.name("prefix"))
        .is_some_and(|p| p.as_str() == prefix);

    owned && parse_name(stem).is_some()
}

/// Describe one directory entry, or `None` if it vanished while being read
fn local_entry(path: &Path) -> BackupResult<Option<BackupArtifact>> {
    match BackupArtifact::from_path(path) {
        Ok(artifact) => Ok(Some(artifact)),
        Err(_) if !path.exists() => {
            debug!(path = %path.display(), "entry removed during listing, skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Local artifacts under `prefix` in `dir`, newest first.
///
/// Anything else in the directory is not ours and is never listed.
pub fn list_local(dir: &Path, prefix: &str) -> BackupResult<Vec<BackupArtifact>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BackupError::io_error_at_path(dir, e))? {
        let entry = entry.map_err(|e| BackupError::io_error_at_path(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if validate_name(&name).is_err() || !is_artifact_name(&name, prefix) {
            continue;
        }
        let is_archive = name.ends_with(ARCHIVE_EXTENSION) && path.is_file();
        if !is_archive && !path.is_dir() {
            continue;
        }

        if let Some(artifact) = local_entry(&path)? {
            artifacts.push(artifact);
        }
    }

    artifacts.sort_by(|a, b| chronological(b, a));
    Ok(artifacts)
}

/// Look up a local artifact by name
pub fn find_local(dir: &Path, prefix: &str, name: &str) -> BackupResult<BackupArtifact> {
    validate_name(name)?;

    let path = dir.join(name);
    if !is_artifact_name(name, prefix) || !path.exists() {
        return Err(BackupError::NotFound(name.to_string()));
    }
    BackupArtifact::from_path(&path)
}

/// Remove a local artifact, file or directory
pub fn delete_local(artifact: &BackupArtifact) -> BackupResult<()> {
    let path = artifact.path();
    let result = if path.is_dir() {
        fs::remove_dir_all(&path)
    } else {
        fs::remove_file(&path)
    };
    result.map_err(|e| BackupError::io_error_at_path(&path, e))
}
