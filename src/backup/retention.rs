//! Retention manager
//!
//! Keeps the newest `keep` artifacts on each side and deletes the rest,
//! oldest first. Individual deletion failures are logged and reported but
//! never abort the prune.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use super::artifact::{chronological, delete_local, list_local, BackupArtifact};
use super::errors::{BackupError, BackupResult};
use crate::cloud::{CloudSession, RemoteStore};

/// What a prune pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    /// Names deleted, oldest first
    pub deleted: Vec<String>,
    /// `name: error` for each artifact that could not be deleted
    pub failures: Vec<String>,
    /// Artifacts present after the pass
    pub remaining: usize,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The `len - keep` oldest artifacts. Ties on creation time are broken by
/// collision sequence and then by name.
pub fn select_for_eviction(artifacts: &[BackupArtifact], keep: usize) -> Vec<BackupArtifact> {
    if artifacts.len() <= keep {
        return Vec::new();
    }

    let mut sorted = artifacts.to_vec();
    sorted.sort_by(chronological);
    sorted.truncate(artifacts.len() - keep);
    sorted
}

/// Prune local artifacts under `prefix` in `dir` down to `keep`.
///
/// `protect` names an artifact that must survive regardless of its position.
/// Entries that are not artifacts under `prefix` are never touched.
pub fn prune_local(
    dir: &Path,
    prefix: &str,
    keep: usize,
    protect: Option<&str>,
) -> BackupResult<RetentionReport> {
    let artifacts = list_local(dir, prefix).map_err(|e| BackupError::Retention(e.to_string()))?;
    let mut report = RetentionReport {
        remaining: artifacts.len(),
        ..Default::default()
    };

    for artifact in select_for_eviction(&artifacts, keep) {
        if Some(artifact.name.as_str()) == protect {
            continue;
        }
        match delete_local(&artifact) {
            Ok(()) => {
                info!(artifact = %artifact.name, "deleted old local backup");
                report.deleted.push(artifact.name);
                report.remaining -= 1;
            }
            Err(e) => {
                warn!(artifact = %artifact.name, error = %e, "failed to delete local backup");
                report.failures.push(format!("{}: {}", artifact.name, e));
            }
        }
    }

    Ok(report)
}

/// Prune the remote folder down to `keep`
pub async fn prune_remote(
    remote: &dyn RemoteStore,
    session: &CloudSession,
    folder_id: &str,
    keep: usize,
) -> BackupResult<RetentionReport> {
    let objects = remote
        .list(session, folder_id)
        .await
        .map_err(|e| BackupError::Retention(e.to_string()))?;
    let artifacts: Vec<BackupArtifact> = objects.into_iter().map(Into::into).collect();

    let mut report = RetentionReport {
        remaining: artifacts.len(),
        ..Default::default()
    };

    for artifact in select_for_eviction(&artifacts, keep) {
        match remote.delete(session, &artifact.location).await {
            Ok(()) => {
                info!(artifact = %artifact.name, id = %artifact.location, "deleted old cloud backup");
                report.deleted.push(artifact.name);
                report.remaining -= 1;
            }
            Err(e) => {
                warn!(artifact = %artifact.name, error = %e, "failed to delete cloud backup");
                report.failures.push(format!("{}: {}", artifact.name, e));
            }
        }
    }

    Ok(report)
}
