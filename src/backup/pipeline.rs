//! Snapshot → compress → sync → prune

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::archive::compress_snapshot;
use super::artifact::{BackupArtifact, STAGING_DIR};
use super::errors::{BackupError, BackupResult};
use super::retention::{prune_local, prune_remote};
use super::run::{BackupRun, RunTrigger};
use super::snapshot::{take_snapshot, Snapshot};
use super::sync::CloudSync;
use crate::cloud::{CloudAuthenticator, RemoteStore};
use crate::policy::BackupPolicy;
use crate::scheduler::BackupJob;

/// Where the pipeline reads from and writes to
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Primary data file
    pub data_file: PathBuf,
    /// Local artifact directory
    pub backup_dir: PathBuf,
    pub artifact_prefix: String,
    /// Label written into snapshot metadata
    pub description: String,
}

/// Turn a snapshot into the run's local artifact.
///
/// With `compress` set, a compression failure falls back to the snapshot
/// directory and the error text is returned alongside.
pub fn finalize_artifact(
    snapshot: &Snapshot,
    compress: bool,
) -> BackupResult<(BackupArtifact, Option<String>)> {
    if !compress {
        return Ok((BackupArtifact::from_path(&snapshot.dir)?, None));
    }

    match compress_snapshot(&snapshot.dir) {
        Ok(archive) => Ok((BackupArtifact::from_path(&archive)?, None)),
        Err(e) => {
            warn!(
                snapshot = %snapshot.name,
                error = %e,
                "compression failed, keeping uncompressed snapshot"
            );
            Ok((BackupArtifact::from_path(&snapshot.dir)?, Some(e.to_string())))
        }
    }
}

/// The backup pipeline
pub struct BackupPipeline {
    config: PipelineConfig,
    authenticator: Arc<CloudAuthenticator>,
    cloud: CloudSync,
}

impl BackupPipeline {
    pub fn new(
        config: PipelineConfig,
        authenticator: Arc<CloudAuthenticator>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let staging = config.backup_dir.join(STAGING_DIR);
        Self {
            cloud: CloudSync::new(Arc::clone(&authenticator), remote, staging),
            authenticator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Snapshot and compress on the blocking pool
    async fn local_leg(&self, compress: bool) -> BackupResult<(BackupArtifact, Option<String>)> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let snapshot = take_snapshot(
                &config.data_file,
                &config.backup_dir,
                &config.artifact_prefix,
                &config.description,
            )?;
            finalize_artifact(&snapshot, compress)
        })
        .await
        .map_err(|e| BackupError::Snapshot(format!("snapshot task failed: {}", e)))?
    }

    /// Upload and prune remote. Errors are recorded on the run.
    async fn cloud_leg(&self, run: &mut BackupRun, artifact: &BackupArtifact, policy: &BackupPolicy) {
        run.cloud_attempted = true;

        let outcome = match self.cloud.sync(artifact, policy).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "cloud upload failed, keeping local backup");
                run.cloud_error = Some(e.to_string());
                return;
            }
        };

        run.cloud_artifact = Some(outcome.object.clone().into());

        match prune_remote(
            self.cloud.remote(),
            &outcome.session,
            &outcome.folder_id,
            policy.keep_cloud_copies,
        )
        .await
        {
            Ok(report) => run.remote_retention = Some(report),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "cloud retention skipped");
                run.retention_errors.push(e.to_string());
            }
        }
    }

    async fn local_retention(&self, run: &mut BackupRun, protect: &str, keep: usize) {
        let dir = self.config.backup_dir.clone();
        let prefix = self.config.artifact_prefix.clone();
        let protect = protect.to_string();
        let result =
            tokio::task::spawn_blocking(move || prune_local(&dir, &prefix, keep, Some(&protect)))
                .await
                .map_err(|e| BackupError::Retention(format!("retention task failed: {}", e)))
                .and_then(|r| r);

        match result {
            Ok(report) => run.local_retention = Some(report),
            Err(e) => {
                warn!(run_id = %run.id, error = %e, "local retention skipped");
                run.retention_errors.push(e.to_string());
            }
        }
    }
}

#[async_trait]
impl BackupJob for BackupPipeline {
    async fn execute(&self, policy: &BackupPolicy, trigger: RunTrigger) -> BackupRun {
        let mut run = BackupRun::start(trigger);
        info!(run_id = %run.id, %trigger, "backup run started");

        let (artifact, compression_error) = match self.local_leg(policy.compress_backups).await {
            Ok(local) => local,
            Err(e) => {
                error!(run_id = %run.id, error = %e, "backup run failed");
                return run.abort(&e);
            }
        };
        info!(run_id = %run.id, artifact = %artifact.name, bytes = artifact.size_bytes, "local backup created");
        run.compression_error = compression_error;
        run.produced_artifact = Some(artifact.clone());

        if policy.enabled && self.authenticator.is_configured() {
            self.cloud_leg(&mut run, &artifact, policy).await;
        }

        self.local_retention(&mut run, &artifact.name, policy.keep_local_copies)
            .await;

        let run = run.finish();
        info!(run_id = %run.id, outcome = ?run.outcome, "backup run finished");
        run
    }
}
