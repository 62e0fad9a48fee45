//! # Backup Service
//!
//! Composition root. Owns the policy store, authenticator, remote store and
//! scheduler, and exposes the operations the HTTP layer and CLI call.
//!
//! Lifecycle: [`BackupService::initialize`] once at startup, then
//! [`BackupService::dispose`] on shutdown.

mod status;

pub use status::{BackupStats, BackupStatus, ConnectionTest, LastRunSummary};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backup::{
    create_tar_archive, delete_local, find_local, list_local, BackupArtifact, BackupError,
    BackupPipeline, BackupResult, BackupRun, STAGING_DIR,
};
use crate::cloud::{
    CloudAuthenticator, CloudError, DriveClient, GoogleTokenEndpoint, RemoteStore, TokenEndpoint,
};
use crate::config::ServiceConfig;
use crate::policy::{BackupPolicy, PolicyStore, PolicyUpdate};
use crate::scheduler::Scheduler;

/// An artifact opened for download, streamed by the caller
#[derive(Debug)]
pub struct ArtifactDownload {
    pub file_name: String,
    pub content_type: &'static str,
    pub content_length: u64,
    pub file: tokio::fs::File,
}

/// Tar a directory artifact into the staging area and open it. The staged
/// copy is unlinked once open.
fn pack_for_download(source: &Path, staging: &Path, name: &str) -> BackupResult<fs::File> {
    fs::create_dir_all(staging).map_err(|e| BackupError::io_error_at_path(staging, e))?;
    let staged = staging.join(format!("{}-{}.tar", name, Uuid::new_v4()));
    create_tar_archive(source, &staged)?;

    let file = fs::File::open(&staged).map_err(|e| BackupError::io_error_at_path(&staged, e));
    if let Err(e) = fs::remove_file(&staged) {
        warn!(staged = %staged.display(), error = %e, "failed to remove staged download");
    }
    file
}

pub struct BackupService {
    config: ServiceConfig,
    store: PolicyStore,
    authenticator: Arc<CloudAuthenticator>,
    remote: Arc<dyn RemoteStore>,
    scheduler: Arc<Scheduler>,
    update_lock: Mutex<()>,
}

impl BackupService {
    /// Service backed by Google Drive
    pub fn new(config: ServiceConfig) -> Self {
        let http = reqwest::Client::new();
        Self::with_components(
            config,
            Arc::new(DriveClient::new(http.clone())),
            Arc::new(GoogleTokenEndpoint::new(http)),
        )
    }

    /// Service with explicit remote store and token endpoint
    pub fn with_components(
        config: ServiceConfig,
        remote: Arc<dyn RemoteStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        let authenticator = Arc::new(CloudAuthenticator::new(
            &config.credentials_file,
            &config.token_file,
            endpoint,
        ));
        let pipeline = BackupPipeline::new(
            config.pipeline(),
            Arc::clone(&authenticator),
            Arc::clone(&remote),
        );

        Self {
            store: PolicyStore::new(&config.policy_file),
            scheduler: Scheduler::new(Arc::new(pipeline)),
            authenticator,
            remote,
            config,
            update_lock: Mutex::new(()),
        }
    }

    /// Load policy and credentials and arm the scheduler.
    ///
    /// Neither a policy load failure nor missing credentials stop the
    /// service: an unreadable or invalid stored policy is replaced by the
    /// defaults, and without credentials backups stay local.
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) -> BackupResult<()> {
        fs::create_dir_all(&self.config.backup_dir)
            .map_err(|e| BackupError::io_error_at_path(&self.config.backup_dir, e))?;

        let policy = match self.store.load().and_then(|p| p.validate().map(|()| p)) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(error = %e, "stored policy unusable, using defaults");
                BackupPolicy::with_defaults()
            }
        };

        match self.authenticator.initialize() {
            Ok(true) => info!("cloud storage ready"),
            Ok(false) => info!("cloud storage requires consent"),
            Err(e) => warn!(error = %e, "cloud storage not configured, backups stay local"),
        }

        self.scheduler.apply_policy(policy)?;

        info!(
            backup_dir = %self.config.backup_dir.display(),
            enabled = self.scheduler.policy().enabled,
            "backup service initialized"
        );
        Ok(())
    }

    /// Stop the scheduler
    pub fn dispose(&self) {
        self.scheduler.shutdown();
        info!("backup service stopped");
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &CloudAuthenticator {
        &self.authenticator
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The effective policy
    pub fn policy(&self) -> BackupPolicy {
        self.scheduler.policy()
    }

    /// Merge, validate, apply, then persist a policy update.
    ///
    /// If persisting fails the new policy is still in effect and the
    /// returned error says so.
    pub async fn update_policy(&self, update: PolicyUpdate) -> BackupResult<BackupPolicy> {
        let _serialized = self.update_lock.lock().await;

        let merged = self.scheduler.policy().apply_update(&update);
        merged.validate()?;
        self.scheduler.apply_policy(merged.clone())?;

        if let Err(e) = self.store.save(&merged) {
            warn!(error = %e, "policy applied but not persisted");
            return Err(e.into());
        }

        info!(
            enabled = merged.enabled,
            schedule = %merged.schedule,
            keep_local = merged.keep_local_copies,
            keep_cloud = merged.keep_cloud_copies,
            "backup policy updated"
        );
        Ok(merged)
    }

    /// Start the consent flow
    pub fn consent_url(&self) -> BackupResult<String> {
        if !self.authenticator.is_configured() {
            self.authenticator.initialize()?;
        }
        Ok(self.authenticator.generate_consent_url()?)
    }

    /// Finish the consent flow
    pub async fn complete_consent(&self, code: &str) -> BackupResult<()> {
        self.authenticator.complete_consent(code).await?;
        info!("cloud storage authorized");
        Ok(())
    }

    /// Run a backup now
    pub async fn trigger_backup(&self) -> BackupResult<BackupRun> {
        self.scheduler.trigger_manual().await
    }

    /// Local artifacts, newest first
    pub fn list_artifacts(&self) -> BackupResult<Vec<BackupArtifact>> {
        list_local(&self.config.backup_dir, &self.config.artifact_prefix)
    }

    /// Open an artifact for download. Directory artifacts are packed into an
    /// uncompressed tar.
    pub async fn read_artifact(&self, name: &str) -> BackupResult<ArtifactDownload> {
        let artifact = find_local(&self.config.backup_dir, &self.config.artifact_prefix, name)?;
        let staging = self.config.backup_dir.join(STAGING_DIR);

        let (file_name, content_type, file) =
            tokio::task::spawn_blocking(move || -> BackupResult<(String, &'static str, fs::File)> {
                let path = artifact.path();
                if path.is_dir() {
                    let file = pack_for_download(&path, &staging, &artifact.name)?;
                    Ok((format!("{}.tar", artifact.name), "application/x-tar", file))
                } else {
                    let file =
                        fs::File::open(&path).map_err(|e| BackupError::io_error_at_path(&path, e))?;
                    Ok((artifact.name.clone(), "application/gzip", file))
                }
            })
            .await
            .map_err(|e| BackupError::Io(format!("read task failed: {}", e)))??;

        let file = tokio::fs::File::from_std(file);
        let content_length = file
            .metadata()
            .await
            .map_err(|e| BackupError::Io(format!("{}: {}", file_name, e)))?
            .len();

        Ok(ArtifactDownload {
            file_name,
            content_type,
            content_length,
            file,
        })
    }

    /// Delete a local artifact by name
    pub fn delete_artifact(&self, name: &str) -> BackupResult<()> {
        let artifact = find_local(&self.config.backup_dir, &self.config.artifact_prefix, name)?;
        delete_local(&artifact)?;
        info!(artifact = %name, "backup deleted");
        Ok(())
    }

    /// Check the remote store is reachable with the current session
    pub async fn test_connection(&self) -> ConnectionTest {
        let session = match self.authenticator.current_session() {
            Some(session) => session,
            None => {
                return ConnectionTest {
                    success: false,
                    message: "Not connected to cloud storage".to_string(),
                }
            }
        };

        match self.remote.check_access(&session).await {
            Ok(()) => ConnectionTest {
                success: true,
                message: "Successfully connected to cloud storage".to_string(),
            },
            Err(e) => {
                warn!(error = %e, "cloud connection test failed");
                e.into()
            }
        }
    }

    /// Session available and the last cloud leg (if any) did not fail
    pub fn cloud_connected(&self) -> bool {
        self.authenticator.is_authenticated()
            && !self
                .scheduler
                .last_run()
                .map(|run| run.cloud_failed())
                .unwrap_or(false)
    }

    pub fn stats(&self) -> BackupResult<BackupStats> {
        let artifacts = self.list_artifacts()?;
        Ok(BackupStats::from_artifacts(
            &artifacts,
            self.scheduler.next_run(),
            self.cloud_connected(),
            self.policy().enabled,
        ))
    }

    /// Aggregate status. Read-only.
    pub fn status(&self) -> BackupStatus {
        let policy = self.policy();

        let last_run = match self.scheduler.last_run() {
            Some(run) => Some(LastRunSummary::from_run(&run)),
            None => match self.list_artifacts() {
                Ok(artifacts) => artifacts.first().map(LastRunSummary::from_artifact),
                Err(e) => {
                    warn!(error = %e, "cannot list backups for status");
                    None
                }
            },
        };

        BackupStatus {
            enabled: policy.enabled,
            schedule_expression: policy.schedule,
            cloud_configured: self.authenticator.is_configured(),
            cloud_connected: self.cloud_connected(),
            auth_kind: self.authenticator.strategy_kind().map(str::to_string),
            last_run,
            next_run: self.scheduler.next_run(),
            scheduler: self.scheduler.state(),
        }
    }
}

impl From<CloudError> for ConnectionTest {
    fn from(err: CloudError) -> Self {
        ConnectionTest {
            success: false,
            message: err.to_string(),
        }
    }
}
