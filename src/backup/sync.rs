//! Cloud sync stage

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::archive::create_tar_archive;
use super::artifact::BackupArtifact;
use super::errors::{BackupError, BackupResult};
use crate::cloud::{ensure_folder, CloudAuthenticator, CloudError, CloudSession, RemoteObject, RemoteStore};
use crate::policy::BackupPolicy;

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub object: RemoteObject,
    pub folder_id: String,
    pub session: CloudSession,
}

/// Uploads local artifacts into the policy's remote folder
#[derive(Clone)]
pub struct CloudSync {
    authenticator: Arc<CloudAuthenticator>,
    remote: Arc<dyn RemoteStore>,
    staging_dir: PathBuf,
}

impl CloudSync {
    pub fn new(
        authenticator: Arc<CloudAuthenticator>,
        remote: Arc<dyn RemoteStore>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            authenticator,
            remote,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn remote(&self) -> &dyn RemoteStore {
        self.remote.as_ref()
    }

    /// Upload `artifact` into `policy.folder_name`, creating the folder on
    /// first use. Directory artifacts are packed into a staging tar first.
    pub async fn sync(
        &self,
        artifact: &BackupArtifact,
        policy: &BackupPolicy,
    ) -> BackupResult<SyncOutcome> {
        let session = self
            .authenticator
            .current_session()
            .ok_or_else(|| CloudError::Auth("no authenticated cloud session".to_string()))?;

        let folder_id = ensure_folder(self.remote.as_ref(), &session, &policy.folder_name).await?;

        let object = if artifact.is_directory() {
            let staged = self.stage(artifact).await?;
            let upload_name = format!("{}.tar", artifact.name);
            let result = self
                .remote
                .upload(&session, &folder_id, &staged, &upload_name)
                .await;
            if let Err(e) = fs::remove_file(&staged) {
                warn!(staged = %staged.display(), error = %e, "failed to remove staging archive");
            }
            result?
        } else {
            self.remote
                .upload(&session, &folder_id, &artifact.path(), &artifact.name)
                .await?
        };

        info!(
            artifact = %artifact.name,
            remote_id = %object.id,
            folder = %policy.folder_name,
            "backup uploaded"
        );

        Ok(SyncOutcome {
            object,
            folder_id,
            session,
        })
    }

    async fn stage(&self, artifact: &BackupArtifact) -> BackupResult<PathBuf> {
        let source = artifact.path();
        let staging_dir = self.staging_dir.clone();
        let target = staging_dir.join(format!("{}.tar", artifact.name));
        debug!(target = %target.display(), "staging directory artifact for upload");

        let out = target.clone();
        tokio::task::spawn_blocking(move || -> BackupResult<()> {
            fs::create_dir_all(&staging_dir)
                .map_err(|e| BackupError::io_error_at_path(&staging_dir, e))?;
            create_tar_archive(&source, &out)
        })
        .await
        .map_err(|e| BackupError::Io(format!("staging task failed: {}", e)))??;

        Ok(target)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }
}
