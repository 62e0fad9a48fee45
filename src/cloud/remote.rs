//! Remote object store abstraction

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::auth::CloudSession;
use super::errors::CloudResult;

/// A file held in the remote backup folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Operations the backup engine needs from remote storage.
///
/// Every call takes the session it should authenticate with; implementations
/// hold no credentials of their own.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up a folder by exact name
    async fn find_folder(&self, session: &CloudSession, name: &str) -> CloudResult<Option<String>>;

    /// Create a folder and return its id
    async fn create_folder(&self, session: &CloudSession, name: &str) -> CloudResult<String>;

    /// Upload a local file into a folder under `name`
    async fn upload(
        &self,
        session: &CloudSession,
        folder_id: &str,
        path: &Path,
        name: &str,
    ) -> CloudResult<RemoteObject>;

    /// Objects in a folder, newest first
    async fn list(&self, session: &CloudSession, folder_id: &str) -> CloudResult<Vec<RemoteObject>>;

    /// Remove an object
    async fn delete(&self, session: &CloudSession, object_id: &str) -> CloudResult<()>;

    /// Cheap authenticated request used by connection tests
    async fn check_access(&self, session: &CloudSession) -> CloudResult<()>;
}

/// Find the named folder, creating it when absent
pub async fn ensure_folder(
    remote: &dyn RemoteStore,
    session: &CloudSession,
    name: &str,
) -> CloudResult<String> {
    match remote.find_folder(session, name).await? {
        Some(id) => Ok(id),
        None => {
            let id = remote.create_folder(session, name).await?;
            tracing::info!(folder = name, id = %id, "created remote backup folder");
            Ok(id)
        }
    }
}
