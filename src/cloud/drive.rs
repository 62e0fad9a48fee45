//! Google Drive v3 implementation of [`RemoteStore`]

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::auth::CloudSession;
use super::errors::{CloudError, CloudResult};
use super::remote::{RemoteObject, RemoteStore};

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,size,createdTime";
const MULTIPART_BOUNDARY: &str = "dbvault_backup_boundary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    /// Drive reports sizes as decimal strings
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
}

impl From<DriveFile> for RemoteObject {
    fn from(file: DriveFile) -> Self {
        RemoteObject {
            id: file.id,
            name: file.name,
            size_bytes: file
                .size
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            created_at: file.created_time.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Drive REST client
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl DriveClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: DRIVE_API.to_string(),
            upload_base: DRIVE_UPLOAD_API.to_string(),
        }
    }

    /// Point the client at a different host (used against local stubs)
    pub fn with_base_urls(mut self, api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    async fn check(response: reqwest::Response, what: &str) -> CloudResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CloudError::Auth(format!("{} rejected ({}): {}", what, status, body)));
        }
        Err(CloudError::Http(format!("{} failed ({}): {}", what, status, body)))
    }
}

/// Quote a value for a Drive `q` expression
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        "application/gzip"
    } else if name.ends_with(".tar") {
        "application/x-tar"
    } else {
        "application/octet-stream"
    }
}

/// multipart/related framing around the file bytes: the JSON metadata part
/// plus the media part header, and the closing boundary
fn multipart_envelope(metadata: &serde_json::Value, content_type: &str) -> (String, String) {
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {ct}\r\n\r\n",
        b = MULTIPART_BOUNDARY,
        meta = metadata,
        ct = content_type,
    );
    let tail = format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY);
    (head, tail)
}

/// The envelope with the file streamed in between, read chunk by chunk
fn multipart_stream(
    head: String,
    file: tokio::fs::File,
    tail: String,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    stream::iter([Ok(Bytes::from(head))])
        .chain(ReaderStream::new(file))
        .chain(stream::iter([Ok(Bytes::from(tail))]))
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find_folder(&self, session: &CloudSession, name: &str) -> CloudResult<Option<String>> {
        let token = session.bearer_token().await?;
        let query = format!(
            "name = {} and mimeType = '{}' and trashed = false",
            quote(name),
            FOLDER_MIME
        );

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;
        let list: FileList = Self::check(response, "folder lookup").await?.json().await?;

        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(&self, session: &CloudSession, name: &str) -> CloudResult<String> {
        let token = session.bearer_token().await?;
        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME, "parents": ["root"] }))
            .send()
            .await?;
        let file: DriveFile = Self::check(response, "folder create").await?.json().await?;

        Ok(file.id)
    }

    async fn upload(
        &self,
        session: &CloudSession,
        folder_id: &str,
        path: &Path,
        name: &str,
    ) -> CloudResult<RemoteObject> {
        let open_err = |e: std::io::Error| CloudError::Upload(format!("{}: {}", path.display(), e));
        let file = tokio::fs::File::open(path).await.map_err(open_err)?;
        let file_len = file.metadata().await.map_err(open_err)?.len();
        let metadata = json!({
            "name": name,
            "parents": [folder_id],
            "description": format!("Database backup created {}", Utc::now().to_rfc3339()),
        });

        let (head, tail) = multipart_envelope(&metadata, content_type_for(name));
        let content_length = head.len() as u64 + file_len + tail.len() as u64;

        let token = session.bearer_token().await?;
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(multipart_stream(head, file, tail)))
            .send()
            .await
            .map_err(|e| CloudError::Upload(e.to_string()))?;

        let file: DriveFile = Self::check(response, "upload")
            .await
            .map_err(|e| match e {
                CloudError::Http(msg) => CloudError::Upload(msg),
                other => other,
            })?
            .json()
            .await?;

        info!(name, id = %file.id, bytes = file_len, "uploaded backup");
        Ok(file.into())
    }

    async fn list(&self, session: &CloudSession, folder_id: &str) -> CloudResult<Vec<RemoteObject>> {
        let token = session.bearer_token().await?;
        let query = format!("{} in parents and trashed = false", quote(folder_id));
        let fields = format!("files({})", FILE_FIELDS);

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("orderBy", "createdTime desc"),
                ("fields", fields.as_str()),
                ("pageSize", "1000"),
            ])
            .send()
            .await?;
        let list: FileList = Self::check(response, "list").await?.json().await?;

        let mut objects: Vec<RemoteObject> = list.files.into_iter().map(Into::into).collect();
        objects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.name.cmp(&a.name)));
        debug!(folder_id, count = objects.len(), "listed remote backups");
        Ok(objects)
    }

    async fn delete(&self, session: &CloudSession, object_id: &str) -> CloudResult<()> {
        let token = session.bearer_token().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, object_id))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response, "delete").await?;
        Ok(())
    }

    async fn check_access(&self, session: &CloudSession) -> CloudResult<()> {
        let token = session.bearer_token().await?;
        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("pageSize", "1"), ("fields", "files(id)")])
            .send()
            .await?;
        Self::check(response, "connection test").await?;
        Ok(())
    }
}
