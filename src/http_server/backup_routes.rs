//! Backup HTTP Routes
//!
//! Thin adapter over [`BackupService`]. Every handler maps service errors
//! onto `{error, code}` bodies with the status from `status_code()`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::backup::{BackupArtifact, BackupError, RunOutcome};
use crate::policy::{BackupPolicy, PolicyUpdate};
use crate::service::BackupService;

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUrlResponse {
    pub auth_url: String,
}

#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub message: String,
    pub config: BackupPolicy,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub backups: Vec<BackupArtifact>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: status.as_u16(),
        }),
    )
}

impl From<BackupError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: BackupError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %err, "backup request failed");
        }
        error_response(status, err.to_string())
    }
}

// ==================
// Handlers
// ==================

async fn status_handler(State(service): State<Arc<BackupService>>) -> impl IntoResponse {
    Json(service.status())
}

async fn get_config_handler(State(service): State<Arc<BackupService>>) -> impl IntoResponse {
    Json(service.policy())
}

async fn update_config_handler(
    State(service): State<Arc<BackupService>>,
    Json(update): Json<PolicyUpdate>,
) -> Result<Json<PolicyResponse>, ApiError> {
    let config = service.update_policy(update).await?;
    Ok(Json(PolicyResponse {
        message: "Backup configuration updated".to_string(),
        config,
    }))
}

async fn cloud_auth_handler(
    State(service): State<Arc<BackupService>>,
) -> Result<Json<AuthUrlResponse>, ApiError> {
    let auth_url = service.consent_url()?;
    Ok(Json(AuthUrlResponse { auth_url }))
}

async fn cloud_callback_handler(
    State(service): State<Arc<BackupService>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(reason) = params.error {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("authorization denied: {}", reason),
        ));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "missing authorization code"))?;

    service.complete_consent(&code).await?;
    Ok(Json(MessageResponse {
        message: "Cloud storage authorized".to_string(),
    }))
}

async fn cloud_test_handler(State(service): State<Arc<BackupService>>) -> impl IntoResponse {
    Json(service.test_connection().await)
}

/// A run whose outcome is `failure` produced no artifact and answers 500
async fn create_handler(State(service): State<Arc<BackupService>>) -> Response {
    match service.trigger_backup().await {
        Ok(run) if run.outcome == RunOutcome::Failure => {
            let message = run.error.unwrap_or_else(|| "Backup failed".to_string());
            warn!(run_id = %run.id, error = %message, "backup run failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
        }
        Ok(run) => Json(run).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn list_handler(
    State(service): State<Arc<BackupService>>,
) -> Result<Json<ListResponse>, ApiError> {
    let backups = service.list_artifacts()?;
    Ok(Json(ListResponse {
        total: backups.len(),
        backups,
    }))
}

async fn download_handler(
    State(service): State<Arc<BackupService>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let download = service.read_artifact(&name).await?;

    let headers = [
        (header::CONTENT_TYPE, download.content_type.to_string()),
        (header::CONTENT_LENGTH, download.content_length.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download.file_name),
        ),
    ];
    let body = Body::from_stream(ReaderStream::new(download.file));
    Ok((headers, body).into_response())
}

async fn delete_handler(
    State(service): State<Arc<BackupService>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    service.delete_artifact(&name)?;
    Ok(Json(MessageResponse {
        message: format!("Backup {} deleted", name),
    }))
}

async fn stats_handler(
    State(service): State<Arc<BackupService>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(service.stats()?))
}

// ==================
// Router
// ==================

/// Routes mounted under `/backup`
pub fn backup_routes(service: Arc<BackupService>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/config", get(get_config_handler).put(update_config_handler))
        .route("/cloud/auth", get(cloud_auth_handler))
        .route("/cloud/callback", get(cloud_callback_handler))
        .route("/cloud/test", get(cloud_test_handler))
        .route("/create", post(create_handler))
        .route("/list", get(list_handler))
        .route("/download/:name", get(download_handler))
        .route("/delete/:name", delete(delete_handler))
        .route("/stats", get(stats_handler))
        .with_state(service)
}
