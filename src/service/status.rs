//! Status reporting types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backup::{BackupArtifact, BackupRun, RunOutcome};
use crate::scheduler::SchedulerState;

/// Summary of the most recent run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRunSummary {
    pub at: DateTime<Utc>,
    /// Unknown when reconstructed from an artifact after a restart
    pub outcome: Option<RunOutcome>,
    pub artifact: Option<String>,
    pub cloud_error: Option<String>,
    pub error: Option<String>,
    /// True when derived from the newest local artifact rather than a run
    pub reconstructed: bool,
}

impl LastRunSummary {
    pub fn from_run(run: &BackupRun) -> Self {
        Self {
            at: run.finished_at.unwrap_or(run.started_at),
            outcome: Some(run.outcome),
            artifact: run.produced_artifact.as_ref().map(|a| a.name.clone()),
            cloud_error: run.cloud_error.clone(),
            error: run.error.clone(),
            reconstructed: false,
        }
    }

    pub fn from_artifact(artifact: &BackupArtifact) -> Self {
        Self {
            at: artifact.created_at,
            outcome: None,
            artifact: Some(artifact.name.clone()),
            cloud_error: None,
            error: None,
            reconstructed: true,
        }
    }
}

/// Aggregated backup status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    pub enabled: bool,
    pub schedule_expression: String,
    pub cloud_configured: bool,
    pub cloud_connected: bool,
    /// `service_account` or `oauth_client`
    pub auth_kind: Option<String>,
    pub last_run: Option<LastRunSummary>,
    pub next_run: Option<DateTime<Utc>>,
    pub scheduler: SchedulerState,
}

/// Inventory statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub total_backups: usize,
    pub total_size: u64,
    pub average_size: u64,
    pub last_backup: Option<DateTime<Utc>>,
    pub next_backup: Option<DateTime<Utc>>,
    pub cloud_connected: bool,
    pub backup_enabled: bool,
}

impl BackupStats {
    /// Aggregate over `artifacts`, newest first
    pub fn from_artifacts(
        artifacts: &[BackupArtifact],
        next_backup: Option<DateTime<Utc>>,
        cloud_connected: bool,
        backup_enabled: bool,
    ) -> Self {
        let total_size: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
        let average_size = if artifacts.is_empty() {
            0
        } else {
            total_size / artifacts.len() as u64
        };

        Self {
            total_backups: artifacts.len(),
            total_size,
            average_size,
            last_backup: artifacts.iter().map(|a| a.created_at).max(),
            next_backup,
            cloud_connected,
            backup_enabled,
        }
    }
}

/// Result of a connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}
