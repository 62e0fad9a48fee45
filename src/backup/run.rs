//! Run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::BackupArtifact;
use super::errors::BackupError;
use super::retention::RetentionReport;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl std::fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunTrigger::Scheduled => write!(f, "scheduled"),
            RunTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Local artifact produced and, if attempted, uploaded
    Success,
    /// Local artifact produced but the cloud leg failed
    PartialFailure,
    /// No artifact produced
    Failure,
}

/// One execution of the pipeline. Held in memory only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRun {
    pub id: Uuid,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    pub produced_artifact: Option<BackupArtifact>,
    pub cloud_artifact: Option<BackupArtifact>,
    pub cloud_attempted: bool,
    pub cloud_error: Option<String>,
    /// Set when compression failed and the uncompressed snapshot was kept
    pub compression_error: Option<String>,
    pub local_retention: Option<RetentionReport>,
    pub remote_retention: Option<RetentionReport>,
    /// Prune passes that could not run at all
    pub retention_errors: Vec<String>,
    /// Fatal stage error
    pub error: Option<String>,
}

impl BackupRun {
    pub fn start(trigger: RunTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            outcome: RunOutcome::Failure,
            produced_artifact: None,
            cloud_artifact: None,
            cloud_attempted: false,
            cloud_error: None,
            compression_error: None,
            local_retention: None,
            remote_retention: None,
            retention_errors: Vec::new(),
            error: None,
        }
    }

    /// Record a fatal error and close the run
    pub fn abort(mut self, err: &BackupError) -> Self {
        self.error = Some(err.to_string());
        self.finish()
    }

    /// Close the run and derive its outcome
    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self.outcome = if self.error.is_some() || self.produced_artifact.is_none() {
            RunOutcome::Failure
        } else if self.cloud_error.is_some() {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Success
        };
        self
    }

    /// Whether the cloud leg ran and failed
    pub fn cloud_failed(&self) -> bool {
        self.cloud_attempted && self.cloud_error.is_some()
    }
}
