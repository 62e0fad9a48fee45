//! CLI command implementations
//!
//! Each command loads the service config, builds its own runtime and
//! writes a single JSON object to stdout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::backup::{list_local, RunOutcome};
use crate::cloud::CloudCredential;
use crate::config::ServiceConfig;
use crate::http_server::HttpServer;
use crate::policy::BackupPolicy;
use crate::service::BackupService;

use super::args::{Command, SetupAction};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Credential file state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialReport {
    pub path: PathBuf,
    pub present: bool,
    /// `service_account` or `oauth_client`
    pub kind: Option<String>,
    pub project_id: Option<String>,
    pub client_email: Option<String>,
    /// Consent token saved from a previous authorization
    pub token_present: bool,
    pub error: Option<String>,
}

/// Policy file state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub path: PathBuf,
    pub present: bool,
    pub policy: Option<BackupPolicy>,
    pub error: Option<String>,
}

/// Backup directory state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDirReport {
    pub path: PathBuf,
    pub present: bool,
    pub artifact_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub credentials: CredentialReport,
    pub policy: PolicyReport,
    pub backups: BackupDirReport,
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config } => serve(&config),
        Command::Backup { config } => backup(&config),
        Command::Status { config } => status(&config),
        Command::Setup { action } => match action {
            SetupAction::Check { config } => setup_check(&config),
            SetupAction::Template { config } => setup_template(&config),
        },
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Boot(format!("Failed to create tokio runtime: {}", e)))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, stopping"),
    }
}

/// Start the scheduler and the HTTP API until Ctrl-C
pub fn serve(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load_or_default(config_path)?;
    let http_config = config.http.clone();

    runtime()?.block_on(async move {
        let service = Arc::new(BackupService::new(config));
        service.initialize()?;

        let server = HttpServer::new(http_config, Arc::clone(&service));
        let served = server
            .start(shutdown_signal())
            .await
            .map_err(|e| CliError::Boot(format!("HTTP server failed: {}", e)));

        service.dispose();
        served
    })
}

/// Run one manual backup and print the run record
pub fn backup(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load_or_default(config_path)?;

    let run = runtime()?.block_on(async move {
        let service = BackupService::new(config);
        service.initialize()?;
        let run = service.trigger_backup().await;
        service.dispose();
        run
    })?;

    write_response(&run)?;

    if run.outcome == RunOutcome::Failure {
        return Err(CliError::RunFailed(
            run.error.unwrap_or_else(|| "no artifact produced".to_string()),
        ));
    }
    Ok(())
}

/// Print the aggregate status
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load_or_default(config_path)?;

    let status = runtime()?.block_on(async move {
        let service = BackupService::new(config);
        service.initialize()?;
        let status = service.status();
        service.dispose();
        Ok::<_, CliError>(status)
    })?;

    write_response(&status)
}

/// Report what is configured without changing anything on disk
pub fn setup_check(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load_or_default(config_path)?;
    write_response(&setup_report(&config))
}

/// Write a credential template unless a credential file already exists
pub fn setup_template(config_path: &Path) -> CliResult<()> {
    let config = ServiceConfig::load_or_default(config_path)?;
    let written = write_template(&config.credentials_file)?;

    let message = if written {
        "Credential template written; replace the placeholders with a real key"
    } else {
        "Credential file already exists; left unchanged"
    };
    write_response(&serde_json::json!({
        "path": config.credentials_file,
        "written": written,
        "message": message,
    }))
}

/// Write the template to `path`. Returns false when a file is already there.
pub fn write_template(path: &Path) -> CliResult<bool> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(&CloudCredential::template())?;
    fs::write(path, json)?;
    info!(path = %path.display(), "credential template written");
    Ok(true)
}

pub fn setup_report(config: &ServiceConfig) -> SetupReport {
    SetupReport {
        credentials: credential_report(config),
        policy: policy_report(&config.policy_file),
        backups: backup_dir_report(&config.backup_dir, &config.artifact_prefix),
    }
}

fn credential_report(config: &ServiceConfig) -> CredentialReport {
    let mut report = CredentialReport {
        path: config.credentials_file.clone(),
        present: config.credentials_file.exists(),
        kind: None,
        project_id: None,
        client_email: None,
        token_present: false,
        error: None,
    };
    if !report.present {
        return report;
    }

    match CloudCredential::load(&config.credentials_file, &config.token_file) {
        Ok(credential) => {
            report.kind = Some(credential.kind().to_string());
            match credential {
                CloudCredential::ServiceIdentity(key) => {
                    report.project_id = key.project_id;
                    report.client_email = Some(key.client_email);
                }
                CloudCredential::UserConsent { token, .. } => {
                    report.token_present = token.is_some();
                }
            }
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

fn policy_report(path: &Path) -> PolicyReport {
    let mut report = PolicyReport {
        path: path.to_path_buf(),
        present: path.exists(),
        policy: None,
        error: None,
    };
    if !report.present {
        return report;
    }

    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| {
            serde_json::from_str::<BackupPolicy>(&content).map_err(|e| e.to_string())
        });
    match parsed {
        Ok(policy) => report.policy = Some(policy),
        Err(e) => report.error = Some(e),
    }
    report
}

fn backup_dir_report(path: &Path, prefix: &str) -> BackupDirReport {
    let present = path.is_dir();
    let artifact_count = if present {
        list_local(path, prefix).map(|a| a.len()).unwrap_or(0)
    } else {
        0
    };

    BackupDirReport {
        path: path.to_path_buf(),
        present,
        artifact_count,
    }
}
