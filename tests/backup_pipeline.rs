//! Backup pipeline tests
//!
//! End-to-end runs through the service: local retention, the cloud leg's
//! asymmetric failure handling and remote pruning.

mod common;

use common::{enabled_policy, InMemoryRemote, TestEnv};
use dbvault::backup::{BackupError, RunOutcome, METADATA_FILE, STAGING_DIR};
use dbvault::policy::{BackupPolicy, PolicyUpdate};
use tokio::io::AsyncReadExt;

// =============================================================================
// Local retention
// =============================================================================

/// Three runs with keepLocalCopies = 2 leave the two newest artifacts.
#[tokio::test]
async fn test_local_retention_keeps_newest() {
    let env = TestEnv::new().with_policy(&enabled_policy(2, 10));
    let service = env.service(InMemoryRemote::new());

    let mut produced = Vec::new();
    for _ in 0..3 {
        let run = service.trigger_backup().await.unwrap();
        assert_eq!(run.outcome, RunOutcome::Success);
        assert!(!run.cloud_attempted);
        produced.push(run.produced_artifact.unwrap().name);
    }

    let names: Vec<String> = service
        .list_artifacts()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();

    assert_eq!(names, vec![produced[2].clone(), produced[1].clone()]);
    service.dispose();
}

/// Retention only ever touches artifacts carrying the configured prefix.
#[tokio::test]
async fn test_local_retention_spares_foreign_entries() {
    let env = TestEnv::new().with_policy(&enabled_policy(1, 10));
    let photos = env.config.backup_dir.join("photos");
    std::fs::create_dir_all(&photos).unwrap();
    std::fs::write(photos.join("family.jpg"), b"jpeg").unwrap();
    std::fs::write(env.config.backup_dir.join("notes.tar.gz"), b"x").unwrap();
    let service = env.service(InMemoryRemote::new());

    service.trigger_backup().await.unwrap();
    let run = service.trigger_backup().await.unwrap();

    let report = run.local_retention.unwrap();
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(report.remaining, 1);
    assert!(photos.join("family.jpg").exists());
    assert!(env.config.backup_dir.join("notes.tar.gz").exists());
    assert_eq!(service.list_artifacts().unwrap().len(), 1);
    assert_eq!(service.stats().unwrap().total_backups, 1);
    service.dispose();
}

#[tokio::test]
async fn test_missing_data_file_fails_run() {
    let env = TestEnv::new();
    std::fs::remove_file(&env.config.data_file).unwrap();
    let service = env.service(InMemoryRemote::new());

    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Failure);
    assert!(run.produced_artifact.is_none());
    assert!(run.error.is_some());
    assert!(service.list_artifacts().unwrap().is_empty());
}

#[tokio::test]
async fn test_uncompressed_artifact_is_a_directory() {
    let env = TestEnv::new();
    let service = env.service(InMemoryRemote::new());
    service
        .update_policy(PolicyUpdate {
            compress_backups: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    let run = service.trigger_backup().await.unwrap();
    let artifact = run.produced_artifact.unwrap();

    assert!(artifact.is_directory());
    assert!(artifact.path().join(METADATA_FILE).exists());
    assert!(artifact.path().join("inventory.db").exists());

    let download = service.read_artifact(&artifact.name).await.unwrap();
    assert_eq!(download.content_type, "application/x-tar");
    assert!(download.file_name.ends_with(".tar"));
    assert!(download.content_length > 0);

    // The packed copy is already unlinked from staging
    let staging = env.config.backup_dir.join(STAGING_DIR);
    assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
}

// =============================================================================
// Cloud leg
// =============================================================================

/// A failed upload keeps the local artifact and degrades the run only to
/// partial failure.
#[tokio::test]
async fn test_upload_failure_is_partial() {
    let env = TestEnv::new()
        .with_service_account()
        .with_policy(&enabled_policy(5, 10));
    let remote = InMemoryRemote::new();
    remote.fail_uploads(true);
    let service = env.service(remote.clone());

    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::PartialFailure);
    assert!(run.cloud_attempted);
    assert!(run.cloud_error.is_some());
    let artifact = run.produced_artifact.unwrap();
    assert!(artifact.path().exists());

    let listed = service.list_artifacts().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, artifact.name);

    let mut download = service.read_artifact(&artifact.name).await.unwrap();
    assert_eq!(download.content_type, "application/gzip");
    let mut bytes = Vec::new();
    download.file.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes.len() as u64, download.content_length);

    assert!(!service.status().cloud_connected);
    assert_eq!(remote.upload_count(), 0);
}

#[tokio::test]
async fn test_successful_upload() {
    let env = TestEnv::new()
        .with_service_account()
        .with_policy(&enabled_policy(5, 10));
    let remote = InMemoryRemote::new();
    let service = env.service(remote.clone());

    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Success);
    let uploaded = run.cloud_artifact.unwrap();
    assert_eq!(uploaded.name, run.produced_artifact.unwrap().name);
    assert_eq!(remote.names_in("Inventory_Backups"), vec![uploaded.name]);
    assert!(service.status().cloud_connected);
}

/// Cloud leg is skipped when scheduling is disabled, even with credentials.
#[tokio::test]
async fn test_disabled_policy_stays_local() {
    let env = TestEnv::new().with_service_account();
    let remote = InMemoryRemote::new();
    let service = env.service(remote.clone());

    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Success);
    assert!(!run.cloud_attempted);
    assert_eq!(remote.upload_count(), 0);
}

/// A stored policy with zero retention is not trusted: the defaults apply
/// and a fresh upload is never pruned away.
#[tokio::test]
async fn test_zero_retention_policy_replaced_by_defaults() {
    let env = TestEnv::new()
        .with_service_account()
        .with_policy(&enabled_policy(5, 0));
    let remote = InMemoryRemote::new();
    let service = env.service(remote.clone());

    assert_eq!(service.policy(), BackupPolicy::with_defaults());

    service
        .update_policy(PolicyUpdate {
            enabled: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Success);
    let uploaded = run.cloud_artifact.unwrap();
    assert_eq!(remote.names_in("Inventory_Backups"), vec![uploaded.name]);
    assert_eq!(remote.delete_count(), 0);
    service.dispose();
}

/// Twelve remote objects plus one upload are pruned to the ten newest.
#[tokio::test]
async fn test_remote_retention() {
    let env = TestEnv::new()
        .with_service_account()
        .with_policy(&enabled_policy(5, 10));
    let remote = InMemoryRemote::new();
    remote.seed("Inventory_Backups", 12);
    let service = env.service(remote.clone());

    let run = service.trigger_backup().await.unwrap();

    assert_eq!(run.outcome, RunOutcome::Success);
    let report = run.remote_retention.unwrap();
    assert_eq!(report.deleted, vec!["seed_00.tar.gz", "seed_01.tar.gz", "seed_02.tar.gz"]);
    assert_eq!(report.remaining, 10);
    assert_eq!(remote.delete_count(), 3);

    let names = remote.names_in("Inventory_Backups");
    assert_eq!(names.len(), 10);
    assert_eq!(names[0], run.produced_artifact.unwrap().name);
    assert_eq!(names[9], "seed_03.tar.gz");
}

// =============================================================================
// Inventory
// =============================================================================

#[tokio::test]
async fn test_delete_and_stats() {
    let env = TestEnv::new();
    let service = env.service(InMemoryRemote::new());

    let first = service.trigger_backup().await.unwrap().produced_artifact.unwrap();
    service.trigger_backup().await.unwrap();

    let stats = service.stats().unwrap();
    assert_eq!(stats.total_backups, 2);
    assert_eq!(stats.average_size, stats.total_size / 2);
    assert!(!stats.backup_enabled);

    service.delete_artifact(&first.name).unwrap();
    assert_eq!(service.stats().unwrap().total_backups, 1);

    assert!(matches!(
        service.delete_artifact(&first.name),
        Err(BackupError::NotFound(_))
    ));
    assert!(matches!(
        service.read_artifact("../backupConfig.json").await,
        Err(BackupError::InvalidName(_))
    ));
}

#[tokio::test]
async fn test_status_reconstructed_after_restart() {
    let env = TestEnv::new();
    let first = env.service(InMemoryRemote::new());
    let artifact = first.trigger_backup().await.unwrap().produced_artifact.unwrap();
    first.dispose();

    let restarted = env.service(InMemoryRemote::new());
    let last = restarted.status().last_run.unwrap();

    assert!(last.reconstructed);
    assert_eq!(last.artifact, Some(artifact.name));
}
