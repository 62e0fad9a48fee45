//! # Backup Scheduler
//!
//! A small state machine around one [`Timer`]:
//!
//! ```text
//! Disabled --apply_policy(enabled)--> Scheduled --timer fires--> Running
//!    ^                                  |  ^                        |
//!    +------apply_policy(disabled)------+  +-------- re-arm --------+
//! ```
//!
//! Scheduled and manual runs share one in-progress flag. A manual trigger
//! while a run is in progress is rejected with [`BackupError::AlreadyRunning`];
//! a timer tick while a run is in progress is skipped and the timer re-armed.

mod schedule;
mod timer;

pub use schedule::{CronSchedule, ScheduleError};
pub use timer::Timer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backup::{BackupError, BackupResult, BackupRun, RunTrigger};
use crate::policy::{BackupPolicy, ConfigError, PolicyResult};

/// One execution of the backup pipeline
#[async_trait]
pub trait BackupJob: Send + Sync {
    async fn execute(&self, policy: &BackupPolicy, trigger: RunTrigger) -> BackupRun;
}

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SchedulerState {
    Disabled,
    #[serde(rename_all = "camelCase")]
    Scheduled {
        next_run: DateTime<Utc>,
    },
    Running,
}

/// Clears the in-progress flag when dropped
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Next fire time for `schedule`, evaluated in the host's local time
fn next_fire(schedule: &CronSchedule) -> Option<DateTime<Utc>> {
    schedule
        .next_after(&Local::now())
        .map(|at| at.with_timezone(&Utc))
}

pub struct Scheduler {
    job: Arc<dyn BackupJob>,
    policy: RwLock<BackupPolicy>,
    timer: Mutex<Timer>,
    running: AtomicBool,
    last_run: RwLock<Option<BackupRun>>,
    this: Weak<Scheduler>,
}

impl Scheduler {
    /// Create a scheduler in the `Disabled` state
    pub fn new(job: Arc<dyn BackupJob>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            job,
            policy: RwLock::new(BackupPolicy::with_defaults()),
            timer: Mutex::new(Timer::new()),
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
            this: this.clone(),
        })
    }

    fn lock_timer(&self) -> MutexGuard<'_, Timer> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The policy runs are currently executed with
    pub fn policy(&self) -> BackupPolicy {
        self.policy
            .read()
            .map(|p| p.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Replace the effective policy and re-arm.
    ///
    /// The existing timer is always cancelled first; a new one is armed only
    /// when the policy is enabled. An invalid policy leaves the previous
    /// policy and timer untouched.
    pub fn apply_policy(&self, policy: BackupPolicy) -> PolicyResult<()> {
        policy.validate()?;
        let schedule = CronSchedule::parse(&policy.schedule)
            .map_err(|e| ConfigError::Invalid(format!("schedule: {}", e)))?;

        let mut timer = self.lock_timer();
        timer.cancel();

        let enabled = policy.enabled;
        match self.policy.write() {
            Ok(mut current) => *current = policy,
            Err(e) => *e.into_inner() = policy,
        }

        if !enabled {
            info!("scheduled backups disabled");
            return Ok(());
        }

        let next_run = self.arm(&mut timer, &schedule)?;
        info!(schedule = %schedule.expression(), %next_run, "scheduled backups enabled");
        Ok(())
    }

    fn arm(&self, timer: &mut Timer, schedule: &CronSchedule) -> PolicyResult<DateTime<Utc>> {
        let at = next_fire(schedule).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "schedule '{}' has no upcoming occurrence",
                schedule.expression()
            ))
        })?;

        let this = self.this.clone();
        timer.arm(at, move |generation| async move {
            if let Some(scheduler) = this.upgrade() {
                scheduler.fire(generation).await;
            }
        });
        Ok(at)
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        let current = self.lock_timer().release(generation);
        if !current {
            debug!(generation, "stale timer fire ignored");
            return;
        }

        info!("scheduled backup triggered");
        if self.run_once(RunTrigger::Scheduled).await.is_none() {
            warn!("backup already running, skipping scheduled run");
        }

        self.rearm_after(generation);
    }

    /// Arm the next occurrence unless the policy changed while running
    fn rearm_after(&self, generation: u64) {
        let mut timer = self.lock_timer();
        if timer.generation() != generation || timer.is_armed() {
            return;
        }

        let policy = self.policy();
        if !policy.enabled {
            return;
        }

        let armed = CronSchedule::parse(&policy.schedule)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
            .and_then(|schedule| self.arm(&mut timer, &schedule));
        match armed {
            Ok(next_run) => debug!(%next_run, "timer re-armed"),
            Err(e) => warn!(error = %e, "could not re-arm backup timer"),
        }
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Run the pipeline once unless a run is already in progress
    async fn run_once(&self, trigger: RunTrigger) -> Option<BackupRun> {
        let _guard = self.try_begin()?;

        // The run uses the policy as it was when it started
        let policy = self.policy();
        let run = self.job.execute(&policy, trigger).await;

        match self.last_run.write() {
            Ok(mut last) => *last = Some(run.clone()),
            Err(e) => *e.into_inner() = Some(run.clone()),
        }
        Some(run)
    }

    /// Run a backup now, outside the schedule
    pub async fn trigger_manual(&self) -> BackupResult<BackupRun> {
        self.run_once(RunTrigger::Manual)
            .await
            .ok_or(BackupError::AlreadyRunning)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recent completed run since startup
    pub fn last_run(&self) -> Option<BackupRun> {
        self.last_run
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Next scheduled fire time, or `None` when disabled
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        if let Some(at) = self.lock_timer().next_fire() {
            return Some(at);
        }

        // A scheduled run in progress has released its timer
        let policy = self.policy();
        if !policy.enabled {
            return None;
        }
        CronSchedule::parse(&policy.schedule)
            .ok()
            .and_then(|s| next_fire(&s))
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            return SchedulerState::Running;
        }
        match self.lock_timer().next_fire() {
            Some(next_run) => SchedulerState::Scheduled { next_run },
            None => SchedulerState::Disabled,
        }
    }

    /// Whether a timer is currently armed
    pub fn is_armed(&self) -> bool {
        self.lock_timer().is_armed()
    }

    /// Cancel the timer. In-flight runs finish on their own.
    pub fn shutdown(&self) {
        if self.lock_timer().cancel() {
            info!("backup scheduler stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl BackupJob for CountingJob {
        async fn execute(&self, _policy: &BackupPolicy, trigger: RunTrigger) -> BackupRun {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            BackupRun::start(trigger).finish()
        }
    }

    fn gated() -> (Arc<CountingJob>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        (job, gate)
    }

    fn armed_generation(scheduler: &Scheduler) -> u64 {
        scheduler.lock_timer().generation()
    }

    async fn wait_until_running(scheduler: &Scheduler) {
        while !scheduler.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn enabled(schedule: &str) -> BackupPolicy {
        BackupPolicy {
            enabled: true,
            schedule: schedule.to_string(),
            ..BackupPolicy::with_defaults()
        }
    }

    #[tokio::test]
    async fn test_starts_disabled() {
        let scheduler = Scheduler::new(Arc::new(CountingJob::default()));

        assert_eq!(scheduler.state(), SchedulerState::Disabled);
        assert!(scheduler.next_run().is_none());
    }

    #[tokio::test]
    async fn test_enable_arms_one_timer() {
        let scheduler = Scheduler::new(Arc::new(CountingJob::default()));

        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();

        assert!(scheduler.is_armed());
        assert!(matches!(scheduler.state(), SchedulerState::Scheduled { .. }));

        scheduler.apply_policy(BackupPolicy::with_defaults()).unwrap();
        assert!(!scheduler.is_armed());
        assert_eq!(scheduler.state(), SchedulerState::Disabled);
    }

    #[tokio::test]
    async fn test_invalid_schedule_keeps_previous_timer() {
        let scheduler = Scheduler::new(Arc::new(CountingJob::default()));
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let before = scheduler.next_run();

        let result = scheduler.apply_policy(enabled("not a cron"));

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(scheduler.next_run(), before);
        assert_eq!(scheduler.policy().schedule, "0 2 * * *");
    }

    #[tokio::test]
    async fn test_manual_trigger_records_last_run() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::new(job.clone());

        let run = scheduler.trigger_manual().await.unwrap();

        assert_eq!(run.trigger, RunTrigger::Manual);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.last_run().map(|r| r.id), Some(run.id));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_manual_trigger_rejected_while_running() {
        let gate = Arc::new(Notify::new());
        let job = Arc::new(CountingJob {
            runs: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });
        let scheduler = Scheduler::new(job.clone());

        let background = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger_manual().await })
        };
        while !scheduler.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(matches!(
            scheduler.trigger_manual().await,
            Err(BackupError::AlreadyRunning)
        ));

        gate.notify_one();
        assert!(background.await.unwrap().is_ok());
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retention_policy_rejected() {
        let scheduler = Scheduler::new(Arc::new(CountingJob::default()));
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();

        let result = scheduler.apply_policy(BackupPolicy {
            keep_cloud_copies: 0,
            ..enabled("0 3 * * *")
        });

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(scheduler.policy(), enabled("0 2 * * *"));
        assert!(scheduler.is_armed());
    }

    // =========================================================================
    // Timer fires
    // =========================================================================

    #[tokio::test]
    async fn test_fire_runs_and_rearms() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::new(job.clone());
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let expected = scheduler.next_run();
        let generation = armed_generation(&scheduler);

        scheduler.clone().fire(generation).await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            scheduler.last_run().map(|r| r.trigger),
            Some(RunTrigger::Scheduled)
        );
        assert!(scheduler.is_armed());
        assert_ne!(armed_generation(&scheduler), generation);
        assert_eq!(scheduler.next_run(), expected);
        assert!(matches!(scheduler.state(), SchedulerState::Scheduled { .. }));
    }

    #[tokio::test]
    async fn test_stale_fire_ignored() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::new(job.clone());
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let stale = armed_generation(&scheduler);
        scheduler.apply_policy(enabled("30 4 * * *")).unwrap();

        scheduler.clone().fire(stale).await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_armed());
        assert!(scheduler.last_run().is_none());
    }

    /// A tick that lands during a manual run is skipped and the timer re-armed.
    #[tokio::test]
    async fn test_fire_during_manual_run_is_skipped() {
        let (job, gate) = gated();
        let scheduler = Scheduler::new(job.clone());
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let generation = armed_generation(&scheduler);

        let manual = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger_manual().await })
        };
        wait_until_running(&scheduler).await;

        scheduler.clone().fire(generation).await;

        assert!(scheduler.is_armed());
        assert!(scheduler.next_run().is_some());
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        gate.notify_one();
        let run = manual.await.unwrap().unwrap();
        assert_eq!(run.trigger, RunTrigger::Manual);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_armed());
    }

    /// Disabling while a scheduled run is in flight leaves nothing armed.
    #[tokio::test]
    async fn test_disable_during_scheduled_run_suppresses_rearm() {
        let (job, gate) = gated();
        let scheduler = Scheduler::new(job.clone());
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let generation = armed_generation(&scheduler);

        let firing = tokio::spawn(scheduler.clone().fire(generation));
        wait_until_running(&scheduler).await;
        assert!(!scheduler.is_armed());

        scheduler.apply_policy(BackupPolicy::with_defaults()).unwrap();
        gate.notify_one();
        firing.await.unwrap();

        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
        assert!(scheduler.next_run().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Disabled);
    }

    /// A schedule change while a scheduled run is in flight keeps the new
    /// timer instead of re-arming the old schedule.
    #[tokio::test]
    async fn test_reschedule_during_scheduled_run_keeps_new_timer() {
        let (job, gate) = gated();
        let scheduler = Scheduler::new(job.clone());
        scheduler.apply_policy(enabled("0 2 * * *")).unwrap();
        let generation = armed_generation(&scheduler);

        let firing = tokio::spawn(scheduler.clone().fire(generation));
        wait_until_running(&scheduler).await;

        scheduler.apply_policy(enabled("30 4 * * *")).unwrap();
        let rescheduled = armed_generation(&scheduler);
        let expected = scheduler.next_run();
        gate.notify_one();
        firing.await.unwrap();

        assert!(scheduler.is_armed());
        assert_eq!(armed_generation(&scheduler), rescheduled);
        assert_eq!(scheduler.next_run(), expected);
    }
}
