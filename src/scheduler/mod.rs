//! Periodic background jobs.
//!
//! Jobs are async closures registered under a name with an interval. A timer
//! task wakes every poll interval and runs due jobs one at a time; jobs can
//! also be run by hand.

pub mod jobs;

pub use jobs::{register_default_jobs, JobContext};

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

/// Longest interval a job may be scheduled with.
pub const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// How long `stop` waits for the timer task to finish.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub type JobFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Body of a job. Called once per run.
pub type JobTask = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NeverRun,
    Running,
    Success,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverRun => "never_run",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Interval and switch for one default job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    pub enabled: bool,
    pub interval_hours: f64,
}

impl JobSchedule {
    fn every(interval_hours: f64) -> Self {
        Self {
            enabled: true,
            interval_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between checks for due jobs.
    pub poll_interval_secs: u64,
    /// Offers not refreshed for this many days are purged by cache cleanup.
    pub stale_offer_days: i64,
    pub api_refresh: JobSchedule,
    pub ota_scraping: JobSchedule,
    pub partner_sync: JobSchedule,
    pub cache_cleanup: JobSchedule,
    pub history_snapshot: JobSchedule,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            stale_offer_days: 7,
            api_refresh: JobSchedule::every(2.0),
            ota_scraping: JobSchedule::every(6.0),
            partner_sync: JobSchedule::every(1.0),
            cache_cleanup: JobSchedule::every(4.0),
            history_snapshot: JobSchedule::every(4.0),
        }
    }
}

struct Job {
    task: JobTask,
    interval_hours: f64,
    enabled: bool,
    last_run: Option<DateTime<Utc>>,
    next_run: DateTime<Utc>,
    last_status: JobStatus,
    last_error: Option<String>,
    last_duration_ms: Option<u64>,
    last_result: Option<Value>,
    run_count: u64,
    fail_count: u64,
}

impl Job {
    fn interval(&self) -> chrono::Duration {
        interval_duration(self.interval_hours)
    }

    fn info(&self, name: &str, running: bool) -> JobInfo {
        JobInfo {
            name: name.to_string(),
            enabled: self.enabled,
            interval_hours: self.interval_hours,
            last_run: self.last_run,
            next_run: self.next_run,
            last_status: if running {
                JobStatus::Running
            } else {
                self.last_status
            },
            last_error: self.last_error.clone(),
            last_duration_ms: self.last_duration_ms,
            last_result: self.last_result.clone(),
            run_count: self.run_count,
            fail_count: self.fail_count,
        }
    }
}

fn interval_duration(hours: f64) -> chrono::Duration {
    let hours = if hours.is_finite() {
        hours.clamp(0.0, MAX_INTERVAL_HOURS)
    } else {
        0.0
    };
    chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub enabled: bool,
    pub interval_hours: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub last_status: JobStatus,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<Value>,
    pub run_count: u64,
    pub fail_count: u64,
}

/// Outcome of one job execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub name: String,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobRun {
    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: JobStatus::Skipped,
            duration_ms: 0,
            result: None,
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub host: String,
    pub started_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub total_failures: u64,
    pub jobs_count: usize,
    pub enabled_jobs: usize,
}

/// Marks a job as running until dropped. Dropping it early, because the
/// caller was cancelled or the timer task aborted, also aborts the job body.
struct RunningGuard<'a> {
    running: &'a StdMutex<HashSet<String>>,
    name: String,
    body: Option<AbortHandle>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Some(body) = &self.body {
            body.abort();
        }
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Job table shared between the scheduler handle and its timer task.
#[derive(Default)]
struct JobTable {
    jobs: Mutex<BTreeMap<String, Job>>,
    running: StdMutex<HashSet<String>>,
}

impl JobTable {
    fn is_running(&self, name: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Claim the running slot for a job, or `None` if it is taken.
    fn claim(&self, name: &str) -> Option<RunningGuard<'_>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(name.to_string()) {
            return None;
        }
        Some(RunningGuard {
            running: &self.running,
            name: name.to_string(),
            body: None,
        })
    }

    async fn info(&self, name: &str) -> Option<JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.get(name).map(|job| job.info(name, self.is_running(name)))
    }

    async fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .map(|(name, job)| job.info(name, self.is_running(name)))
            .collect()
    }

    async fn run_job(&self, name: &str) -> Result<JobRun, JobError> {
        let (task, mut guard) = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(name)
                .ok_or_else(|| JobError::NotFound(name.to_string()))?;
            if !job.enabled {
                job.last_status = JobStatus::Skipped;
                return Ok(JobRun::skipped(name, "job disabled"));
            }
            let Some(guard) = self.claim(name) else {
                return Ok(JobRun::skipped(name, "job already running"));
            };
            (job.task.clone(), guard)
        };

        info!("Running job {}", name);
        let started_at = Utc::now();
        let started = std::time::Instant::now();
        // Run on its own task so a panicking job is reported as a failure.
        let handle = tokio::spawn(task());
        guard.body = Some(handle.abort_handle());
        let outcome = match handle.await {
            Ok(result) => result.map_err(|e| format!("{:#}", e)),
            Err(e) => Err(format!("job task failed: {}", e)),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;
        job.last_run = Some(started_at);
        job.last_duration_ms = Some(duration_ms);
        job.run_count += 1;
        job.next_run = Utc::now() + job.interval();

        let run = match outcome {
            Ok(result) => {
                info!("Job {} finished in {}ms", name, duration_ms);
                job.last_status = JobStatus::Success;
                job.last_error = None;
                job.last_result = Some(result.clone());
                JobRun {
                    name: name.to_string(),
                    status: JobStatus::Success,
                    duration_ms,
                    result: Some(result),
                    error: None,
                }
            }
            Err(message) => {
                error!("Job {} failed: {}", name, message);
                job.last_status = JobStatus::Failed;
                job.last_error = Some(message.clone());
                job.fail_count += 1;
                JobRun {
                    name: name.to_string(),
                    status: JobStatus::Failed,
                    duration_ms,
                    result: None,
                    error: Some(message),
                }
            }
        };
        Ok(run)
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<String> {
        self.jobs
            .lock()
            .await
            .iter()
            .filter(|(name, job)| job.enabled && job.next_run <= now && !self.is_running(name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn run_pending_at(&self, now: DateTime<Utc>) -> Vec<JobRun> {
        let mut runs = Vec::new();
        for name in self.due_jobs(now).await {
            match self.run_job(&name).await {
                Ok(run) => runs.push(run),
                Err(e) => warn!("{}", e),
            }
        }
        runs
    }
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Interval-based job scheduler.
pub struct Scheduler {
    table: Arc<JobTable>,
    poll_interval: Duration,
    runner: Mutex<Option<Runner>>,
    last_started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            table: Arc::new(JobTable::default()),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            runner: Mutex::new(None),
            last_started_at: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(Duration::from_secs(config.poll_interval_secs))
    }

    /// Register (or replace) a job. The first run is due one interval from now.
    pub async fn register_job<F>(&self, name: &str, task: F, interval_hours: f64, enabled: bool)
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        let job = Job {
            task: Arc::new(task),
            interval_hours,
            enabled,
            last_run: None,
            next_run: Utc::now() + interval_duration(interval_hours),
            last_status: JobStatus::NeverRun,
            last_error: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            fail_count: 0,
        };
        self.table.jobs.lock().await.insert(name.to_string(), job);
        info!("Registered job {} (every {}h)", name, interval_hours);
    }

    /// Run a job now, whatever its schedule.
    pub async fn run_job(&self, name: &str) -> Result<JobRun, JobError> {
        self.table.run_job(name).await
    }

    /// Run every enabled job that is due.
    pub async fn run_pending(&self) -> Vec<JobRun> {
        self.run_pending_at(Utc::now()).await
    }

    /// Run every enabled job due at `now`.
    pub async fn run_pending_at(&self, now: DateTime<Utc>) -> Vec<JobRun> {
        self.table.run_pending_at(now).await
    }

    /// Start the timer task. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("Scheduler already running");
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let table = self.table.clone();
        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            info!("Scheduler started, polling every {:?}", poll_interval);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        let runs = table.run_pending_at(Utc::now()).await;
                        if !runs.is_empty() {
                            debug!("Ran {} scheduled jobs", runs.len());
                        }
                    }
                }
            }
            info!("Scheduler stopped");
        });

        let started_at = Utc::now();
        *self.last_started_at.lock().await = Some(started_at);
        *runner = Some(Runner {
            shutdown,
            handle,
            started_at,
        });
        true
    }

    /// Signal the timer task and wait briefly for it to finish. A job still
    /// in progress past the timeout is aborted and keeps its previous status.
    pub async fn stop(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown.send(true);
        let mut handle = runner.handle;
        if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
            warn!("Scheduler did not stop within {:?}, aborting", STOP_TIMEOUT);
            handle.abort();
            // Wait for the abort so the interrupted job is released.
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn enable_job(&self, name: &str) -> bool {
        self.set_enabled(name, true).await
    }

    pub async fn disable_job(&self, name: &str) -> bool {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.table.jobs.lock().await.get_mut(name) {
            Some(job) => {
                job.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.table.list().await
    }

    pub async fn job(&self, name: &str) -> Option<JobInfo> {
        self.table.info(name).await
    }

    pub async fn stats(&self) -> SchedulerStats {
        let is_running = self.is_running().await;
        let started_at = match self.runner.lock().await.as_ref() {
            Some(runner) => Some(runner.started_at),
            None => *self.last_started_at.lock().await,
        };
        let jobs = self.table.jobs.lock().await;
        SchedulerStats {
            is_running,
            host: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string()),
            started_at,
            total_runs: jobs.values().map(|j| j.run_count).sum(),
            total_failures: jobs.values().map(|j| j.fail_count).sum(),
            jobs_count: jobs.len(),
            enabled_jobs: jobs.values().filter(|j| j.enabled).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn() -> JobFuture + Send + Sync + 'static {
        move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(serde_json::json!({ "runs": n }))
            }
            .boxed()
        }
    }

    fn failing() -> JobFuture {
        async { Err(anyhow::anyhow!("upstream unavailable")) }.boxed()
    }

    #[tokio::test]
    async fn test_register_schedules_first_run() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let before = Utc::now();
        scheduler
            .register_job("api_refresh", counting(Arc::default()), 2.0, true)
            .await;

        let job = scheduler.job("api_refresh").await.unwrap();
        assert_eq!(job.last_status, JobStatus::NeverRun);
        assert!(job.next_run >= before + chrono::Duration::hours(2));
        assert!(job.next_run <= Utc::now() + chrono::Duration::hours(2));
    }

    #[tokio::test]
    async fn test_run_job_records_success() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job("cache_cleanup", counting(counter.clone()), 4.0, true)
            .await;

        let run = scheduler.run_job("cache_cleanup").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert_eq!(run.result, Some(serde_json::json!({ "runs": 1 })));

        let job = scheduler.job("cache_cleanup").await.unwrap();
        assert_eq!(job.run_count, 1);
        assert!(job.last_run.is_some());
        assert!(job.next_run > Utc::now() + chrono::Duration::hours(3));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_rescheduled() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        scheduler.register_job("ota_scraping", failing, 6.0, true).await;

        let run = scheduler.run_job("ota_scraping").await.unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("upstream unavailable"));

        let job = scheduler.job("ota_scraping").await.unwrap();
        assert_eq!(job.fail_count, 1);
        assert_eq!(job.run_count, 1);
        assert_eq!(job.last_error.as_deref(), Some("upstream unavailable"));
        assert!(job.next_run > Utc::now() + chrono::Duration::hours(5));
    }

    #[tokio::test]
    async fn test_disabled_job_is_skipped() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job("partner_sync", counting(counter.clone()), 1.0, false)
            .await;

        let run = scheduler.run_job("partner_sync").await.unwrap();
        assert_eq!(run.status, JobStatus::Skipped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(scheduler.enable_job("partner_sync").await);
        assert!(!scheduler.enable_job("missing").await);
        let run = scheduler.run_job("partner_sync").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        assert!(matches!(
            scheduler.run_job("nope").await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_pending_only_runs_due_jobs() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let hourly = Arc::new(AtomicUsize::new(0));
        let six_hourly = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job("partner_sync", counting(hourly.clone()), 1.0, true)
            .await;
        scheduler
            .register_job("ota_scraping", counting(six_hourly.clone()), 6.0, true)
            .await;

        assert!(scheduler.run_pending().await.is_empty());

        let runs = scheduler
            .run_pending_at(Utc::now() + chrono::Duration::hours(2))
            .await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name, "partner_sync");
        assert_eq!(hourly.load(Ordering::SeqCst), 1);
        assert_eq!(six_hourly.load(Ordering::SeqCst), 0);

        let stats = scheduler.stats().await;
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.jobs_count, 2);
        assert!(!stats.is_running);
    }

    /// Sleeps for an hour on its first run only, then finishes at once.
    fn slow_first_run(
        calls: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    ) -> impl Fn() -> JobFuture + Send + Sync + 'static {
        move || {
            let calls = calls.clone();
            let finished = finished.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({}))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_released_when_stop_aborts_it() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job(
                "ota_scraping",
                slow_first_run(calls.clone(), finished.clone()),
                0.0,
                true,
            )
            .await;

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(
            scheduler.job("ota_scraping").await.unwrap().last_status,
            JobStatus::Running
        );

        scheduler.stop().await;
        let job = scheduler.job("ota_scraping").await.unwrap();
        assert_eq!(job.last_status, JobStatus::NeverRun);
        assert_eq!(job.run_count, 0);

        let run = scheduler.run_job("ota_scraping").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);

        // The aborted body never completes.
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_manual_run_releases_job() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job(
                "api_refresh",
                slow_first_run(calls.clone(), finished.clone()),
                2.0,
                true,
            )
            .await;

        let cancelled =
            tokio::time::timeout(Duration::from_secs(5), scheduler.run_job("api_refresh")).await;
        assert!(cancelled.is_err());
        assert_ne!(
            scheduler.job("api_refresh").await.unwrap().last_status,
            JobStatus::Running
        );

        let run = scheduler.run_job("api_refresh").await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_due_jobs_until_stopped() {
        let scheduler = Scheduler::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register_job("cache_cleanup", counting(counter.clone()), 0.0, true)
            .await;

        assert!(scheduler.start().await);
        assert!(!scheduler.start().await);
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        assert!(scheduler.stats().await.started_at.is_some());
    }
}
