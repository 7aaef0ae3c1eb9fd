pub mod cli;

use anyhow::{bail, Result};
use log::{error, info, warn};
use postgres::{BackupJobs, JobKind, JobReport};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Dispatches backup jobs, allowing at most one run per job kind at a time.
///
/// Cloning is cheap and every clone shares the same per-kind locks.
#[derive(Clone)]
pub struct Scheduler {
    jobs: Arc<BackupJobs>,
    locks: Arc<HashMap<JobKind, Arc<Mutex<()>>>>,
}

impl Scheduler {
    pub fn new(jobs: BackupJobs) -> Self {
        let locks = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            jobs: Arc::new(jobs),
            locks: Arc::new(locks),
        }
    }

    pub fn jobs(&self) -> &BackupJobs {
        &self.jobs
    }

    /// Job kinds with a timer, with their periods.
    ///
    /// Fails when an interval is too long to arm a timer for.
    pub fn schedules(&self) -> Result<Vec<(JobKind, Duration)>> {
        let settings = self.jobs.settings();
        let mut schedules = Vec::new();
        for kind in JobKind::ALL {
            let Some(hours) = kind.interval_hours(settings) else {
                continue;
            };
            let period = hours
                .checked_mul(3600)
                .map(Duration::from_secs)
                .filter(|period| {
                    period
                        .checked_mul(2)
                        .and_then(|span| Instant::now().checked_add(span))
                        .is_some()
                });
            match period {
                Some(period) => schedules.push((kind, period)),
                None => bail!("Interval of {hours} hours for {kind} is out of range"),
            }
        }
        Ok(schedules)
    }

    fn lock(&self, kind: JobKind) -> Arc<Mutex<()>> {
        // Every kind is inserted in `new`
        self.locks[&kind].clone()
    }

    /// Start a run of `kind` in its own task.
    ///
    /// Returns `None` without starting anything when a run of the same kind
    /// is still in progress.
    pub fn trigger(&self, kind: JobKind) -> Option<JoinHandle<()>> {
        let guard = match self.lock(kind).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Previous {kind} run still in progress, skipping this firing");
                return None;
            }
        };

        let jobs = self.jobs.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            info!("Starting scheduled {kind}");
            report_outcome(kind, &jobs.run(kind).await);
        }))
    }

    /// Run `kind` to completion, waiting for any in-flight run of the same kind first.
    pub async fn run_once(&self, kind: JobKind) -> postgres::Result<JobReport> {
        let lock = self.lock(kind);
        let _guard = lock.lock().await;
        info!("Running {kind}");
        self.jobs.run(kind).await
    }

    /// Arm one timer per configured interval and dispatch until `shutdown` resolves.
    ///
    /// The first firing of each timer comes one full period after start. With
    /// no interval configured the scheduler idles. On shutdown the timers are
    /// stopped and in-flight jobs are awaited.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let schedules = self.schedules()?;
        if schedules.is_empty() {
            warn!(
                "No job interval configured, idling until shutdown; set full_backup_interval, \
                 wal_archive_interval or table_backup_interval to schedule jobs"
            );
        }

        let timers: Vec<JoinHandle<()>> = schedules
            .into_iter()
            .map(|(kind, period)| {
                info!("Scheduling {kind} every {}h", period.as_secs() / 3600);
                let scheduler = self.clone();
                tokio::spawn(async move {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        scheduler.trigger(kind);
                    }
                })
            })
            .collect();

        shutdown.await;
        info!("Shutdown requested, stopping timers");

        for timer in &timers {
            timer.abort();
        }
        futures::future::join_all(timers).await;

        for kind in JobKind::ALL {
            let lock = self.lock(kind);
            if lock.try_lock().is_err() {
                info!("Waiting for in-flight {kind} to finish");
            }
            let _guard = lock.lock().await;
        }

        info!("Scheduler stopped");
        Ok(())
    }
}

fn report_outcome(kind: JobKind, outcome: &postgres::Result<JobReport>) {
    match outcome {
        Ok(report) => info!("Scheduled {kind} finished: {report}"),
        Err(e) => {
            error!("Scheduled {kind} failed: {e}");
            sentry::capture_message(&format!("{kind} failed: {e}"), sentry::Level::Error);
        }
    }
}
