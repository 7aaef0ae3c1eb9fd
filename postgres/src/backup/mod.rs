pub mod dump;
pub mod full;
pub mod wal;

use async_trait::async_trait;
use log::info;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::retention;
use crate::wal::{PgWalSwitcher, WalSwitcher};
use crate::wrapper::{CommandRunner, ProcessRunner};
use crate::{BackupError, Result, Stage};
use common::config::Settings;

pub use dump::{DumpJob, DumpReport};
pub use full::{FullBackupJob, FullBackupReport};
pub use wal::{WalArchiveJob, WalArchiveReport};

/// The job kinds the orchestrator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    FullBackup,
    WalArchive,
    TableDump,
    RemoveOld,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::FullBackup,
        JobKind::WalArchive,
        JobKind::TableDump,
        JobKind::RemoveOld,
    ];

    /// Hours between timer firings, or `None` when the kind has no timer.
    pub fn interval_hours(&self, settings: &Settings) -> Option<u64> {
        let hours = match self {
            JobKind::FullBackup => settings.backup.full_backup_interval,
            JobKind::WalArchive => settings.backup.wal_archive_interval,
            JobKind::TableDump => settings.backup.table_backup_interval,
            JobKind::RemoveOld => return None,
        };
        (hours > 0).then_some(hours)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::FullBackup => "full backup",
            JobKind::WalArchive => "WAL archive",
            JobKind::TableDump => "table backup",
            JobKind::RemoveOld => "old backup removal",
        };
        f.write_str(name)
    }
}

/// What a successful job run produced.
#[derive(Debug)]
pub enum JobReport {
    FullBackup(FullBackupReport),
    WalArchive(WalArchiveReport),
    Dump(DumpReport),
    RemoveOld { removed: Vec<PathBuf> },
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobReport::FullBackup(report) => write!(
                f,
                "backup at {} ({} bytes, {} old generations removed)",
                report.backup_path.display(),
                report.size_bytes,
                report.removed.len()
            ),
            JobReport::WalArchive(report) => write!(
                f,
                "{} segments packaged into {}{}",
                report.archived.len(),
                report.package.display(),
                if report.purged { ", sources purged" } else { "" }
            ),
            JobReport::Dump(report) => write!(
                f,
                "{} dump files in {}",
                report.files.len(),
                report.dump_dir.display()
            ),
            JobReport::RemoveOld { removed } => write!(f, "{} old files removed", removed.len()),
        }
    }
}

/// A single backup job.
#[async_trait]
pub trait BackupJob: Send + Sync {
    async fn run(&self) -> Result<JobReport>;
}

/// Run blocking filesystem work off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackupError::Task(e.to_string()))?
}

/// Entry point for every job kind, sharing configuration and collaborators.
pub struct BackupJobs {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
    wal_switcher: Arc<dyn WalSwitcher>,
}

impl BackupJobs {
    pub fn new(
        settings: Arc<Settings>,
        runner: Arc<dyn CommandRunner>,
        wal_switcher: Arc<dyn WalSwitcher>,
    ) -> Self {
        Self {
            settings,
            runner,
            wal_switcher,
        }
    }

    /// Real processes authenticated through `PGPASSWORD`, and a live WAL switch.
    pub fn from_settings(settings: Arc<Settings>) -> Self {
        let runner = ProcessRunner::new()
            .with_env("PGPASSWORD", settings.postgres.password.clone())
            .with_timeout(settings.backup.command_timeout());
        let wal_switcher = PgWalSwitcher::new(settings.postgres.clone());
        Self::new(settings, Arc::new(runner), Arc::new(wal_switcher))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn full_backup_job(&self) -> FullBackupJob {
        FullBackupJob::new(self.settings.clone(), self.runner.clone())
    }

    pub fn wal_archive_job(&self) -> WalArchiveJob {
        WalArchiveJob::new(self.settings.clone(), self.wal_switcher.clone())
    }

    pub fn dump_job(&self) -> DumpJob {
        DumpJob::new(self.settings.clone(), self.runner.clone())
    }

    pub async fn run(&self, kind: JobKind) -> Result<JobReport> {
        match kind {
            JobKind::FullBackup => self.full_backup_job().run().await,
            JobKind::WalArchive => self.wal_archive_job().run().await,
            JobKind::TableDump => self.dump_job().run().await,
            JobKind::RemoveOld => self.remove_old_backups().await,
        }
    }

    /// Age-based cleanup of the data directory.
    pub async fn remove_old_backups(&self) -> Result<JobReport> {
        let data_dir = self.settings.postgres.data_dir.clone();
        let days = self.settings.backup.only_remains_days;
        info!(
            "Removing files older than {days} days from {}",
            data_dir.display()
        );

        let removed = blocking(move || retention::remove_old_backups(&data_dir, days))
            .await
            .map_err(|e| e.at(Stage::Retention))?;

        info!("Old backup removal complete, {} files removed", removed.len());
        Ok(JobReport::RemoveOld { removed })
    }
}
