pub mod archive;
pub mod backup;
pub mod layout;
pub mod retention;
pub mod wal;
pub mod wrapper;

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Step of a backup job, used to say where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sweep,
    BaseBackup,
    WalSwitch,
    Listing,
    Packaging,
    Purge,
    Dump,
    Retention,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sweep => "sweep",
            Stage::BaseBackup => "base backup",
            Stage::WalSwitch => "WAL switch",
            Stage::Listing => "WAL listing",
            Stage::Packaging => "packaging",
            Stage::Purge => "purge",
            Stage::Dump => "dump",
            Stage::Retention => "retention cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to execute {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} failed with {status}")]
    ToolFailed { tool: String, status: ExitStatus },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("Database connection error: {0}")]
    Connection(tokio_postgres::Error),

    #[error("Postgres error: {0}")]
    Postgres(tokio_postgres::Error),

    #[error("Failed to write archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Failed to delete {} ({remaining} files left in place): {source}", .path.display())]
    Purge {
        path: PathBuf,
        remaining: usize,
        source: std::io::Error,
    },

    #[error("Purging WAL sources failed, package {} was kept: {source}", .package.display())]
    PurgeAfterPackage {
        package: PathBuf,
        source: Box<BackupError>,
    },

    #[error("Dump of table {table} failed: {source}")]
    TableDump {
        table: String,
        source: Box<BackupError>,
    },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("{stage} failed: {source}")]
    Failed {
        stage: Stage,
        source: Box<BackupError>,
    },
}

impl BackupError {
    /// Attach the job stage this error happened in.
    pub fn at(self, stage: Stage) -> Self {
        BackupError::Failed {
            stage,
            source: Box::new(self),
        }
    }

    /// The job stage that failed, when known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BackupError::Failed { stage, .. } => Some(*stage),
            BackupError::PurgeAfterPackage { .. } | BackupError::Purge { .. } => Some(Stage::Purge),
            BackupError::TableDump { .. } => Some(Stage::Dump),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

// Re-export key types for convenience
pub use backup::{BackupJobs, JobKind, JobReport};
pub use retention::RetentionPolicy;
pub use wal::{PgWalSwitcher, WalSwitcher};
pub use wrapper::{CommandRunner, ProcessRunner};
