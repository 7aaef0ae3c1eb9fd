use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{blocking, BackupJob, JobReport};
use crate::layout;
use crate::retention::RetentionPolicy;
use crate::wrapper::{CommandRunner, PgBaseBackup, PgBaseBackupOptions};
use crate::{BackupError, Result, Stage};
use common::config::Settings;

#[derive(Debug, Clone)]
pub struct FullBackupReport {
    pub backup_path: PathBuf,
    /// Generations removed by the sweep that preceded the backup
    pub removed: Vec<PathBuf>,
    pub size_bytes: u64,
}

/// Full backup manager
///
/// Sweeps the backup root with [`RetentionPolicy::SingleGeneration`] and only
/// then runs pg_basebackup, so the new backup is the only generation kept.
pub struct FullBackupJob {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
    policy: RetentionPolicy,
}

impl FullBackupJob {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            settings,
            runner,
            policy: RetentionPolicy::SingleGeneration,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Perform a full backup
    pub async fn backup(&self) -> Result<FullBackupReport> {
        let root = self.settings.backup.full_backup_dir.clone();
        info!("Starting full backup into {}", root.display());

        // Create backup directory if it doesn't exist
        if !root.exists() {
            info!("Creating base backup directory: {}", root.display());
            fs::create_dir_all(&root)
                .map_err(|e| BackupError::io(&root, e).at(Stage::Sweep))?;
        }

        let backup_path = layout::full_backup_path(&root, &Local::now());

        // Must complete before pg_basebackup writes the new generation
        let policy = self.policy;
        let sweep_root = root.clone();
        let removed = blocking(move || policy.apply(&sweep_root))
            .await
            .map_err(|e| e.at(Stage::Sweep))?;

        let options = PgBaseBackupOptions::new(&self.settings.postgres, backup_path.clone());
        PgBaseBackup::run(
            self.runner.as_ref(),
            &self.settings.backup.pg_basebackup,
            &options,
        )
        .await
        .map_err(|e| e.at(Stage::BaseBackup))?;

        let size_bytes = calculate_backup_size(&backup_path);
        info!(
            "Full backup completed successfully: {} ({size_bytes} bytes)",
            backup_path.display()
        );

        Ok(FullBackupReport {
            backup_path,
            removed,
            size_bytes,
        })
    }
}

#[async_trait]
impl BackupJob for FullBackupJob {
    async fn run(&self) -> Result<JobReport> {
        self.backup().await.map(JobReport::FullBackup)
    }
}

/// Calculate backup size in bytes. Unreadable entries are skipped.
fn calculate_backup_size(backup_path: &Path) -> u64 {
    let mut total_size = 0;

    for entry in walkdir::WalkDir::new(backup_path) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                total_size += entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Could not size {}: {e}", backup_path.display());
                break;
            }
        }
    }

    debug!("Backup size: {total_size} bytes");
    total_size
}
