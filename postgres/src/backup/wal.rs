use async_trait::async_trait;
use chrono::Local;
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{blocking, BackupJob, JobReport};
use crate::wal::WalSwitcher;
use crate::{archive, layout};
use crate::{BackupError, Result, Stage};
use common::config::Settings;

#[derive(Debug, Clone, Default)]
pub struct WalArchiveReport {
    pub package: PathBuf,
    pub archived: Vec<PathBuf>,
    pub purged: bool,
}

/// Packages archived WAL segments into a zip and optionally clears the source.
pub struct WalArchiveJob {
    settings: Arc<Settings>,
    switcher: Arc<dyn WalSwitcher>,
}

impl WalArchiveJob {
    pub fn new(settings: Arc<Settings>, switcher: Arc<dyn WalSwitcher>) -> Self {
        Self { settings, switcher }
    }

    pub async fn archive(&self) -> Result<WalArchiveReport> {
        let backup = &self.settings.backup;
        let source_dir = backup.wal_archive_dir.clone();
        let dest_dir = backup.wal_archive_backup_dir.clone();
        info!("Archiving WAL files from {}", source_dir.display());

        self.switcher
            .switch_wal()
            .await
            .map_err(|e| e.at(Stage::WalSwitch))?;

        // Segments written after this listing wait for the next cycle
        let list_dir = source_dir.clone();
        let segments = blocking(move || archive::collect_files(&list_dir))
            .await
            .map_err(|e| e.at(Stage::Listing))?;

        if segments.is_empty() {
            info!("No WAL files in {}, writing an empty package", source_dir.display());
        }

        if !dest_dir.exists() {
            info!("Creating WAL archive directory: {}", dest_dir.display());
            fs::create_dir_all(&dest_dir)
                .map_err(|e| BackupError::io(&dest_dir, e).at(Stage::Packaging))?;
        }

        let package = layout::wal_package_path(&dest_dir, &Local::now());
        let (sources, target) = (segments.clone(), package.clone());
        blocking(move || archive::package(&sources, &target))
            .await
            .map_err(|e| e.at(Stage::Packaging))?;
        info!(
            "{} WAL files packaged into {}",
            segments.len(),
            package.display()
        );

        let purged = backup.clean_wal_archive_dir;
        if purged {
            purge_after_packaging(&package, &segments).await?;
            info!("WAL directory {} cleared", source_dir.display());
        }

        Ok(WalArchiveReport {
            package,
            archived: segments,
            purged,
        })
    }
}

/// Delete the packaged segments. A failure keeps the package and names it.
async fn purge_after_packaging(package: &Path, segments: &[PathBuf]) -> Result<()> {
    let sources = segments.to_vec();
    if let Err(e) = blocking(move || archive::purge_sources(&sources)).await {
        error!("Failed to purge WAL sources after packaging: {e}");
        return Err(BackupError::PurgeAfterPackage {
            package: package.to_path_buf(),
            source: Box::new(e),
        });
    }
    Ok(())
}

#[async_trait]
impl BackupJob for WalArchiveJob {
    async fn run(&self) -> Result<JobReport> {
        self.archive().await.map(JobReport::WalArchive)
    }
}
