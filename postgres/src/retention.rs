use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::ArtifactKind;
use crate::{BackupError, Result};

/// How old artifacts are pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Remove every directory under the root so only the next generation remains.
    SingleGeneration,
    /// Remove files last modified longer ago than the given age.
    MaxAge(Duration),
}

impl RetentionPolicy {
    pub fn apply(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        match self {
            RetentionPolicy::SingleGeneration => sweep_directory(dir),
            RetentionPolicy::MaxAge(max_age) => sweep_by_age(dir, *max_age),
        }
    }
}

/// Entries of `dir` sorted by name, paired with their file type.
fn sorted_entries(dir: &Path) -> Result<Vec<(PathBuf, fs::FileType)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BackupError::io(dir, e))? {
        let entry = entry.map_err(|e| BackupError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| BackupError::io(&path, e))?;
        entries.push((path, file_type));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Remove every top-level directory under `dir`. Files at that level are left alone.
///
/// Stops at the first failure; whatever was removed before it stays removed.
pub fn sweep_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    info!("Sweeping old backup generations in {}", dir.display());

    let mut removed = Vec::new();
    for (path, file_type) in sorted_entries(dir)? {
        if !file_type.is_dir() {
            continue;
        }
        fs::remove_dir_all(&path).map_err(|e| BackupError::io(&path, e))?;
        match ArtifactKind::classify(&path) {
            Some(kind) => info!("Removed old {}: {}", kind.describe(), path.display()),
            None => info!("Removed old backup directory: {}", path.display()),
        }
        removed.push(path);
    }

    info!("Sweep of {} complete, {} removed", dir.display(), removed.len());
    Ok(removed)
}

/// Delete non-directory entries of `dir` whose modification time is strictly
/// older than `now - max_age`. A negative age removes everything.
///
/// A cutoff outside the representable date range saturates: nothing is
/// old enough for a huge positive age, everything is for a huge negative one.
pub fn sweep_by_age(dir: &Path, max_age: Duration) -> Result<Vec<PathBuf>> {
    let cutoff = Utc::now()
        .checked_sub_signed(max_age)
        .unwrap_or(if max_age < Duration::zero() {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        });
    info!(
        "Removing files in {} modified before {}",
        dir.display(),
        cutoff.format("%Y-%m-%d %H:%M:%S")
    );

    let mut removed = Vec::new();
    for (path, file_type) in sorted_entries(dir)? {
        if file_type.is_dir() {
            continue;
        }
        let modified = fs::symlink_metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|e| BackupError::io(&path, e))?;
        let modified: DateTime<Utc> = modified.into();

        if modified < cutoff {
            fs::remove_file(&path).map_err(|e| BackupError::io(&path, e))?;
            info!("Removed old backup file: {}", path.display());
            removed.push(path);
        } else {
            debug!("Keeping {}", path.display());
        }
    }

    info!("Removed {} old files from {}", removed.len(), dir.display());
    Ok(removed)
}

/// Age-based cleanup of `data_dir`, keeping files newer than `days` days.
pub fn remove_old_backups(data_dir: &Path, days: i64) -> Result<Vec<PathBuf>> {
    let max_age = Duration::try_days(days).unwrap_or(if days < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    });
    RetentionPolicy::MaxAge(max_age).apply(data_dir)
}
