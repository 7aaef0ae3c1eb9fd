//! Naming rules for backup artifacts.
//!
//! The filesystem is the catalog: every artifact is identified by its path,
//! and every path embeds a second-resolution timestamp (or a date for dumps).

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const DATE_FORMAT: &str = "%Y%m%d";

const FULL_SUFFIX: &str = "_full";
const WAL_PREFIX: &str = "wal_backup_";
const WAL_EXTENSION: &str = ".zip";
const TABLES_SUFFIX: &str = "tables";
const DUMP_EXTENSION: &str = "backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FullBackup,
    WalPackage,
    TableDump,
    DatabaseDump,
}

impl ArtifactKind {
    /// Recognize an artifact from its file or directory name.
    pub fn classify(path: &Path) -> Option<ArtifactKind> {
        let name = path.file_name()?.to_str()?;

        if let Some(stamp) = name.strip_suffix(FULL_SUFFIX) {
            return is_timestamp(stamp).then_some(ArtifactKind::FullBackup);
        }

        if let Some(stamp) = name
            .strip_prefix(WAL_PREFIX)
            .and_then(|rest| rest.strip_suffix(WAL_EXTENSION))
        {
            return is_timestamp(stamp).then_some(ArtifactKind::WalPackage);
        }

        if let Some(date) = name
            .strip_suffix(TABLES_SUFFIX)
            .and_then(|rest| rest.strip_suffix('_'))
        {
            return is_date(date).then_some(ArtifactKind::TableDump);
        }

        is_date(name).then_some(ArtifactKind::DatabaseDump)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ArtifactKind::FullBackup => "full backup",
            ArtifactKind::WalPackage => "WAL package",
            ArtifactKind::TableDump => "table dump",
            ArtifactKind::DatabaseDump => "database dump",
        }
    }
}

fn is_timestamp(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok()
}

fn is_date(value: &str) -> bool {
    value.len() == 8 && NaiveDate::parse_from_str(value, DATE_FORMAT).is_ok()
}

/// `base_dir/<timestamp>_full`
pub fn full_backup_path(base_dir: &Path, now: &DateTime<Local>) -> PathBuf {
    base_dir.join(format!("{}{FULL_SUFFIX}", now.format(TIMESTAMP_FORMAT)))
}

/// `dest_dir/wal_backup_<timestamp>.zip`
pub fn wal_package_path(dest_dir: &Path, now: &DateTime<Local>) -> PathBuf {
    dest_dir.join(format!(
        "{WAL_PREFIX}{}{WAL_EXTENSION}",
        now.format(TIMESTAMP_FORMAT)
    ))
}

/// `base_dir/<date>_<suffix>`, or `base_dir/<date>` without a suffix.
pub fn dump_dir_path(base_dir: &Path, now: &DateTime<Local>, suffix: Option<&str>) -> PathBuf {
    let date = now.format(DATE_FORMAT);
    match suffix {
        Some(suffix) => base_dir.join(format!("{date}_{suffix}")),
        None => base_dir.join(date.to_string()),
    }
}

/// Directory for per-table dumps taken on the day of `now`.
pub fn table_dump_dir_path(base_dir: &Path, now: &DateTime<Local>) -> PathBuf {
    dump_dir_path(base_dir, now, Some(TABLES_SUFFIX))
}

/// `dump_dir/<name>.backup`
pub fn dump_file_path(dump_dir: &Path, name: &str) -> PathBuf {
    dump_dir.join(format!("{name}.{DUMP_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn builds_artifact_paths() {
        let base = Path::new("/b");
        assert_eq!(
            full_backup_path(base, &at()),
            PathBuf::from("/b/20240309_070501_full")
        );
        assert_eq!(
            wal_package_path(Path::new("/archive"), &at()),
            PathBuf::from("/archive/wal_backup_20240309_070501.zip")
        );
        assert_eq!(dump_dir_path(base, &at(), None), PathBuf::from("/b/20240309"));
        assert_eq!(
            table_dump_dir_path(base, &at()),
            PathBuf::from("/b/20240309_tables")
        );
        assert_eq!(
            dump_file_path(Path::new("/b/20240309_tables"), "orders"),
            PathBuf::from("/b/20240309_tables/orders.backup")
        );
    }

    #[test]
    fn names_differ_one_second_apart() {
        let later = at() + chrono::Duration::seconds(1);
        assert_ne!(
            full_backup_path(Path::new("/b"), &at()),
            full_backup_path(Path::new("/b"), &later)
        );
    }

    #[test]
    fn classifies_generated_names() {
        let base = Path::new("/b");
        let cases = [
            (full_backup_path(base, &at()), ArtifactKind::FullBackup),
            (wal_package_path(base, &at()), ArtifactKind::WalPackage),
            (table_dump_dir_path(base, &at()), ArtifactKind::TableDump),
            (dump_dir_path(base, &at(), None), ArtifactKind::DatabaseDump),
        ];
        for (path, kind) in cases {
            assert_eq!(ArtifactKind::classify(&path), Some(kind), "{path:?}");
        }
    }

    #[test]
    fn ignores_foreign_names() {
        for name in ["old_gen", "notes.txt", "backup_full", "wal_backup_x.zip", "2024"] {
            assert_eq!(ArtifactKind::classify(Path::new(name)), None, "{name}");
        }
    }
}
