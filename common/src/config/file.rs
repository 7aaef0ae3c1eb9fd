use config::{Config, ConfigError, Environment, File, FileFormat};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Locations searched, in order, when no explicit config file is given.
/// Later files override earlier ones.
pub const CONFIG_PATHS: [&str; 3] = [
    "/etc/pgwarden/config.yaml",
    "~/.config/pgwarden/config.yaml",
    "config.yaml",
];

/// Prefix for environment overrides, e.g. `PGWARDEN__BACKUP__FULL_BACKUP_DIR`.
pub const ENV_PREFIX: &str = "PGWARDEN";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub backup: BackupSettings,
    /// DSN for reporting daemon job failures to Sentry
    pub sentry_dsn: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub data_dir: PathBuf,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupSettings {
    /// Age threshold in days for `remove_old_backups`
    pub only_remains_days: i64,
    pub full_backup_dir: PathBuf,
    /// Hours between full backups, 0 disables the timer
    pub full_backup_interval: u64,
    pub wal_archive_dir: PathBuf,
    pub wal_archive_backup_dir: PathBuf,
    pub clean_wal_archive_dir: bool,
    /// Hours between WAL archive runs, 0 disables the timer
    pub wal_archive_interval: u64,
    pub pg_basebackup: PathBuf,
    pub pg_dump: PathBuf,
    pub table_backup_dir: Option<PathBuf>,
    pub tables: Vec<String>,
    /// Hours between dump runs, 0 disables the timer
    pub table_backup_interval: u64,
    pub command_timeout_secs: Option<u64>,
}

impl BackupSettings {
    /// Root directory for logical dumps. Falls back to the full backup root.
    pub fn dump_root(&self) -> &Path {
        match &self.table_backup_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => &self.full_backup_dir,
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Settings {
    fn expand_paths(mut self) -> Self {
        expand(&mut self.postgres.data_dir);
        expand(&mut self.backup.full_backup_dir);
        expand(&mut self.backup.wal_archive_dir);
        expand(&mut self.backup.wal_archive_backup_dir);
        expand(&mut self.backup.pg_basebackup);
        expand(&mut self.backup.pg_dump);
        if let Some(dir) = self.backup.table_backup_dir.as_mut() {
            expand(dir);
        }
        self
    }
}

fn expand(path: &mut PathBuf) {
    let raw = path.to_string_lossy().into_owned();
    let expanded = shellexpand::tilde(&raw);
    if expanded != raw {
        *path = PathBuf::from(expanded.into_owned());
    }
}

/// Load settings from `explicit` if given, otherwise from the first
/// existing files in [`CONFIG_PATHS`]. Environment overrides are applied last.
pub fn load_config(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    // Create config builder and apply default values
    let config_builder = Config::builder()
        .set_default("postgres.host", "localhost")?
        .set_default("postgres.port", 5432)?
        .set_default("postgres.user", "postgres")?
        .set_default("postgres.password", "")?
        .set_default("postgres.database", "postgres")?
        .set_default("backup.only_remains_days", 7)?
        .set_default("backup.full_backup_interval", 0)?
        .set_default("backup.wal_archive_interval", 0)?
        .set_default("backup.table_backup_interval", 0)?
        .set_default("backup.clean_wal_archive_dir", false)?
        .set_default("backup.pg_basebackup", "pg_basebackup")?
        .set_default("backup.pg_dump", "pg_dump")?
        .set_default("backup.tables", Vec::<String>::new())?;

    let config_builder = match explicit {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            config_builder.add_source(File::from(path).format(FileFormat::Yaml))
        }
        None => CONFIG_PATHS.iter().fold(config_builder, |builder, path| {
            let path = shellexpand::tilde(path).into_owned();
            if Path::new(&path).exists() {
                info!("Loading configuration from {path}");
                builder.add_source(File::new(&path, FileFormat::Yaml))
            } else {
                debug!("No configuration at {path}");
                builder
            }
        }),
    };

    let config_builder = config_builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = config_builder.build()?.try_deserialize()?;
    Ok(settings.expand_paths())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
postgres:
  data_dir: /var/lib/postgresql/data
backup:
  full_backup_dir: /b
  wal_archive_dir: /wal
  wal_archive_backup_dir: /archive
"#;

    #[test]
    #[serial]
    fn applies_defaults_to_minimal_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        let settings = load_config(Some(&path)).unwrap();

        assert_eq!(settings.postgres.host, "localhost");
        assert_eq!(settings.postgres.port, 5432);
        assert_eq!(settings.postgres.database, "postgres");
        assert_eq!(settings.backup.only_remains_days, 7);
        assert_eq!(settings.backup.full_backup_interval, 0);
        assert!(!settings.backup.clean_wal_archive_dir);
        assert!(settings.backup.tables.is_empty());
        assert_eq!(settings.backup.pg_dump, PathBuf::from("pg_dump"));
        assert_eq!(settings.backup.dump_root(), Path::new("/b"));
        assert!(settings.backup.command_timeout().is_none());
        assert!(settings.sentry_dsn.is_none());
    }

    #[test]
    #[serial]
    fn reads_full_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
postgres:
  host: db.internal
  port: 6543
  user: backup
  password: hunter2
  data_dir: /data
  database: shop
backup:
  only_remains_days: 3
  full_backup_dir: /b
  full_backup_interval: 24
  wal_archive_dir: /wal
  wal_archive_backup_dir: /archive
  clean_wal_archive_dir: true
  wal_archive_interval: 1
  pg_basebackup: /usr/lib/postgresql/16/bin/pg_basebackup
  pg_dump: /usr/lib/postgresql/16/bin/pg_dump
  table_backup_dir: /dumps
  tables: ["orders", "users"]
  table_backup_interval: 12
  command_timeout_secs: 3600
"#,
        )
        .unwrap();

        let settings = load_config(Some(&path)).unwrap();

        assert_eq!(settings.postgres.host, "db.internal");
        assert_eq!(settings.postgres.port, 6543);
        assert_eq!(settings.postgres.password, "hunter2");
        assert_eq!(settings.backup.tables, vec!["orders", "users"]);
        assert!(settings.backup.clean_wal_archive_dir);
        assert_eq!(settings.backup.table_backup_interval, 12);
        assert_eq!(settings.backup.dump_root(), Path::new("/dumps"));
        assert_eq!(
            settings.backup.command_timeout(),
            Some(Duration::from_secs(3600))
        );
    }

    #[test]
    #[serial]
    fn rejects_missing_required_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "postgres:\n  data_dir: /data\n").unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn rejects_missing_explicit_file() {
        let dir = tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, MINIMAL).unwrap();

        std::env::set_var("PGWARDEN__BACKUP__FULL_BACKUP_INTERVAL", "6");
        let settings = load_config(Some(&path));
        std::env::remove_var("PGWARDEN__BACKUP__FULL_BACKUP_INTERVAL");

        assert_eq!(settings.unwrap().backup.full_backup_interval, 6);
    }

    #[test]
    fn expands_home_in_paths() {
        let mut path = PathBuf::from("~/backups");
        expand(&mut path);
        assert!(!path.to_string_lossy().starts_with('~'));
    }
}
