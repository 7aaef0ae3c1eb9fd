use log::info;
use std::path::{Path, PathBuf};

use super::CommandRunner;
use crate::Result;
use common::config::PostgresSettings;

/// Options for pg_basebackup command
#[derive(Debug, Clone)]
pub struct PgBaseBackupOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub pgdata: PathBuf,
    pub format: String,
    pub compress: bool,
    pub progress: bool,
}

impl PgBaseBackupOptions {
    /// Tar-format, gzip-compressed backup into `pgdata` with progress reporting.
    pub fn new(postgres: &PostgresSettings, pgdata: PathBuf) -> Self {
        Self {
            host: postgres.host.clone(),
            port: postgres.port,
            username: postgres.user.clone(),
            pgdata,
            format: "tar".to_string(),
            compress: true,
            progress: true,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-D".to_string(),
            self.pgdata.to_string_lossy().into_owned(),
            "-F".to_string(),
            self.format.clone(),
        ];

        if self.compress {
            args.push("-z".to_string());
        }

        if self.progress {
            args.push("-P".to_string());
        }

        args.extend([
            "-U".to_string(),
            self.username.clone(),
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
        ]);
        args
    }
}

/// Wrapper for pg_basebackup command
pub struct PgBaseBackup;

impl PgBaseBackup {
    /// Run pg_basebackup at `program` with the given options
    pub async fn run(
        runner: &dyn CommandRunner,
        program: &Path,
        options: &PgBaseBackupOptions,
    ) -> Result<()> {
        info!("Starting pg_basebackup into {}", options.pgdata.display());
        runner.run(program, &options.args()).await?;
        info!("pg_basebackup completed successfully");
        Ok(())
    }
}
