use log::info;
use std::path::{Path, PathBuf};

use super::CommandRunner;
use crate::Result;
use common::config::PostgresSettings;

/// pg_dump's custom archive format, restorable with pg_restore
const CUSTOM_FORMAT: &str = "c";

/// Options for pg_dump command
#[derive(Debug, Clone)]
pub struct PgDumpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub database: String,
    pub file: PathBuf,
    pub table: Option<String>,
}

impl PgDumpOptions {
    /// Custom-format dump of the configured database into `file`.
    pub fn new(postgres: &PostgresSettings, file: PathBuf) -> Self {
        Self {
            host: postgres.host.clone(),
            port: postgres.port,
            username: postgres.user.clone(),
            database: postgres.database.clone(),
            file,
            table: None,
        }
    }

    /// Restrict the dump to a single table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.username.clone(),
            "-d".to_string(),
            self.database.clone(),
        ];

        if let Some(table) = &self.table {
            args.push("-t".to_string());
            args.push(table.clone());
        }

        args.extend([
            "-F".to_string(),
            CUSTOM_FORMAT.to_string(),
            "-f".to_string(),
            self.file.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// Wrapper for pg_dump command
pub struct PgDump;

impl PgDump {
    /// Run pg_dump at `program` with the given options
    pub async fn run(runner: &dyn CommandRunner, program: &Path, options: &PgDumpOptions) -> Result<()> {
        match &options.table {
            Some(table) => info!("Dumping table {table} to {}", options.file.display()),
            None => info!(
                "Dumping database {} to {}",
                options.database,
                options.file.display()
            ),
        }
        runner.run(program, &options.args()).await?;
        info!("pg_dump completed successfully");
        Ok(())
    }
}
