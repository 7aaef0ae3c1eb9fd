use async_trait::async_trait;
use chrono::Local;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{BackupJob, JobReport};
use crate::layout;
use crate::wrapper::{CommandRunner, PgDump, PgDumpOptions};
use crate::{BackupError, Result, Stage};
use common::config::Settings;

#[derive(Debug, Clone)]
pub struct DumpReport {
    pub dump_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Logical dumps with pg_dump: the whole database, or each configured table.
pub struct DumpJob {
    settings: Arc<Settings>,
    runner: Arc<dyn CommandRunner>,
}

impl DumpJob {
    pub fn new(settings: Arc<Settings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    pub async fn dump(&self) -> Result<DumpReport> {
        if self.settings.backup.tables.is_empty() {
            self.dump_database().await
        } else {
            self.dump_tables().await
        }
    }

    async fn dump_database(&self) -> Result<DumpReport> {
        let postgres = &self.settings.postgres;
        let dump_dir = layout::dump_dir_path(self.settings.backup.dump_root(), &Local::now(), None);
        create_dump_dir(&dump_dir)?;

        let file = layout::dump_file_path(&dump_dir, &postgres.database);
        info!(
            "Backing up database {} to {}",
            postgres.database,
            file.display()
        );

        let options = PgDumpOptions::new(postgres, file.clone());
        PgDump::run(self.runner.as_ref(), &self.settings.backup.pg_dump, &options)
            .await
            .map_err(|e| e.at(Stage::Dump))?;

        info!(
            "Database {} backed up to {}",
            postgres.database,
            file.display()
        );
        Ok(DumpReport {
            dump_dir,
            files: vec![file],
        })
    }

    /// Dumps tables in configured order; the first failure ends the run.
    async fn dump_tables(&self) -> Result<DumpReport> {
        let postgres = &self.settings.postgres;
        let tables = &self.settings.backup.tables;
        let dump_dir = layout::table_dump_dir_path(self.settings.backup.dump_root(), &Local::now());
        create_dump_dir(&dump_dir)?;
        info!("Backing up {} tables into {}", tables.len(), dump_dir.display());

        let mut files = Vec::with_capacity(tables.len());
        for table in tables {
            let file = layout::dump_file_path(&dump_dir, table);
            let options = PgDumpOptions::new(postgres, file.clone()).table(table.as_str());

            PgDump::run(self.runner.as_ref(), &self.settings.backup.pg_dump, &options)
                .await
                .map_err(|e| BackupError::TableDump {
                    table: table.clone(),
                    source: Box::new(e),
                })?;

            info!("Table {table} backed up to {}", file.display());
            files.push(file);
        }

        Ok(DumpReport { dump_dir, files })
    }
}

fn create_dump_dir(dump_dir: &Path) -> Result<()> {
    fs::create_dir_all(dump_dir).map_err(|e| BackupError::io(dump_dir, e).at(Stage::Dump))
}

#[async_trait]
impl BackupJob for DumpJob {
    async fn run(&self) -> Result<JobReport> {
        self.dump().await.map(JobReport::Dump)
    }
}
