mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use daemon::Scheduler;
use log::{error, info};
use postgres::{BackupJobs, JobKind};
use std::path::PathBuf;
use std::sync::Arc;

/// With no job flags, runs as a daemon on the configured intervals.
#[derive(Parser, Debug)]
#[clap(
    name = "pgwarden",
    about = "Scheduled PostgreSQL base backups, WAL archiving and logical dumps",
    version
)]
struct Cli {
    /// Take a full base backup with pg_basebackup
    #[clap(short, long)]
    full: bool,

    /// Package archived WAL files into a zip
    #[clap(short, long)]
    incremental: bool,

    /// Dump the configured tables, or the whole database when none are listed
    #[clap(short, long)]
    tables: bool,

    /// Remove files older than only_remains_days from the data directory
    #[clap(short, long)]
    remove: bool,

    /// Configuration file, instead of the default search paths
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// File the log is appended to, alongside stdout
    #[clap(long, default_value = "backup.log")]
    log_file: PathBuf,

    /// Log to stdout only
    #[clap(long)]
    no_log_file: bool,
}

impl Cli {
    /// Requested jobs, in execution order.
    fn requested(&self) -> Vec<JobKind> {
        [
            (self.full, JobKind::FullBackup),
            (self.incremental, JobKind::WalArchive),
            (self.tables, JobKind::TableDump),
            (self.remove, JobKind::RemoveOld),
        ]
        .into_iter()
        .filter_map(|(wanted, kind)| wanted.then_some(kind))
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = (!cli.no_log_file).then_some(cli.log_file.as_path());
    logging::init(log_file)?;

    let settings = common::config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    let _sentry = settings.sentry_dsn.as_deref().map(|dsn| {
        info!("Reporting job failures to Sentry");
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let scheduler = Scheduler::new(BackupJobs::from_settings(Arc::new(settings)));

    let requested = cli.requested();
    if requested.is_empty() {
        return daemon::cli::run::execute(scheduler).await;
    }

    for kind in requested {
        match scheduler.run_once(kind).await {
            Ok(report) => info!("{kind} finished: {report}"),
            Err(e) => {
                error!("{kind} failed: {e}");
                return Err(e).with_context(|| format!("{kind} failed"));
            }
        }
    }

    Ok(())
}
