pub mod pg_basebackup;
pub mod pg_dump;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{BackupError, Result};

// Re-export for convenience
pub use pg_basebackup::{PgBaseBackup, PgBaseBackupOptions};
pub use pg_dump::{PgDump, PgDumpOptions};

/// Runs an external executable to completion.
///
/// Only the exit status matters; output goes straight to the operator.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> Result<()>;
}

/// [`CommandRunner`] backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an environment variable on every spawned process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Kill the process and fail with [`BackupError::Timeout`] once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<()> {
        let tool = program.display().to_string();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        info!("Executing {tool} {}", args.join(" "));
        debug!("Running command: {cmd:?}");

        let mut child = cmd.spawn().map_err(|source| BackupError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        let status = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        warn!("{tool} did not finish within {}s, killing it", limit.as_secs());
                        if let Err(e) = child.kill().await {
                            error!("Failed to kill {tool}: {e}");
                        }
                        return Err(BackupError::Timeout {
                            tool,
                            timeout: limit,
                        });
                    }
                }
            }
            None => child.wait().await,
        }
        .map_err(|source| BackupError::Spawn {
            tool: tool.clone(),
            source,
        })?;

        if !status.success() {
            return Err(BackupError::ToolFailed { tool, status });
        }

        debug!("{tool} exited successfully");
        Ok(())
    }
}
