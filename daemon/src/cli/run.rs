use anyhow::{Context, Result};
use log::{error, info};
use tokio::signal;

use crate::Scheduler;

/// Run the scheduler in the foreground until Ctrl+C.
pub async fn execute(scheduler: Scheduler) -> Result<()> {
    info!("Running pgwarden daemon in the foreground...");

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => {
                // Without a signal handler the daemon runs until killed
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    scheduler
        .run_until(shutdown)
        .await
        .context("Daemon stopped with an error")?;

    info!("Daemon shutdown complete");
    Ok(())
}
