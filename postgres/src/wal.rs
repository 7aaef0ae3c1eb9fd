use async_trait::async_trait;
use log::{debug, error, info};
use tokio_postgres::NoTls;

use crate::{BackupError, Result};
use common::config::PostgresSettings;

/// Forces the server to close the current WAL segment.
#[async_trait]
pub trait WalSwitcher: Send + Sync {
    async fn switch_wal(&self) -> Result<()>;
}

/// Issues `pg_switch_wal()` over a connection opened for this call only.
pub struct PgWalSwitcher {
    postgres: PostgresSettings,
}

impl PgWalSwitcher {
    pub fn new(postgres: PostgresSettings) -> Self {
        Self { postgres }
    }

    fn connection_string(&self) -> String {
        let mut conn_string = format!(
            "host={} port={} dbname={} user={} sslmode=disable",
            self.postgres.host, self.postgres.port, self.postgres.database, self.postgres.user
        );
        debug!("Creating connection string for {conn_string}");

        if !self.postgres.password.is_empty() {
            conn_string.push_str(&format!(" password={}", self.postgres.password));
        }

        conn_string
    }
}

#[async_trait]
impl WalSwitcher for PgWalSwitcher {
    async fn switch_wal(&self) -> Result<()> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string(), NoTls)
            .await
            .map_err(BackupError::Connection)?;

        // Spawn the connection handler
        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {e}");
            }
        });

        let result = client.execute("SELECT pg_switch_wal()", &[]).await;

        // Dropping the client closes the connection
        drop(client);
        let _ = handle.await;

        result.map_err(BackupError::Postgres)?;
        info!("pg_switch_wal() succeeded, WAL segment switched");
        Ok(())
    }
}
