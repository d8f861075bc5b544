//! `PgScriptExecutor`: the Postgres-backed `ScriptExecutor`. Grounded
//! directly on `waypoint-core/src/db.rs`'s connect-with-retry and
//! execute-in-transaction shape, generalized to open a fresh connection per
//! `TenantSpec` rather than against one fixed configured database — this
//! system applies scripts across many tenant databases, not one.

use async_trait::async_trait;
use fleet_migrate_core::error::{OrchestratorError, Result};
use fleet_migrate_core::model::TenantSpec;

const CONNECT_RETRIES: u32 = 3;

/// Spawns the background connection driver task and logs if it terminates
/// with an error, the same pattern `db.rs::spawn_connection_task` uses.
fn spawn_connection_task(
    connection: tokio_postgres::Connection<tokio_postgres::Socket, tokio_postgres::tls::NoTlsStream>,
) {
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("tenant database connection error: {}", e);
        }
    });
}

/// 28P01 = invalid_password, 28000 = invalid_authorization_specification.
/// Retrying these wastes the whole backoff on credentials that will never
/// work.
fn is_permanent_error(e: &tokio_postgres::Error) -> bool {
    if let Some(db_err) = e.as_db_error() {
        let code = db_err.code().code();
        return code == "28P01" || code == "28000";
    }
    false
}

async fn connect_with_retries(conn_string: &str) -> std::result::Result<tokio_postgres::Client, tokio_postgres::Error> {
    let mut last_err = None;
    for attempt in 0..=CONNECT_RETRIES {
        if attempt > 0 {
            let base_delay = std::cmp::min(1u64 << attempt, 10);
            let jitter_ms = fastrand::u64(0..250);
            tokio::time::sleep(std::time::Duration::from_millis(base_delay * 1000 + jitter_ms)).await;
        }
        match tokio_postgres::connect(conn_string, tokio_postgres::NoTls).await {
            Ok((client, connection)) => {
                spawn_connection_task(connection);
                return Ok(client);
            }
            Err(e) => {
                if is_permanent_error(&e) {
                    log::error!("permanent connection error, not retrying: {}", e);
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

pub struct PgScriptExecutor;

impl PgScriptExecutor {
    pub fn new() -> Self {
        PgScriptExecutor
    }
}

impl Default for PgScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl fleet_migrate_core::executor::ScriptExecutor for PgScriptExecutor {
    /// Opens a connection to `tenant`, wraps `sql` in a single transaction,
    /// commits on success, rolls back and surfaces the error on failure, and
    /// releases the connection on every exit path.
    async fn execute(&self, tenant: &TenantSpec, sql: &str) -> Result<()> {
        let client = connect_with_retries(&tenant.connection_string())
            .await
            .map_err(|e| OrchestratorError::ExecutionError(format!("connecting to tenant '{}': {}", tenant.tenant_id, e)))?;

        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| OrchestratorError::ExecutionError(e.to_string()))?;

        match client.batch_execute(sql).await {
            Ok(()) => {
                client
                    .batch_execute("COMMIT")
                    .await
                    .map_err(|e| OrchestratorError::ExecutionError(e.to_string()))?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                    log::warn!("failed to roll back transaction for tenant '{}': {}", tenant.tenant_id, rollback_err);
                }
                Err(OrchestratorError::ExecutionError(e.to_string()))
            }
        }
    }
}
