//! `ScriptExecutor`: the pluggable boundary to the actual database driver.
//! The core only defines the trait; `fleet-migrate-server` supplies a
//! Postgres-backed implementation grounded on the teacher's connection and
//! transaction handling.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::TenantSpec;

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Executes `sql` against `tenant` in a single transaction, committed on
    /// success, rolled back and the error re-raised on any SQL failure.
    async fn execute(&self, tenant: &TenantSpec, sql: &str) -> Result<()>;
}

/// Test double that records every script it was asked to run and can be
/// configured to fail on a named filename.
#[derive(Default)]
pub struct RecordingExecutor {
    pub fail_on_content_containing: Option<String>,
}

#[async_trait]
impl ScriptExecutor for RecordingExecutor {
    async fn execute(&self, _tenant: &TenantSpec, sql: &str) -> Result<()> {
        if let Some(needle) = &self.fail_on_content_containing {
            if sql.contains(needle.as_str()) {
                return Err(crate::error::OrchestratorError::ExecutionError(format!(
                    "simulated failure on: {}",
                    needle
                )));
            }
        }
        Ok(())
    }
}
