//! State Store Adapter (C3): durable job/tenant state behind a pluggable
//! key-value backend. `fleet-migrate-core` only defines the trait and an
//! in-memory test double; `fleet-migrate-server` supplies the Redis-backed
//! implementation.

pub mod memory;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{OrchestratorError, Result};
use crate::model::{Job, Status, TenantResult};

/// Key prefix for job records, namespaced as `migration:job:<job_id>`.
pub const JOB_KEY_PREFIX: &str = "migration:job:";
/// Reserved namespace for future per-tenant keys, `migration:tenant:<...>`.
pub const TENANT_KEY_PREFIX: &str = "migration:tenant:";
/// TTL renewed on every write to a job record, in seconds (7 days).
pub const JOB_TTL_SECS: u64 = 604_800;

pub fn job_key(job_id: &str) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_job(&self, job: Job) -> Result<()>;
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;
    async fn update_job_status(&self, job_id: &str, status: Status) -> Result<()>;

    /// The only operation that mutates counters. Implementations MUST
    /// serialize this per-`job_id` (see the concurrency note in §5): read,
    /// merge the tenant result, recompute counters, and write back
    /// atomically with respect to other callers for the same job.
    async fn update_tenant_result(&self, job_id: &str, result: TenantResult) -> Result<()>;

    async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>>;
    async fn delete_job(&self, job_id: &str) -> Result<bool>;
}

/// Shared bookkeeping a concrete `StateStore` applies to a `Job` once a
/// `TenantResult` has been merged in. Backends call this after locking the
/// job and reading its current value, then persist the mutated job.
pub fn apply_tenant_result(job: &mut Job, result: TenantResult) -> Result<()> {
    let is_new = !job.tenant_results.contains_key(&result.tenant_id);
    let status = result.status;

    job.tenant_results.insert(result.tenant_id.clone(), result);

    // Idempotence: re-delivering the same tenant_id must not double-count.
    if is_new {
        job.completed += 1;
        match status {
            Status::Success => job.successful += 1,
            Status::Failed => job.failed += 1,
            _ => {}
        }
    }

    if job.status == Status::Pending {
        job.status = Status::Running;
    }

    if job.is_terminal() {
        job.status = job.terminal_status();
        job.completed_at.get_or_insert_with(Utc::now);
    }

    Ok(())
}

pub fn not_found(job_id: &str) -> OrchestratorError {
    OrchestratorError::NotFoundError(job_id.to_string())
}
