//! `Dispatcher`: the pluggable task-queue transport that runs Tenant Workers
//! in parallel or sequential mode and carries best-effort progress events.
//! The core only defines the trait; `fleet-migrate-server` supplies a
//! tokio-task-based implementation.

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub job_id: String,
    pub tenant_id: String,
    pub scripts_completed: usize,
    pub total_scripts: usize,
}

/// A handle to dispatched work; the orchestrator only needs to know how many
/// dispatch units were created, per §4.5's `{job_id, dispatch_id(s), ...}`
/// response shape.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    pub dispatch_ids: Vec<String>,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Submits all `jobs` as one concurrent group and returns as soon as
    /// submission is acknowledged — it MUST NOT wait for the tenants
    /// themselves to finish, so a caller fronting this with an HTTP handler
    /// can answer `202 Accepted` immediately (§6). Concurrency is bounded
    /// only by the dispatcher's own worker pool, per §5 ("no per-job limit is
    /// imposed by the core"). `finalizer` is run exactly once, after every
    /// job in the group has terminated regardless of outcome — the "attach a
    /// finalizer that runs when all have completed" step of §4.5.
    async fn spawn_parallel(
        &self,
        jobs: Vec<BoxFuture<'static, ()>>,
        finalizer: BoxFuture<'static, ()>,
    ) -> Result<DispatchHandle>;

    /// Submits `jobs` as a chain — task `i+1` starts only after task `i` has
    /// fully terminated, regardless of outcome — and returns as soon as
    /// submission is acknowledged. `finalizer` runs once, after the last
    /// task in the chain terminates.
    async fn spawn_sequential(
        &self,
        jobs: Vec<BoxFuture<'static, ()>>,
        finalizer: BoxFuture<'static, ()>,
    ) -> Result<DispatchHandle>;

    /// Best-effort progress emission. Failure here MUST NOT fail the tenant
    /// that produced the event.
    async fn emit_progress(&self, event: ProgressEvent) -> Result<()>;
}
