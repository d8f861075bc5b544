//! Job Orchestrator (C5) and Query Interface (C6): creates jobs, fans out
//! tenant work through the Dispatcher, finalizes, and answers read-only
//! queries over job state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::callback::{CallbackContext, CallbackRegistry, HookKind, HookOutcome};
use crate::dispatcher::{DispatchHandle, Dispatcher};
use crate::error::{OrchestratorError, Result};
use crate::executor::ScriptExecutor;
use crate::loader::{load_scripts, LoadReport};
use crate::model::{Job, Mode, ScriptSet, Status, TenantSpec};
use crate::store::StateStore;
use crate::worker::{run_tenant, TenantWorkerInputs};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub scripts_found: usize,
    pub report: String,
}

impl From<LoadReport> for ValidationResponse {
    fn from(report: LoadReport) -> Self {
        let scripts_found = report.set.len();
        let report_text = format!(
            "{} script(s) found, {} error(s), {} warning(s)",
            scripts_found,
            report.errors.len(),
            report.warnings.len()
        );
        ValidationResponse {
            valid: report.is_usable(),
            errors: report.errors,
            warnings: report.warnings,
            scripts_found,
            report: report_text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartJobRequest {
    pub tenants: Vec<TenantSpec>,
    pub migrations_dir: std::path::PathBuf,
    pub mode: Mode,
    pub parallel: bool,
    pub job_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub dispatch_ids: Vec<String>,
    pub mode: &'static str,
    pub tenant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub percent: f64,
}

/// Result of `StartJob` when `mode == validate_only`: the loader ran and no
/// job was created.
pub enum StartOutcome {
    Validated(ValidationResponse),
    Started(StartJobResponse),
}

pub struct Orchestrator<S: StateStore, D: Dispatcher> {
    registry: CallbackRegistry,
    store: Arc<S>,
    dispatcher: Arc<D>,
    executor: Arc<dyn ScriptExecutor>,
    soft_deadline: Duration,
}

impl<S: StateStore + 'static, D: Dispatcher + 'static> Orchestrator<S, D> {
    pub fn new(
        registry: CallbackRegistry,
        store: Arc<S>,
        dispatcher: Arc<D>,
        executor: Arc<dyn ScriptExecutor>,
        soft_deadline: Duration,
    ) -> Self {
        Orchestrator {
            registry,
            store,
            dispatcher,
            executor,
            soft_deadline,
        }
    }

    fn job_id_for(tenant_count: usize, now: chrono::DateTime<Utc>) -> String {
        format!(
            "migration_{}_{}_tenants",
            now.format("%Y%m%d_%H%M%S"),
            tenant_count
        )
    }

    /// `StartJob(tenants, migrations_dir, mode, parallel, job_name?)` per §4.5.
    pub async fn start_job(&self, request: StartJobRequest) -> Result<StartOutcome> {
        let report = load_scripts(&request.migrations_dir)?;

        if request.mode == Mode::ValidateOnly {
            return Ok(StartOutcome::Validated(report.into()));
        }

        if !report.is_usable() {
            return Err(OrchestratorError::validation(format!(
                "migration set has {} error(s): {}",
                report.errors.len(),
                report.errors.join("; ")
            )));
        }
        if report.set.is_empty() {
            return Err(OrchestratorError::validation("no scripts found in migrations directory"));
        }

        for tenant in &request.tenants {
            tenant.validate()?;
        }

        let now = Utc::now();
        let job_id = Self::job_id_for(request.tenants.len(), now);

        let mut before_job_ctx = CallbackContext::new(job_id.clone(), "", report.set.clone());
        before_job_ctx.metadata.insert(
            "tenants".to_string(),
            Value::Array(
                request
                    .tenants
                    .iter()
                    .map(|t| Value::String(t.tenant_id.clone()))
                    .collect(),
            ),
        );
        match self.registry.run(HookKind::BeforeJob, &mut before_job_ctx).await {
            HookOutcome::Fail(message) => {
                return Err(OrchestratorError::hook("before_job", message));
            }
            HookOutcome::Skip(_) => {
                return Err(OrchestratorError::hook("before_job", "skip is not meaningful at job scope"));
            }
            HookOutcome::Proceed(_) => {}
        }

        let mut job = Job::new(
            job_id.clone(),
            request.tenants.iter().map(|t| t.tenant_id.clone()).collect(),
            now,
        );
        job.job_name = request.job_name.clone();
        if job.total == 0 {
            // Nothing to dispatch: no tenant will ever call UpdateTenantResult,
            // so the job must reach its terminal state on creation rather than
            // waiting on a report that will never arrive.
            job.status = Status::Success;
            job.completed_at = Some(now);
        }
        self.store.create_job(job).await?;

        let dry_run = request.mode == Mode::DryRun;
        let tasks = self.build_tenant_tasks(&job_id, &request.tenants, &report.set, dry_run);
        let finalizer = Box::pin(run_after_job_hooks(
            self.store.clone(),
            self.registry.clone(),
            job_id.clone(),
        )) as BoxFuture<'static, ()>;

        let handle = if request.tenants.is_empty() {
            // Nothing was dispatched, so no backend would ever invoke a
            // completion callback for an empty group/chain; run the
            // finalizer (and thus after_job) directly instead.
            finalizer.await;
            DispatchHandle { dispatch_ids: vec![] }
        } else if request.parallel {
            self.dispatcher.spawn_parallel(tasks, finalizer).await?
        } else {
            self.dispatcher.spawn_sequential(tasks, finalizer).await?
        };

        Ok(StartOutcome::Started(StartJobResponse {
            job_id,
            dispatch_ids: handle.dispatch_ids,
            mode: if request.parallel { "parallel" } else { "sequential" },
            tenant_count: request.tenants.len(),
        }))
    }

    fn build_tenant_tasks(
        &self,
        job_id: &str,
        tenants: &[TenantSpec],
        scripts: &ScriptSet,
        dry_run: bool,
    ) -> Vec<BoxFuture<'static, ()>> {
        tenants
            .iter()
            .cloned()
            .map(|tenant| {
                let job_id = job_id.to_string();
                let scripts = scripts.clone();
                let registry = self.registry.clone();
                let store = self.store.clone();
                let executor = self.executor.clone();
                let dispatcher = self.dispatcher.clone();
                let soft_deadline = self.soft_deadline;
                Box::pin(async move {
                    let inputs = TenantWorkerInputs {
                        job_id: &job_id,
                        tenant: &tenant,
                        scripts: &scripts,
                        dry_run,
                        registry: &registry,
                        store: store.as_ref(),
                        executor: executor.as_ref(),
                        dispatcher: Some(dispatcher.as_ref()),
                        soft_deadline,
                    };
                    if let Err(e) = run_tenant(inputs).await {
                        log::error!("tenant worker returned an error for job {}: {}", job_id, e);
                    }
                }) as BoxFuture<'static, ()>
            })
            .collect()
    }

    /// `Finalize(job_id)` per §4.5: runs `after_job` hooks with aggregate
    /// metadata; their failure is swallowed. Does not change job status.
    ///
    /// Dispatched jobs already run this automatically once every tenant has
    /// flushed (it is wired in as the `finalizer` passed to the `Dispatcher`
    /// in [`Self::start_job`]); this method exists for callers — the CLI's
    /// `migrate` subcommand, tests — that want to await it explicitly. It is
    /// idempotent: calling it twice runs `after_job` hooks twice but never
    /// touches job status.
    pub async fn finalize(&self, job_id: &str) -> Result<()> {
        if self.store.get_job(job_id).await?.is_none() {
            return Err(OrchestratorError::NotFoundError(job_id.to_string()));
        }
        run_after_job_hooks(self.store.clone(), self.registry.clone(), job_id.to_string()).await;
        Ok(())
    }

    /// `GetJob(id)` per §4.6.
    pub async fn get_job(&self, job_id: &str) -> Result<(Job, JobProgress)> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFoundError(job_id.to_string()))?;
        let progress = JobProgress {
            total: job.total,
            completed: job.completed,
            successful: job.successful,
            failed: job.failed,
            percent: job.percent(),
        };
        Ok((job, progress))
    }

    /// `ListJobs(limit)` per §4.6.
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        self.store.list_jobs(limit).await
    }

    /// `DeleteJob(id)` per §4.6.
    pub async fn delete_job(&self, job_id: &str) -> Result<bool> {
        self.store.delete_job(job_id).await
    }

    pub async fn validate(&self, migrations_dir: &Path) -> Result<ValidationResponse> {
        Ok(load_scripts(migrations_dir)?.into())
    }
}

/// Runs `after_job` hooks for `job_id` with the aggregate metadata from
/// §4.5's `Finalize`; swallows hook failure (logged, non-fatal) and a
/// missing/already-deleted job (nothing to finalize).
async fn run_after_job_hooks<S: StateStore>(store: Arc<S>, registry: CallbackRegistry, job_id: String) {
    let job = match store.get_job(&job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            log::warn!("finalize: failed to load job {} (non-fatal): {}", job_id, e);
            return;
        }
    };

    let mut ctx = CallbackContext::new(job_id.clone(), "", ScriptSet::default());
    ctx.metadata.insert("total_tenants".to_string(), job.total.into());
    ctx.metadata.insert("successful_tenants".to_string(), job.successful.into());
    ctx.metadata.insert("failed_tenants".to_string(), job.failed.into());

    if let HookOutcome::Fail(message) = registry.run(HookKind::AfterJob, &mut ctx).await {
        log::warn!("after_job callback failed for job {} (non-fatal): {}", job_id, message);
    }
}
