//! End-to-end tests against the public `Orchestrator` API: real files on
//! disk through the loader, an in-memory store, and a dispatcher test
//! double, covering the scenarios in spec §8 that the unit tests inside
//! individual modules don't already exercise directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_migrate_core::callback::{CallbackContext, CallbackRegistry, FnHandler, HookKind, HookOutcome};
use fleet_migrate_core::dispatcher::{DispatchHandle, Dispatcher, ProgressEvent};
use fleet_migrate_core::error::{OrchestratorError, Result};
use fleet_migrate_core::executor::RecordingExecutor;
use fleet_migrate_core::model::{Mode, Status, TenantResult, TenantSpec};
use fleet_migrate_core::orchestrator::{Orchestrator, StartJobRequest, StartOutcome};
use fleet_migrate_core::store::memory::InMemoryStateStore;
use fleet_migrate_core::store::StateStore;
use futures::future::BoxFuture;

/// Runs tenant futures to completion on the current runtime before
/// returning, including the finalizer — a synchronous test double standing
/// in for a production dispatcher's background group/chain plus completion
/// callback, so assertions right after `start_job` observe the final state
/// without a poll loop.
struct TestDispatcher;

#[async_trait::async_trait]
impl Dispatcher for TestDispatcher {
    async fn spawn_parallel(
        &self,
        jobs: Vec<BoxFuture<'static, ()>>,
        finalizer: BoxFuture<'static, ()>,
    ) -> Result<DispatchHandle> {
        let mut set = tokio::task::JoinSet::new();
        let mut dispatch_ids = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.into_iter().enumerate() {
            dispatch_ids.push(format!("tenant-{}", i));
            set.spawn(job);
        }
        while set.join_next().await.is_some() {}
        finalizer.await;
        Ok(DispatchHandle { dispatch_ids })
    }

    async fn spawn_sequential(
        &self,
        jobs: Vec<BoxFuture<'static, ()>>,
        finalizer: BoxFuture<'static, ()>,
    ) -> Result<DispatchHandle> {
        let mut dispatch_ids = Vec::with_capacity(jobs.len());
        for (i, job) in jobs.into_iter().enumerate() {
            job.await;
            dispatch_ids.push(format!("tenant-{}", i));
        }
        finalizer.await;
        Ok(DispatchHandle { dispatch_ids })
    }

    async fn emit_progress(&self, _event: ProgressEvent) -> Result<()> {
        Ok(())
    }
}

fn tenant(id: &str) -> TenantSpec {
    TenantSpec {
        tenant_id: id.to_string(),
        tenant_name: None,
        user: "u".into(),
        password: "p".into(),
        database_name: "d".into(),
        host: Some("h".into()),
        connection_string: None,
    }
}

fn make_orchestrator(
    registry: CallbackRegistry,
    executor: RecordingExecutor,
) -> Orchestrator<InMemoryStateStore, TestDispatcher> {
    Orchestrator::new(
        registry,
        Arc::new(InMemoryStateStore::new()),
        Arc::new(TestDispatcher),
        Arc::new(executor),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn execution_error_shared_across_all_tenants_yields_failed_job() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V001__init.sql"), "select 1;").unwrap();
    std::fs::write(dir.path().join("V002__addcol.sql"), "select 2;").unwrap();

    let executor = RecordingExecutor {
        fail_on_content_containing: Some("select 2".to_string()),
    };
    let orchestrator = make_orchestrator(CallbackRegistry::new(), executor);

    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a"), tenant("b")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let (job, progress) = orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, Status::Failed);
    assert_eq!(progress.failed, 2);
    for result in job.tenant_results.values() {
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.scripts_applied, vec!["V001__init.sql".to_string()]);
        assert!(result.error_message.is_some());
    }
}

/// Fails `execute` for one named tenant, regardless of script content —
/// lets the partial-job test below fail exactly one of several tenants
/// sharing the same `ScriptSet`.
struct TenantFailingExecutor {
    failing_tenant: String,
}

#[async_trait::async_trait]
impl fleet_migrate_core::executor::ScriptExecutor for TenantFailingExecutor {
    async fn execute(&self, tenant: &TenantSpec, _sql: &str) -> Result<()> {
        if tenant.tenant_id == self.failing_tenant {
            Err(OrchestratorError::ExecutionError(format!(
                "simulated failure for tenant {}",
                tenant.tenant_id
            )))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn execution_error_on_one_tenant_among_several_yields_partial_job() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V001__addcol.sql"), "select 1;").unwrap();

    let orchestrator = Orchestrator::new(
        CallbackRegistry::new(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(TestDispatcher),
        Arc::new(TenantFailingExecutor {
            failing_tenant: "b".to_string(),
        }),
        Duration::from_secs(5),
    );

    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a"), tenant("b")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let (job, _progress) = orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, Status::Partial);
    assert_eq!(job.tenant_results["a"].status, Status::Success);
    assert_eq!(job.tenant_results["b"].status, Status::Failed);
}

#[tokio::test]
async fn before_tenant_hook_failing_for_one_tenant_yields_partial_job() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V001__init.sql"), "select 1;").unwrap();

    let mut registry = CallbackRegistry::new();
    registry.register(
        HookKind::BeforeTenant,
        Arc::new(FnHandler::new("reject-b", |ctx: &mut CallbackContext| async move {
            if ctx.tenant_id == "b" {
                HookOutcome::Fail("tenant b is not provisioned yet".to_string())
            } else {
                HookOutcome::ok()
            }
        })),
    );
    let orchestrator = make_orchestrator(registry, RecordingExecutor::default());

    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a"), tenant("b")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let (job, _progress) = orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, Status::Partial);
    assert_eq!(job.tenant_results["a"].status, Status::Success);
    assert_eq!(job.tenant_results["b"].status, Status::Failed);
}

#[tokio::test]
async fn version_conflict_rejects_start_job_with_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();
    std::fs::write(dir.path().join("V1__b.sql"), "select 2;").unwrap();

    let orchestrator = make_orchestrator(CallbackRegistry::new(), RecordingExecutor::default());
    let result = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await;

    assert!(matches!(result, Err(OrchestratorError::ValidationError(_))));
}

#[tokio::test]
async fn version_conflict_is_visible_through_validate() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();
    std::fs::write(dir.path().join("V1__b.sql"), "select 2;").unwrap();

    let orchestrator = make_orchestrator(CallbackRegistry::new(), RecordingExecutor::default());
    let report = orchestrator.validate(dir.path()).await.unwrap();
    assert!(!report.valid);
    assert!(!report.errors.is_empty());
}

#[tokio::test]
async fn dangerous_content_without_transaction_wrapping_is_a_warning_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__drop_x.sql"), "drop table x;").unwrap();

    let orchestrator = make_orchestrator(CallbackRegistry::new(), RecordingExecutor::default());
    let report = orchestrator.validate(dir.path()).await.unwrap();
    assert!(report.valid);
    assert!(report.warnings.iter().any(|w| w.contains("dangerous operation")));
}

#[tokio::test]
async fn filename_not_matching_grammar_is_ignored_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();
    std::fs::write(dir.path().join("init.sql"), "select 2;").unwrap();

    let orchestrator = make_orchestrator(CallbackRegistry::new(), RecordingExecutor::default());
    let report = orchestrator.validate(dir.path()).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.scripts_found, 1);
    assert!(report.warnings.iter().any(|w| w.contains("init.sql")));
}

#[tokio::test]
async fn sequential_mode_runs_tenant_two_even_when_tenant_one_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();

    let executor = RecordingExecutor {
        fail_on_content_containing: Some("select 1".to_string()),
    };
    let orchestrator = make_orchestrator(CallbackRegistry::new(), executor);

    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a"), tenant("b")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: false,
            job_name: None,
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let (job, progress) = orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(progress.completed, 2);
    assert!(job.tenant_results.contains_key("a"));
    assert!(job.tenant_results.contains_key("b"));
    assert_eq!(job.tenant_results["a"].status, Status::Failed);
    assert_eq!(job.tenant_results["b"].status, Status::Failed);
}

#[tokio::test]
async fn skip_directive_propagates_end_to_end_through_start_job() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V001__init.sql"), "select 1;").unwrap();
    std::fs::write(dir.path().join("V002__addcol.sql"), "select 2;").unwrap();

    let mut registry = CallbackRegistry::new();
    registry.register(
        HookKind::BeforeScript,
        Arc::new(FnHandler::new("skip-second", |ctx: &mut CallbackContext| async move {
            if ctx.script.as_ref().map(|s| s.filename.as_str()) == Some("V002__addcol.sql") {
                HookOutcome::Skip(Some("not today".to_string()))
            } else {
                HookOutcome::ok()
            }
        })),
    );
    let orchestrator = make_orchestrator(registry, RecordingExecutor::default());

    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let (job, _progress) = orchestrator.get_job(&job_id).await.unwrap();
    assert_eq!(job.status, Status::Success);
    let result = &job.tenant_results["a"];
    assert_eq!(result.scripts_applied, vec!["V001__init.sql".to_string()]);
    assert_eq!(result.scripts_skipped, vec!["V002__addcol.sql".to_string()]);
}

#[tokio::test]
async fn list_jobs_and_delete_job_round_trip_through_the_public_api() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();

    let orchestrator = make_orchestrator(CallbackRegistry::new(), RecordingExecutor::default());
    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: Some("nightly".to_string()),
        })
        .await
        .unwrap();
    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        _ => panic!("expected a started job"),
    };

    let jobs = orchestrator.list_jobs(10).await.unwrap();
    assert!(jobs.iter().any(|j| j.job_id == job_id));

    assert!(orchestrator.delete_job(&job_id).await.unwrap());
    assert!(!orchestrator.delete_job(&job_id).await.unwrap());
    assert!(matches!(
        orchestrator.get_job(&job_id).await,
        Err(OrchestratorError::NotFoundError(_))
    ));
}

#[tokio::test]
async fn after_job_hook_runs_automatically_once_dispatch_completes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("V1__a.sql"), "select 1;").unwrap();

    let seen = Arc::new(std::sync::Mutex::new(None));
    let mut registry = CallbackRegistry::new();
    {
        let seen = seen.clone();
        registry.register(
            HookKind::AfterJob,
            Arc::new(FnHandler::new("record-aggregate", move |ctx: &mut CallbackContext| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(ctx.metadata.clone());
                    HookOutcome::ok()
                }
            })),
        );
    }
    let orchestrator = make_orchestrator(registry, RecordingExecutor::default());

    orchestrator
        .start_job(StartJobRequest {
            tenants: vec![tenant("a")],
            migrations_dir: dir.path().to_path_buf(),
            mode: Mode::Apply,
            parallel: true,
            job_name: None,
        })
        .await
        .unwrap();

    // No explicit call to `finalize` here: the dispatcher's finalizer ran it.
    let recorded = seen.lock().unwrap().clone().expect("after_job hook should have run");
    assert_eq!(recorded.get("total_tenants").unwrap(), &serde_json::json!(1));
    assert_eq!(recorded.get("successful_tenants").unwrap(), &serde_json::json!(1));
}

#[tokio::test]
async fn update_tenant_result_is_idempotent_against_the_same_tenant_id() {
    let store = InMemoryStateStore::new();
    let job_id = "job1";
    store
        .create_job(fleet_migrate_core::model::Job::new(
            job_id,
            vec!["a".to_string()],
            Utc::now(),
        ))
        .await
        .unwrap();

    let make_result = || {
        let mut r = TenantResult::new("a", Utc::now());
        r.status = Status::Success;
        r.scripts_applied = vec!["V1__a.sql".to_string()];
        r
    };

    store.update_tenant_result(job_id, make_result()).await.unwrap();
    store.update_tenant_result(job_id, make_result()).await.unwrap();

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.completed, 1);
    assert_eq!(job.successful, 1);
    assert_eq!(job.status, Status::Success);
}
