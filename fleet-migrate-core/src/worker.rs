//! Tenant Worker (C4): applies one `ScriptSet` to one tenant, interleaving
//! hook invocations with script execution per the state machine in §4.4:
//!
//! ```text
//! INIT -> BEFORE_TENANT -> LOOP{ BEFORE_SCRIPT -> (EXECUTE|SKIP) -> AFTER_SCRIPT } -> AFTER_TENANT -> DONE
//!                               |                                                        |
//!                               +----------- any hook/exec failure --> FAILED <----------+
//! ```

use std::time::Duration;

use chrono::Utc;

use crate::callback::{CallbackContext, CallbackRegistry, HookKind, HookOutcome};
use crate::dispatcher::{Dispatcher, ProgressEvent};
use crate::executor::ScriptExecutor;
use crate::model::{ScriptSet, Status, TenantResult, TenantSpec};
use crate::store::StateStore;

pub struct TenantWorkerInputs<'a> {
    pub job_id: &'a str,
    pub tenant: &'a TenantSpec,
    pub scripts: &'a ScriptSet,
    pub dry_run: bool,
    pub registry: &'a CallbackRegistry,
    pub store: &'a dyn StateStore,
    pub executor: &'a dyn ScriptExecutor,
    pub dispatcher: Option<&'a dyn Dispatcher>,
    pub soft_deadline: Duration,
}

/// Runs the full per-tenant state machine and flushes the result to the
/// store. Always returns `Ok(())`: failures are captured into the
/// `TenantResult` rather than propagated, so a dispatcher's group/chain can
/// proceed regardless of this tenant's outcome (§7's propagation policy).
pub async fn run_tenant(inputs: TenantWorkerInputs<'_>) -> crate::error::Result<()> {
    let started_at = Utc::now();
    let mut result = TenantResult::new(inputs.tenant.tenant_id.clone(), started_at);

    let run = run_tenant_inner(&inputs, &mut result);
    match tokio::time::timeout(inputs.soft_deadline, run).await {
        Ok(Ok(())) => {}
        Ok(Err(message)) => {
            result.status = Status::Failed;
            result.error_message = Some(message.clone());
            run_on_error(&inputs, &message).await;
        }
        Err(_elapsed) => {
            // §7: TimeoutError inside a tenant worker is captured and
            // converted to status = FAILED with error_message, same as
            // HookError/ExecutionError, so the job's terminal mapping in
            // §3 inv. 1 only ever sees SUCCESS/FAILED tenants once terminal.
            result.status = Status::Failed;
            result.error_message = Some("Migration exceeded time limit".to_string());
            run_on_error(&inputs, "Migration exceeded time limit").await;
        }
    }

    let completed_at = Utc::now();
    result.completed_at = Some(completed_at);
    result.duration_seconds = Some((completed_at - started_at).num_milliseconds() as f64 / 1000.0);

    inputs.store.update_tenant_result(inputs.job_id, result).await
}

async fn run_on_error(inputs: &TenantWorkerInputs<'_>, message: &str) {
    let mut ctx = CallbackContext::new(inputs.job_id, inputs.tenant.tenant_id.clone(), inputs.scripts.clone());
    ctx.metadata.insert("error".to_string(), message.into());
    // on_error failures are swallowed per §4.4.
    let _ = inputs.registry.run(HookKind::OnError, &mut ctx).await;
}

/// Returns `Err(message)` on any failure that should fail the tenant;
/// mutates `result` in place as scripts are applied/skipped.
async fn run_tenant_inner(
    inputs: &TenantWorkerInputs<'_>,
    result: &mut TenantResult,
) -> Result<(), String> {
    let mut tenant_ctx = CallbackContext::new(
        inputs.job_id,
        inputs.tenant.tenant_id.clone(),
        inputs.scripts.clone(),
    );

    match inputs.registry.run(HookKind::BeforeTenant, &mut tenant_ctx).await {
        HookOutcome::Fail(message) => return Err(format!("before_tenant callback failed: {}", message)),
        HookOutcome::Skip(_) => return Err("before_tenant callback requested a skip, which is not meaningful at tenant scope".to_string()),
        HookOutcome::Proceed(_) => {}
    }

    let tenant_metadata = tenant_ctx.metadata.clone();

    if inputs.dry_run {
        result.scripts_applied = inputs.scripts.filenames();
        result.status = Status::Success;
        return Ok(());
    }

    for (i, script) in inputs.scripts.iter().enumerate() {
        let mut script_ctx = CallbackContext {
            job_id: inputs.job_id.to_string(),
            tenant_id: inputs.tenant.tenant_id.clone(),
            script: Some(script.clone()),
            scripts: inputs.scripts.clone(),
            current_script_index: i as i64,
            metadata: tenant_metadata.clone(),
        };

        match inputs.registry.run(HookKind::BeforeScript, &mut script_ctx).await {
            HookOutcome::Fail(message) => {
                return Err(format!("before_script callback failed for {}: {}", script.filename, message))
            }
            HookOutcome::Skip(_message) => {
                result.scripts_skipped.push(script.filename.clone());
                continue;
            }
            HookOutcome::Proceed(_) => {}
        }

        inputs
            .executor
            .execute(inputs.tenant, &script.content)
            .await
            .map_err(|e| format!("executing {} failed: {}", script.filename, e))?;

        result.scripts_applied.push(script.filename.clone());

        match inputs.registry.run(HookKind::AfterScript, &mut script_ctx).await {
            HookOutcome::Fail(message) => {
                return Err(format!("after_script callback failed for {}: {}", script.filename, message))
            }
            HookOutcome::Skip(_) | HookOutcome::Proceed(_) => {}
        }

        result.callback_metadata.extend(script_ctx.metadata.clone());

        if let Some(dispatcher) = inputs.dispatcher {
            let event = ProgressEvent {
                job_id: inputs.job_id.to_string(),
                tenant_id: inputs.tenant.tenant_id.clone(),
                scripts_completed: result.scripts_applied.len(),
                total_scripts: inputs.scripts.len(),
            };
            if let Err(e) = dispatcher.emit_progress(event).await {
                log::warn!("progress emit failed for tenant {}: {}", inputs.tenant.tenant_id, e);
            }
        }
    }

    match inputs.registry.run(HookKind::AfterTenant, &mut tenant_ctx).await {
        HookOutcome::Fail(message) => {
            log::warn!(
                "after_tenant callback failed for tenant {} (non-fatal): {}",
                inputs.tenant.tenant_id,
                message
            );
        }
        HookOutcome::Skip(_) | HookOutcome::Proceed(_) => {}
    }

    result.status = Status::Success;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RecordingExecutor;
    use crate::model::{Script, ScriptKind, ScriptSet};
    use crate::store::memory::InMemoryStateStore;
    use crate::model::Job;
    use std::sync::Arc;

    fn scripts(filenames: &[&str]) -> ScriptSet {
        let scripts = filenames
            .iter()
            .enumerate()
            .map(|(i, f)| Script {
                filename: f.to_string(),
                version: i.to_string(),
                description: "x".into(),
                kind: ScriptKind::Migration,
                content: format!("-- {}\nselect 1;", f),
            })
            .collect();
        ScriptSet::build(scripts).unwrap()
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

    async fn run_and_fetch(
        store: &InMemoryStateStore,
        job_id: &str,
        set: &ScriptSet,
        dry_run: bool,
        registry: &CallbackRegistry,
        executor: &dyn ScriptExecutor,
    ) -> TenantResult {
        store
            .create_job(Job::new(job_id, vec!["t1".into()], Utc::now()))
            .await
            .unwrap();

        run_tenant(TenantWorkerInputs {
            job_id,
            tenant: &tenant("t1"),
            scripts: set,
            dry_run,
            registry,
            store,
            executor,
            dispatcher: None,
            soft_deadline: Duration::from_secs(5),
        })
        .await
        .unwrap();

        store
            .get_job(job_id)
            .await
            .unwrap()
            .unwrap()
            .tenant_results
            .remove("t1")
            .unwrap()
    }

    #[tokio::test]
    async fn dry_run_fills_scripts_applied_without_executing() {
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql", "V002__addcol.sql"]);
        let registry = CallbackRegistry::new();
        let executor = RecordingExecutor::default();
        let result = run_and_fetch(&store, "job1", &set, true, &registry, &executor).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.scripts_applied, vec!["V001__init.sql", "V002__addcol.sql"]);
    }

    #[tokio::test]
    async fn execution_error_fails_tenant_and_preserves_applied_scripts() {
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql", "V002__addcol.sql"]);
        let registry = CallbackRegistry::new();
        let executor = RecordingExecutor {
            fail_on_content_containing: Some("V002__addcol.sql".to_string()),
        };
        let result = run_and_fetch(&store, "job1", &set, false, &registry, &executor).await;
        assert_eq!(result.status, Status::Failed);
        assert!(result.error_message.is_some());
        assert_eq!(result.scripts_applied, vec!["V001__init.sql"]);
    }

    #[tokio::test]
    async fn skip_directive_skips_without_executing_or_after_script() {
        use crate::callback::{FnHandler, HookOutcome};
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql", "V002__addcol.sql"]);
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
        let executor = RecordingExecutor::default();
        let result = run_and_fetch(&store, "job1", &set, false, &registry, &executor).await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.scripts_applied, vec!["V001__init.sql"]);
        assert_eq!(result.scripts_skipped, vec!["V002__addcol.sql"]);
    }

    #[tokio::test]
    async fn after_tenant_failure_is_non_fatal() {
        use crate::callback::{FnHandler, HookOutcome};
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql"]);
        let mut registry = CallbackRegistry::new();
        registry.register(
            HookKind::AfterTenant,
            Arc::new(FnHandler::new("always-fails", |_ctx: &mut CallbackContext| async {
                HookOutcome::Fail("oops".to_string())
            })),
        );
        let executor = RecordingExecutor::default();
        let result = run_and_fetch(&store, "job1", &set, false, &registry, &executor).await;
        assert_eq!(result.status, Status::Success);
    }

    #[tokio::test]
    async fn before_tenant_failure_fails_tenant_before_any_script_runs() {
        use crate::callback::{FnHandler, HookOutcome};
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql"]);
        let mut registry = CallbackRegistry::new();
        registry.register(
            HookKind::BeforeTenant,
            Arc::new(FnHandler::new("always-fails", |_ctx: &mut CallbackContext| async {
                HookOutcome::Fail("nope".to_string())
            })),
        );
        let executor = RecordingExecutor::default();
        let result = run_and_fetch(&store, "job1", &set, false, &registry, &executor).await;
        assert_eq!(result.status, Status::Failed);
        assert!(result.scripts_applied.is_empty());
    }

    #[tokio::test]
    async fn timeout_preserves_partial_progress_and_sets_message() {
        use crate::callback::{FnHandler, HookOutcome};
        let store = InMemoryStateStore::new();
        let set = scripts(&["V001__init.sql"]);
        let mut registry = CallbackRegistry::new();
        registry.register(
            HookKind::BeforeScript,
            Arc::new(FnHandler::new("slow", |_ctx: &mut CallbackContext| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                HookOutcome::ok()
            })),
        );
        let executor = RecordingExecutor::default();

        store
            .create_job(Job::new("job1", vec!["t1".into()], Utc::now()))
            .await
            .unwrap();
        run_tenant(TenantWorkerInputs {
            job_id: "job1",
            tenant: &tenant("t1"),
            scripts: &set,
            dry_run: false,
            registry: &registry,
            store: &store,
            executor: &executor,
            dispatcher: None,
            soft_deadline: Duration::from_millis(5),
        })
        .await
        .unwrap();

        let result = store
            .get_job("job1")
            .await
            .unwrap()
            .unwrap()
            .tenant_results
            .remove("t1")
            .unwrap();
        assert_eq!(result.error_message, Some("Migration exceeded time limit".to_string()));
        assert_eq!(result.status, Status::Failed);
    }
}
