//! Tenant migration job orchestrator: loads a script set, schedules
//! per-tenant execution, drives each tenant through a hook-interleaved
//! state machine, and persists aggregate state durably.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fleet_migrate_core::callback::CallbackRegistry;
//! use fleet_migrate_core::executor::RecordingExecutor;
//! use fleet_migrate_core::model::{Mode, TenantSpec};
//! use fleet_migrate_core::orchestrator::{Orchestrator, StartJobRequest, StartOutcome};
//! use fleet_migrate_core::store::memory::InMemoryStateStore;
//!
//! # async fn run(dispatcher: impl fleet_migrate_core::dispatcher::Dispatcher + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     CallbackRegistry::new(),
//!     Arc::new(InMemoryStateStore::new()),
//!     Arc::new(dispatcher),
//!     Arc::new(RecordingExecutor::default()),
//!     Duration::from_secs(3600),
//! );
//! let outcome = orchestrator
//!     .start_job(StartJobRequest {
//!         tenants: vec![],
//!         migrations_dir: "./migrations".into(),
//!         mode: Mode::DryRun,
//!         parallel: true,
//!         job_name: None,
//!     })
//!     .await?;
//! if let StartOutcome::Started(resp) = outcome {
//!     println!("started job {}", resp.job_id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`model`] — Script, ScriptSet, TenantSpec, Job, TenantResult, Status
//! - [`loader`] — filename grammar parsing, content validation, conflict detection (C1)
//! - [`callback`] — hook registration and the invocation contract (C2)
//! - [`store`] — the `StateStore` trait and an in-memory reference implementation (C3)
//! - [`executor`] — the `ScriptExecutor` trait, the boundary to the actual SQL driver
//! - [`dispatcher`] — the `Dispatcher` trait, the boundary to the task-queue transport
//! - [`worker`] — the per-tenant execution state machine (C4)
//! - [`orchestrator`] — job creation, fan-out, finalize, and read-only queries (C5 + C6)
//! - [`error`] — the error taxonomy

pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod worker;
