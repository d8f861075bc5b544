//! Request/response bodies for the HTTP surface (spec §6), grounded on
//! `original_source/app/models/models.py`'s Pydantic response shapes.

use chrono::{DateTime, Utc};
use fleet_migrate_core::model::{Job, Mode, Status, TenantResult, TenantSpec};
use fleet_migrate_core::orchestrator::JobProgress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub migrations_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub tenants: Vec<TenantSpec>,
    pub migrations_dir: PathBuf,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    pub job_name: Option<String>,
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StartResponse {
    Started(fleet_migrate_core::orchestrator::StartJobResponse),
    Validated(fleet_migrate_core::orchestrator::ValidationResponse),
}

#[derive(Debug, Serialize)]
pub struct TenantResultResponse {
    pub status: Status,
    pub scripts_applied: Vec<String>,
    pub scripts_skipped: Vec<String>,
    pub callback_metadata: serde_json::Map<String, serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

impl From<&TenantResult> for TenantResultResponse {
    fn from(r: &TenantResult) -> Self {
        TenantResultResponse {
            status: r.status,
            scripts_applied: r.scripts_applied.clone(),
            scripts_skipped: r.scripts_skipped.clone(),
            callback_metadata: r.callback_metadata.clone(),
            error_message: r.error_message.clone(),
            started_at: r.started_at,
            completed_at: r.completed_at,
            duration_seconds: r.duration_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: Status,
    pub progress: JobProgress,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tenant_results: BTreeMap<String, TenantResultResponse>,
}

impl JobStatusResponse {
    pub fn from_job(job: Job, progress: JobProgress) -> Self {
        let tenant_results = job
            .tenant_results
            .iter()
            .map(|(id, r)| (id.clone(), TenantResultResponse::from(r)))
            .collect();
        JobStatusResponse {
            job_id: job.job_id,
            status: job.status,
            progress,
            started_at: job.started_at,
            completed_at: job.completed_at,
            tenant_results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListItem {
    pub job_id: String,
    pub status: Status,
    pub total_tenants: usize,
    pub successful_tenants: usize,
    pub failed_tenants: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobListItem {
    fn from(job: Job) -> Self {
        JobListItem {
            job_id: job.job_id,
            status: job.status,
            total_tenants: job.total,
            successful_tenants: job.successful,
            failed_tenants: job.failed,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeleteJobResponse {
    pub job_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub redis: &'static str,
    pub timestamp: DateTime<Utc>,
}
