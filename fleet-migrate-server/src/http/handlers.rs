use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fleet_migrate_core::error::OrchestratorError;
use fleet_migrate_core::model::Mode;
use fleet_migrate_core::orchestrator::{StartJobRequest, StartOutcome};
use serde_json::json;

use super::dto::{
    DeleteJobResponse, HealthResponse, JobListItem, JobStatusResponse, ListJobsQuery, StartRequest,
    StartResponse, ValidateRequest,
};
use super::AppState;
use crate::error::ServerError;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "fleet-migrate",
        "status": "operational",
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.list_jobs(1).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse {
            status: "healthy",
            redis: "connected",
            timestamp: chrono::Utc::now(),
        })),
        Err(e) => {
            log::error!("health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse {
                status: "unhealthy",
                redis: "disconnected",
                timestamp: chrono::Utc::now(),
            }))
        }
    }
}

pub async fn validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let report = state.orchestrator.validate(&req.migrations_dir).await?;
    Ok(Json(report))
}

/// `POST /api/migrations/start`: 202 Accepted on a started job; `mode ==
/// validate_only` returns the validation report instead and creates nothing.
pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let validate_only = req.mode == Mode::ValidateOnly;
    let outcome = state
        .orchestrator
        .start_job(StartJobRequest {
            tenants: req.tenants,
            migrations_dir: req.migrations_dir,
            mode: req.mode,
            parallel: req.parallel,
            job_name: req.job_name,
        })
        .await?;

    match outcome {
        StartOutcome::Started(resp) => Ok((StatusCode::ACCEPTED, Json(StartResponse::Started(resp)))),
        StartOutcome::Validated(resp) => {
            let status = if validate_only { StatusCode::OK } else { StatusCode::BAD_REQUEST };
            Ok((status, Json(StartResponse::Validated(resp))))
        }
    }
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let (job, progress) = state.orchestrator.get_job(&job_id).await?;
    Ok(Json(JobStatusResponse::from_job(job, progress)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let limit = query.limit.unwrap_or(state.default_list_limit);
    let jobs = state.orchestrator.list_jobs(limit).await?;
    let items: Vec<JobListItem> = jobs.into_iter().map(JobListItem::from).collect();
    Ok(Json(items))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let deleted = state.orchestrator.delete_job(&job_id).await?;
    if !deleted {
        return Err(ServerError::Orchestrator(OrchestratorError::NotFoundError(job_id)));
    }
    Ok(Json(DeleteJobResponse {
        job_id: job_id.clone(),
        message: "job history deleted".to_string(),
    }))
}

