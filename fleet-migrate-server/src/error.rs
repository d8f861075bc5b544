//! Server-level error type: wraps `OrchestratorError` plus the collaborator
//! errors (Redis, Postgres, dynamic loading) that only exist on this side of
//! the core/server boundary, and maps both onto HTTP responses and CLI exit
//! codes per spec §6/§7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use fleet_migrate_core::error::OrchestratorError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("config error: {0}")]
    Config(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("callback plugin error: {0}")]
    Plugin(String),

    /// Not a failure to start or run — the job itself finished with some
    /// tenants failed. Only raised by the CLI wrapper's wait loop.
    #[error("job finished with partial success: {0}")]
    Partial(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Orchestrator(OrchestratorError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ServerError::Orchestrator(OrchestratorError::NotFoundError(_)) => StatusCode::NOT_FOUND,
            ServerError::Orchestrator(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) | ServerError::Plugin(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Redis(_) | ServerError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Partial(_) => StatusCode::OK,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Exit codes for the CLI wrapper per spec §6: 0 success, 1 validation
/// failed, 2 startup failed, 3 partial.
pub fn exit_code(error: &ServerError) -> i32 {
    match error {
        ServerError::Orchestrator(OrchestratorError::ValidationError(_)) => 1,
        ServerError::Config(_) | ServerError::Redis(_) | ServerError::Plugin(_) => 2,
        ServerError::Database(_) => 2,
        ServerError::Orchestrator(_) => 2,
        ServerError::Partial(_) => 3,
    }
}
