//! Error taxonomy for the migration job orchestrator.
//!
//! Validation failures abort `start_job` before any job record exists; hook
//! and execution failures (including a tenant's soft-deadline timeout, which
//! a worker captures as a plain message rather than constructing a variant
//! here) are captured inside a tenant worker and turned into a failed
//! `TenantResult` rather than propagated; store and not-found errors surface
//! to callers of the query interface.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("hook '{handler}' failed: {message}")]
    HookError { handler: String, message: String },

    #[error("script execution failed: {0}")]
    ExecutionError(String),

    #[error("state store error: {0}")]
    StoreError(String),

    #[error("job '{0}' not found")]
    NotFoundError(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrchestratorError::ValidationError(message.into())
    }

    pub fn hook(handler: impl Into<String>, message: impl Into<String>) -> Self {
        OrchestratorError::HookError {
            handler: handler.into(),
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        OrchestratorError::StoreError(message.into())
    }
}
