//! Ambient HTTP surface (out of scope for the core per spec §1, built here
//! as an `axum` router). Grounded on `original_source/app/routers/migrations.py`,
//! `app/routers/healthcheck.py`, and `app/app_factory.py`; CORS/tracing
//! layered with `tower-http`, matching the stack `fourthplaces-mntogether`
//! ships for its own API surface.

mod dto;
mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use fleet_migrate_core::orchestrator::Orchestrator;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatcher_tokio::TokioDispatcher;
use crate::store_redis::RedisStateStore;

pub type AppOrchestrator = Orchestrator<RedisStateStore, TokioDispatcher>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AppOrchestrator>,
    pub default_list_limit: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/migrations/validate", post(handlers::validate))
        .route("/api/migrations/start", post(handlers::start))
        .route("/api/migrations/jobs", get(handlers::list_jobs))
        .route("/api/migrations/jobs/:id", get(handlers::get_job))
        .route("/api/migrations/jobs/:id", delete(handlers::delete_job))
        .route("/app/health/", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
