use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use chime_scheduler::{AlertLog, Scheduler};
use chime_store::{ExecutionStore, JobStore};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub jobs: JobStore,
    pub executions: ExecutionStore,
    pub scheduler: Scheduler,
    pub alerts: AlertLog,
    /// Process start, for the health endpoint's uptime.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        jobs: JobStore,
        executions: ExecutionStore,
        scheduler: Scheduler,
        alerts: AlertLog,
    ) -> Self {
        Self {
            jobs,
            executions,
            scheduler,
            alerts,
            started_at: Instant::now(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::observability::health))
        .route("/metrics", get(crate::http::observability::metrics))
        .route("/alerts", get(crate::http::observability::recent_alerts))
        .route(
            "/executions/recent",
            get(crate::http::observability::recent_executions),
        )
        .route(
            "/executions/failed",
            get(crate::http::observability::failed_executions),
        )
        .route(
            "/jobs",
            post(crate::http::jobs::create_job).get(crate::http::jobs::list_jobs),
        )
        .route(
            "/jobs/{id}",
            get(crate::http::jobs::get_job)
                .put(crate::http::jobs::update_job)
                .delete(crate::http::jobs::delete_job),
        )
        .route("/jobs/{id}/trigger", post(crate::http::jobs::trigger_job))
        .route(
            "/jobs/{id}/executions",
            get(crate::http::jobs::job_executions),
        )
        .route("/jobs/{id}/alerts", get(crate::http::jobs::job_alerts))
        .fallback(not_found)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "endpoint not found" })),
    )
}
