//! Service health, metrics, and cross-job execution queries.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use chime_core::types::JobId;

use crate::app::AppState;
use crate::http::{internal_error, ApiError};

/// GET /health: liveness probe, checks the database connection.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.jobs.ping() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "error": e.to_string() })),
        ));
    }

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    })))
}

/// GET /metrics: aggregate counters over jobs, executions, and alerts.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let jobs = state.jobs.counts().map_err(internal_error)?;
    let executions = state.executions.stats().map_err(internal_error)?;

    let success_rate = if executions.total > 0 {
        format!(
            "{:.2}%",
            executions.succeeded as f64 / executions.total as f64 * 100.0
        )
    } else {
        "0.00%".to_string()
    };

    Ok(Json(json!({
        "jobs": { "total": jobs.total, "active": jobs.active },
        "executions": {
            "total": executions.total,
            "succeeded": executions.succeeded,
            "failed": executions.failed,
            "success_rate": success_rate,
            "recent_hour": executions.last_hour,
            "average_duration_ms": executions.average_duration_ms,
        },
        "scheduler": { "active_triggers": state.scheduler.trigger_count() },
        "alerts": { "recent_failures": state.alerts.recent(10).len() },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

#[derive(Deserialize)]
pub struct AlertsQuery {
    #[serde(default = "default_alerts_limit")]
    pub limit: usize,
}

fn default_alerts_limit() -> usize {
    50
}

/// GET /alerts: recent failure alerts across all jobs, newest first.
pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Json<Value> {
    let alerts = state.alerts.recent(query.limit);
    Json(json!({ "count": alerts.len(), "alerts": alerts }))
}

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

/// GET /executions/recent: latest executions across all jobs.
pub async fn recent_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Value>, ApiError> {
    let executions = state
        .executions
        .recent(query.limit)
        .map_err(internal_error)?;
    Ok(Json(json!({ "count": executions.len(), "executions": executions })))
}

#[derive(Deserialize)]
pub struct FailedQuery {
    pub job_id: Option<String>,
    #[serde(default = "default_failed_limit")]
    pub limit: usize,
}

fn default_failed_limit() -> usize {
    50
}

/// GET /executions/failed: failed executions, optionally for one job.
pub async fn failed_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<Value>, ApiError> {
    let job_id = query.job_id.map(JobId::from);
    let executions = state
        .executions
        .failed(job_id.as_ref(), query.limit)
        .map_err(internal_error)?;
    Ok(Json(json!({ "count": executions.len(), "executions": executions })))
}
