//! Job CRUD and manual-trigger endpoints under `/jobs`.
//!
//! Validation happens here, at the boundary: schedules and targets are
//! checked before anything is persisted, so the stores and the scheduler
//! only ever see well-formed jobs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use chime_core::types::{CreateJobRequest, DeliveryMode, Job, JobId, UpdateJobRequest};
use chime_scheduler::{dispatch, schedule};

use crate::app::AppState;
use crate::http::{api_error, internal_error, ApiError};

#[derive(Deserialize)]
pub struct CreateJobBody {
    pub schedule: Option<String>,
    pub target: Option<String>,
    pub delivery_mode: Option<String>,
}

/// POST /jobs: validate, persist, and schedule a new job.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (Some(schedule_expr), Some(target), Some(mode)) =
        (body.schedule, body.target, body.delivery_mode)
    else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "missing required fields: schedule, target, delivery_mode",
        ));
    };

    let delivery_mode: DeliveryMode = mode
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, e))?;
    schedule::validate(&schedule_expr)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    dispatch::validate_target(&target)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let job = state
        .jobs
        .create(&CreateJobRequest {
            schedule: schedule_expr,
            target,
            delivery_mode,
        })
        .map_err(internal_error)?;

    if let Err(e) = state.scheduler.schedule_job(&job) {
        error!(job_id = %job.id, error = %e, "failed to schedule new job");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "job_id": job.id, "message": "job created and scheduled" })),
    ))
}

/// GET /jobs: all active job definitions.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let jobs = state.jobs.list_active().map_err(internal_error)?;
    Ok(Json(json!({ "count": jobs.len(), "jobs": jobs })))
}

/// GET /jobs/{id}: full job definition or 404.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job_id = JobId::from(id);
    let job = state
        .jobs
        .get(&job_id)
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "job not found"))?;
    Ok(Json(job))
}

#[derive(Deserialize)]
pub struct UpdateJobBody {
    pub schedule: Option<String>,
    pub target: Option<String>,
    pub delivery_mode: Option<String>,
    pub active: Option<bool>,
}

/// PUT /jobs/{id}: partial update, then re-register or drop the trigger.
pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateJobBody>,
) -> Result<Json<Value>, ApiError> {
    if let Some(ref expr) = body.schedule {
        schedule::validate(expr).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    }
    if let Some(ref target) = body.target {
        dispatch::validate_target(target)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    }
    let delivery_mode = body
        .delivery_mode
        .map(|m| m.parse::<DeliveryMode>())
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let job_id = JobId::from(id);
    let updated = state
        .jobs
        .update(
            &job_id,
            &UpdateJobRequest {
                schedule: body.schedule,
                target: body.target,
                delivery_mode,
                active: body.active,
            },
        )
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "job not found"))?;

    if updated.active {
        if let Err(e) = state.scheduler.schedule_job(&updated) {
            error!(job_id = %updated.id, error = %e, "failed to reschedule updated job");
        }
    } else {
        state.scheduler.unschedule_job(&updated.id);
    }

    Ok(Json(json!({ "job_id": updated.id, "message": "job updated" })))
}

/// DELETE /jobs/{id}: unschedule, then remove the definition.
///
/// Execution history for the job is kept.
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = JobId::from(id);
    // Stop the trigger before the row disappears.
    state.scheduler.unschedule_job(&job_id);

    let deleted = state.jobs.delete(&job_id).map_err(internal_error)?;
    if !deleted {
        return Err(api_error(StatusCode::NOT_FOUND, "job not found"));
    }
    Ok(Json(json!({ "job_id": job_id, "message": "job deleted" })))
}

/// POST /jobs/{id}/trigger: run the job now and wait for the outcome.
pub async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = JobId::from(id);
    let job = state
        .jobs
        .get(&job_id)
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "job not found"))?;

    state
        .scheduler
        .execute_job(&job, true)
        .await
        .map_err(internal_error)?;

    Ok(Json(json!({ "job_id": job_id, "message": "job triggered" })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    5
}

/// GET /jobs/{id}/executions: most recent firings, newest first.
pub async fn job_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let job_id = JobId::from(id);
    if state.jobs.get(&job_id).map_err(internal_error)?.is_none() {
        return Err(api_error(StatusCode::NOT_FOUND, "job not found"));
    }

    let executions = state
        .executions
        .last_for_job(&job_id, query.limit)
        .map_err(internal_error)?;
    Ok(Json(json!({ "job_id": job_id, "executions": executions })))
}

/// GET /jobs/{id}/alerts: recorded failures for one job, newest first.
pub async fn job_alerts(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<Value> {
    let job_id = JobId::from(id);
    let alerts = state.alerts.for_job(&job_id);
    Json(json!({ "job_id": job_id, "alerts": alerts }))
}
