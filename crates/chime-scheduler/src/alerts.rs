use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::error;

use chime_core::types::{ExecutionId, Job, JobId};

/// One recorded execution failure.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub job_id: JobId,
    pub execution_id: ExecutionId,
    /// RFC3339 time the failure was recorded.
    pub timestamp: String,
    pub error: String,
}

/// In-memory ring of recent failure alerts, shared across the engine and the
/// HTTP layer.
///
/// Recording never fails and never blocks an execution: the alert is the
/// byproduct of a failure, not a step that can itself fail the job.
#[derive(Clone, Default)]
pub struct AlertLog {
    inner: Arc<Mutex<Vec<Alert>>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed execution and emit it on the error log.
    pub fn record(&self, job: &Job, execution_id: &ExecutionId, error_msg: &str) {
        error!(
            job_id = %job.id,
            execution_id = %execution_id,
            target = %job.target,
            schedule = %job.schedule,
            error = %error_msg,
            "job execution failed"
        );
        let alert = Alert {
            job_id: job.id.clone(),
            execution_id: execution_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: error_msg.to_string(),
        };
        self.inner.lock().unwrap().push(alert);
    }

    /// Most recent alerts first, up to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.inner.lock().unwrap();
        alerts.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent alerts for one job, newest first.
    pub fn for_job(&self, job_id: &JobId) -> Vec<Alert> {
        let alerts = self.inner.lock().unwrap();
        alerts
            .iter()
            .rev()
            .filter(|a| &a.job_id == job_id)
            .cloned()
            .collect()
    }
}
