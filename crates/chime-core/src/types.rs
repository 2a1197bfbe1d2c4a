use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job definition (UUIDv4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a single job firing (UUIDv7, time-sortable so
/// primary-key order tracks creation order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for ExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Delivery guarantee for a job's outgoing requests.
///
/// `AtLeastOnce` retries transient failures (5xx, network errors) up to the
/// configured attempt budget. 4xx responses are never retried in any mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    AtLeastOnce,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryMode::AtLeastOnce => "at_least_once",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "at_least_once" => Ok(DeliveryMode::AtLeastOnce),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// Lifecycle state of a single execution.
///
/// Transitions are one-way: pending -> running -> success | failed.
/// A failed outcome may also be recorded straight from pending when the
/// run aborts before dispatch started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Record created, dispatch not yet started.
    Pending,
    /// Dispatch (including retries) in flight.
    Running,
    /// Terminal: the target answered with a 2xx.
    Success,
    /// Terminal: delivery failed or the run aborted.
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Six-field cron expression: second minute hour day month weekday.
    pub schedule: String,
    /// HTTP(S) URL the job POSTs to when it fires.
    pub target: String,
    pub delivery_mode: DeliveryMode,
    /// Inactive jobs keep their definition but hold no live trigger.
    pub active: bool,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last definition change.
    pub updated_at: String,
}

/// A single recorded firing of a job.
///
/// `job_id` is a weak reference: executions are kept for auditing even
/// after their job is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub status: ExecutionStatus,
    /// RFC3339 instant the firing was recorded.
    pub scheduled_at: String,
    /// Set when dispatch starts; stays NULL if the run aborts first.
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// completed_at minus started_at, present only for terminal states
    /// that actually started.
    pub duration_ms: Option<i64>,
    /// Last observed HTTP status, if any response was received.
    pub http_status: Option<u16>,
    pub error: Option<String>,
    /// Attempts consumed beyond the first.
    pub retry_count: u32,
}

/// Fields required to create a new job. Jobs start active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub schedule: String,
    pub target: String,
    pub delivery_mode: DeliveryMode,
}

/// Partial update of a job definition; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateJobRequest {
    pub schedule: Option<String>,
    pub target: Option<String>,
    pub delivery_mode: Option<DeliveryMode>,
    pub active: Option<bool>,
}
