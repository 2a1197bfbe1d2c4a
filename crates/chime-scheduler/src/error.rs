use thiserror::Error;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression is malformed or not six fields.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The target URL is unparseable or not http(s).
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A job or execution record operation failed.
    #[error("Store error: {0}")]
    Store(#[from] chime_store::StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
