use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No execution with the given ID exists.
    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// The requested status change would move an execution backwards
    /// (e.g. re-running a terminal execution).
    #[error("Invalid execution transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
