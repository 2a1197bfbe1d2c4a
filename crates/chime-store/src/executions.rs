use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::instrument;

use chime_core::types::{Execution, ExecutionId, ExecutionStatus, JobId};

use crate::error::{Result, StoreError};

const EXECUTION_COLUMNS: &str = "id, job_id, status, scheduled_at, started_at, completed_at,
     duration_ms, http_status, error, retry_count";

/// Aggregate execution counters for the metrics endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionStats {
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// Mean duration over terminal executions that recorded one, rounded
    /// to whole milliseconds. `None` when no such execution exists.
    pub average_duration_ms: Option<i64>,
    /// Executions scheduled within the last hour.
    pub last_hour: i64,
}

/// Thread-safe store for execution lifecycle records.
///
/// Status changes go through the `mark_*` methods, which guard on the
/// expected prior status in the UPDATE itself. An execution can never
/// leave a terminal state, no matter how call sites race.
#[derive(Clone)]
pub struct ExecutionStore {
    db: Arc<Mutex<Connection>>,
}

impl ExecutionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    /// Record a new firing in `pending` state at the current instant.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn create(&self, job_id: &JobId) -> Result<Execution> {
        let id = ExecutionId::new();
        let now = Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO executions (id, job_id, status, scheduled_at, retry_count)
             VALUES (?1, ?2, 'pending', ?3, 0)",
            rusqlite::params![id.as_str(), job_id.as_str(), now],
        )?;

        Ok(Execution {
            id,
            job_id: job_id.clone(),
            status: ExecutionStatus::Pending,
            scheduled_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            http_status: None,
            error: None,
            retry_count: 0,
        })
    }

    /// Move a pending execution to `running`, stamping `started_at`.
    #[instrument(skip(self), fields(execution_id = %id))]
    pub fn mark_running(&self, id: &ExecutionId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE executions SET status = 'running', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![now, id.as_str()],
        )?;
        if rows_changed == 0 {
            return Err(transition_error(&db, id, ExecutionStatus::Running));
        }
        Ok(())
    }

    /// Complete a running execution successfully and return the final record.
    #[instrument(skip(self), fields(execution_id = %id))]
    pub fn mark_success(
        &self,
        id: &ExecutionId,
        http_status: Option<u16>,
        retries: u32,
    ) -> Result<Execution> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        let duration_ms = elapsed_since_start(&db, id, now)?;

        let rows_changed = db.execute(
            "UPDATE executions
             SET status = 'success', completed_at = ?1, duration_ms = ?2,
                 http_status = ?3, retry_count = ?4
             WHERE id = ?5 AND status = 'running'",
            rusqlite::params![
                now.to_rfc3339(),
                duration_ms,
                http_status,
                retries,
                id.as_str()
            ],
        )?;
        if rows_changed == 0 {
            return Err(transition_error(&db, id, ExecutionStatus::Success));
        }
        read_execution(&db, id)
    }

    /// Terminate an execution as failed and return the final record.
    ///
    /// Accepted from both `pending` and `running`: a run that aborts before
    /// dispatch still ends up failed, just without a duration.
    #[instrument(skip(self, error), fields(execution_id = %id))]
    pub fn mark_failed(
        &self,
        id: &ExecutionId,
        http_status: Option<u16>,
        error: &str,
        retries: u32,
    ) -> Result<Execution> {
        let now = Utc::now();
        let db = self.db.lock().unwrap();
        let duration_ms = elapsed_since_start(&db, id, now)?;

        let rows_changed = db.execute(
            "UPDATE executions
             SET status = 'failed', completed_at = ?1, duration_ms = ?2,
                 http_status = ?3, error = ?4, retry_count = ?5
             WHERE id = ?6 AND status IN ('pending', 'running')",
            rusqlite::params![
                now.to_rfc3339(),
                duration_ms,
                http_status,
                error,
                retries,
                id.as_str()
            ],
        )?;
        if rows_changed == 0 {
            return Err(transition_error(&db, id, ExecutionStatus::Failed));
        }
        read_execution(&db, id)
    }

    /// Retrieve an execution by ID, returning `None` if it does not exist.
    pub fn get(&self, id: &ExecutionId) -> Result<Option<Execution>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
            rusqlite::params![id.as_str()],
            row_to_execution,
        ) {
            Ok(execution) => Ok(Some(execution)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// The most recent executions of one job, newest first.
    pub fn last_for_job(&self, job_id: &JobId, limit: usize) -> Result<Vec<Execution>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions
             WHERE job_id = ?1
             ORDER BY scheduled_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![job_id.as_str(), limit as i64],
            row_to_execution,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// The most recent executions across all jobs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Execution>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions
             ORDER BY scheduled_at DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_execution)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Failed executions, newest first, optionally narrowed to one job.
    pub fn failed(&self, job_id: Option<&JobId>, limit: usize) -> Result<Vec<Execution>> {
        let db = self.db.lock().unwrap();
        match job_id {
            Some(job_id) => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions
                     WHERE status = 'failed' AND job_id = ?1
                     ORDER BY scheduled_at DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(
                    rusqlite::params![job_id.as_str(), limit as i64],
                    row_to_execution,
                )?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
            None => {
                let mut stmt = db.prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions
                     WHERE status = 'failed'
                     ORDER BY scheduled_at DESC
                     LIMIT ?1"
                ))?;
                let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_execution)?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
        }
    }

    /// Aggregate counters over the whole table in one query.
    pub fn stats(&self) -> Result<ExecutionStats> {
        let cutoff = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let stats = db.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'success'), 0),
                    COALESCE(SUM(status = 'failed'), 0),
                    AVG(duration_ms),
                    COALESCE(SUM(scheduled_at > ?1), 0)
             FROM executions",
            rusqlite::params![cutoff],
            |row| {
                Ok(ExecutionStats {
                    total: row.get(0)?,
                    succeeded: row.get(1)?,
                    failed: row.get(2)?,
                    average_duration_ms: row
                        .get::<_, Option<f64>>(3)?
                        .map(|avg| avg.round() as i64),
                    last_hour: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Milliseconds between the stored `started_at` and `now`, or `None` when
/// the execution never started.
fn elapsed_since_start(
    db: &Connection,
    id: &ExecutionId,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let started_at: Option<String> = match db.query_row(
        "SELECT started_at FROM executions WHERE id = ?1",
        rusqlite::params![id.as_str()],
        |row| row.get(0),
    ) {
        Ok(value) => value,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(StoreError::ExecutionNotFound {
                id: id.as_str().to_string(),
            })
        }
        Err(e) => return Err(StoreError::Database(e)),
    };

    Ok(started_at
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|started| (now - started.with_timezone(&Utc)).num_milliseconds()))
}

/// Resolve why a guarded UPDATE touched no rows: either the execution is
/// gone or its current status forbids the transition.
fn transition_error(db: &Connection, id: &ExecutionId, to: ExecutionStatus) -> StoreError {
    match db.query_row(
        "SELECT status FROM executions WHERE id = ?1",
        rusqlite::params![id.as_str()],
        |row| row.get::<_, String>(0),
    ) {
        Ok(from) => StoreError::InvalidTransition {
            id: id.as_str().to_string(),
            from,
            to: to.to_string(),
        },
        Err(rusqlite::Error::QueryReturnedNoRows) => StoreError::ExecutionNotFound {
            id: id.as_str().to_string(),
        },
        Err(e) => StoreError::Database(e),
    }
}

fn read_execution(db: &Connection, id: &ExecutionId) -> Result<Execution> {
    let execution = db.query_row(
        &format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"),
        rusqlite::params![id.as_str()],
        row_to_execution,
    )?;
    Ok(execution)
}

/// Map a SQLite row to an `Execution`.
fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Execution> {
    // Stored statuses only ever come from ExecutionStatus::to_string; treat
    // anything else as failed rather than erroring the whole query.
    let status = row
        .get::<_, String>(2)?
        .parse()
        .unwrap_or(ExecutionStatus::Failed);

    Ok(Execution {
        id: ExecutionId::from(row.get::<_, String>(0)?),
        job_id: JobId::from(row.get::<_, String>(1)?),
        status,
        scheduled_at: row.get(3)?,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        duration_ms: row.get(6)?,
        http_status: row.get(7)?,
        error: row.get(8)?,
        retry_count: row.get(9)?,
    })
}
