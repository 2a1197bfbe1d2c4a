use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::instrument;

use chime_core::types::{CreateJobRequest, Job, JobId, UpdateJobRequest};

use crate::error::{Result, StoreError};

/// Aggregate job counts for the metrics endpoint.
#[derive(Debug, Clone, Copy)]
pub struct JobCounts {
    pub total: i64,
    pub active: i64,
}

/// Thread-safe store for persisted job definitions.
///
/// Wraps a single SQLite connection in a `Mutex`. Clones share the same
/// connection, so the trigger engine and the HTTP handlers see one
/// consistent view.
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    /// Insert a new job. Jobs start active; scheduling is the caller's job.
    #[instrument(skip(self, req), fields(target = %req.target))]
    pub fn create(&self, req: &CreateJobRequest) -> Result<Job> {
        let id = JobId::new();
        let now = chrono::Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO jobs (id, schedule, target, delivery_mode, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            rusqlite::params![
                id.as_str(),
                req.schedule,
                req.target,
                req.delivery_mode.to_string(),
                now
            ],
        )?;

        Ok(Job {
            id,
            schedule: req.schedule.clone(),
            target: req.target.clone(),
            delivery_mode: req.delivery_mode,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Retrieve a job by ID, returning `None` if it does not exist.
    pub fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, schedule, target, delivery_mode, is_active, created_at, updated_at
             FROM jobs WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_job,
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Apply a partial update and return the new record, or `None` if the
    /// job does not exist. Absent fields keep their stored value.
    #[instrument(skip(self, update), fields(job_id = %id))]
    pub fn update(&self, id: &JobId, update: &UpdateJobRequest) -> Result<Option<Job>> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let db = self.db.lock().unwrap();
            let rows_changed = db.execute(
                "UPDATE jobs
                 SET schedule      = COALESCE(?1, schedule),
                     target        = COALESCE(?2, target),
                     delivery_mode = COALESCE(?3, delivery_mode),
                     is_active     = COALESCE(?4, is_active),
                     updated_at    = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    update.schedule,
                    update.target,
                    update.delivery_mode.map(|m| m.to_string()),
                    update.active,
                    now,
                    id.as_str()
                ],
            )?;
            if rows_changed == 0 {
                return Ok(None);
            }
        }
        self.get(id)
    }

    /// Delete a job definition. Returns whether a row was removed.
    ///
    /// Past executions for the job are kept.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn delete(&self, id: &JobId) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "DELETE FROM jobs WHERE id = ?1",
            rusqlite::params![id.as_str()],
        )?;
        Ok(rows_changed > 0)
    }

    /// All jobs currently marked active, oldest first.
    pub fn list_active(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, schedule, target, delivery_mode, is_active, created_at, updated_at
             FROM jobs WHERE is_active = 1
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Total and active job counts in one query.
    pub fn counts(&self) -> Result<JobCounts> {
        let db = self.db.lock().unwrap();
        let counts = db.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM jobs",
            [],
            |row| {
                Ok(JobCounts {
                    total: row.get(0)?,
                    active: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Cheap connectivity check for the health endpoint.
    pub fn ping(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |_row| Ok(()))?;
        Ok(())
    }
}

/// Map a SQLite row to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    // Stored modes only ever come from DeliveryMode::to_string; fall back to
    // the default rather than failing the whole query on a bad row.
    let delivery_mode = row
        .get::<_, String>(3)?
        .parse()
        .unwrap_or_default();

    Ok(Job {
        id: JobId::from(row.get::<_, String>(0)?),
        schedule: row.get(1)?,
        target: row.get(2)?,
        delivery_mode,
        active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
