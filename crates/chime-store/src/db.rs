use rusqlite::Connection;

use crate::error::Result;

/// Initialise the jobs and executions tables and their indexes.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
///
/// `executions.job_id` is a weak reference with no foreign key: execution
/// records outlive job deletion, so failure history stays queryable.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id            TEXT    NOT NULL PRIMARY KEY,
            schedule      TEXT    NOT NULL,   -- six-field cron expression
            target        TEXT    NOT NULL,   -- http(s) URL POSTed on fire
            delivery_mode TEXT    NOT NULL,
            is_active     INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_active ON jobs (is_active);

        CREATE TABLE IF NOT EXISTS executions (
            id            TEXT    NOT NULL PRIMARY KEY,
            job_id        TEXT    NOT NULL,
            status        TEXT    NOT NULL DEFAULT 'pending',
            scheduled_at  TEXT    NOT NULL,
            started_at    TEXT,               -- ISO-8601 or NULL
            completed_at  TEXT,               -- ISO-8601 or NULL
            duration_ms   INTEGER,
            http_status   INTEGER,
            error         TEXT,
            retry_count   INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_job ON executions (job_id, scheduled_at DESC);
        CREATE INDEX IF NOT EXISTS idx_executions_scheduled ON executions (scheduled_at DESC);
        ",
    )?;
    Ok(())
}
