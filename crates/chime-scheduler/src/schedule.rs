use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Accepted expressions have exactly six fields:
/// `second minute hour day month weekday`, e.g. `"0 30 9 * * MON-FRI"`.
const CRON_FIELDS: usize = 6;

/// Parse a six-field cron expression.
///
/// The field count is checked before parsing: the underlying parser also
/// accepts seven-field (with year) expressions, which this API does not.
pub fn parse(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != CRON_FIELDS {
        return Err(SchedulerError::InvalidSchedule(format!(
            "expected {CRON_FIELDS} fields (second minute hour day month weekday), got {fields}: {expr}"
        )));
    }
    expr.parse::<Schedule>()
        .map_err(|e| SchedulerError::InvalidSchedule(format!("{expr}: {e}")))
}

/// Validate an expression without keeping the parsed schedule.
pub fn validate(expr: &str) -> Result<()> {
    parse(expr).map(|_| ())
}

/// The next instant the schedule fires, if any.
pub fn next_fire(schedule: &Schedule) -> Option<DateTime<Utc>> {
    schedule.upcoming(Utc).next()
}
