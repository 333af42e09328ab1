//! Database CRUD operations.

pub mod jobs;
pub mod queue;
pub mod vectors;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width UTC timestamp, so stored values sort as text.
pub(crate) fn to_sql_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_sql_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
