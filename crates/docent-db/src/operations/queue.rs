//! Work queue operations.
//!
//! Delivery is at-least-once: a claimed entry carries a lease (`locked_at`)
//! and becomes claimable again once the lease is older than the visibility
//! timeout, unless it has used its last attempt.

use super::{from_sql_time, to_sql_time};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use docent_core::{
    Delivery, QueueCounts, QueueEntry, QueueStatus, RetryPolicy, WorkMessage,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, warn};

const ENTRY_COLUMNS: &str = "id, job_id, file_ref, status, attempts, max_attempts, last_error, available_at, locked_at, created_at, updated_at";

/// What happened to an entry after a failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Rescheduled; claimable again at `available_at`.
    Retry {
        available_at: DateTime<Utc>,
        delay: Duration,
    },
    /// No attempts left; removed from active delivery.
    DeadLettered,
    /// Another consumer claimed the entry since; nothing was changed.
    LeaseLost,
}

impl Database {
    /// Persist a message for delivery.
    pub fn enqueue(&self, message: &WorkMessage, max_attempts: u32) -> DbResult<QueueEntry> {
        let conn = self.conn()?;
        let entry = QueueEntry::new(message.clone(), max_attempts);
        insert_entry(&conn, &entry)?;
        Ok(entry)
    }

    /// Get a queue entry by ID.
    pub fn get_queue_entry(&self, entry_id: &str) -> DbResult<Option<QueueEntry>> {
        let conn = self.conn()?;
        fetch_entry(&conn, entry_id)
    }

    /// Claim the next deliverable entry.
    ///
    /// Picks the oldest pending entry whose backoff has elapsed, or an
    /// in-flight entry whose lease has expired. Claiming counts as an attempt.
    pub fn dequeue(&self, visibility_timeout: Duration) -> DbResult<Option<Delivery>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let now_str = to_sql_time(&now);
        let lease_cutoff = to_sql_time(&(now - to_chrono(visibility_timeout)?));

        let entry = tx
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM work_queue
                    WHERE (status = 'pending' AND available_at <= ?1)
                       OR (status = 'processing' AND locked_at <= ?2 AND attempts < max_attempts)
                    ORDER BY available_at ASC, created_at ASC
                    LIMIT 1
                    "#,
                    ENTRY_COLUMNS
                ),
                params![now_str, lease_cutoff],
                row_to_entry,
            )
            .optional()?;

        let entry = match entry {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.status == QueueStatus::Processing {
            warn!(
                "Lease expired for entry {} (job {}), redelivering",
                entry.id, entry.message.job_id
            );
        }

        tx.execute(
            r#"
            UPDATE work_queue
            SET status = 'processing', attempts = attempts + 1, locked_at = ?2, updated_at = ?2
            WHERE id = ?1
            "#,
            params![entry.id, now_str],
        )?;
        tx.commit()?;

        let delivery = Delivery {
            entry_id: entry.id,
            message: entry.message,
            attempt: entry.attempts + 1,
            max_attempts: entry.max_attempts,
        };
        debug!(
            "Claimed entry {} (attempt {}/{})",
            delivery.entry_id, delivery.attempt, delivery.max_attempts
        );

        Ok(Some(delivery))
    }

    /// Acknowledge a delivery; the entry is done.
    ///
    /// Returns `false` when the delivery's lease was lost to a newer claim,
    /// in which case the entry is left to its current holder.
    pub fn ack(&self, delivery: &Delivery) -> DbResult<bool> {
        let conn = self.conn()?;
        let now = to_sql_time(&Utc::now());

        let rows = conn.execute(
            r#"
            UPDATE work_queue SET status = 'done', locked_at = NULL, updated_at = ?3
            WHERE id = ?1 AND status = 'processing' AND attempts = ?2
            "#,
            params![delivery.entry_id, delivery.attempt, now],
        )?;

        if rows == 0 {
            ensure_entry_exists(&conn, &delivery.entry_id)?;
            warn!(
                "Lease on entry {} (attempt {}) was lost, ack ignored",
                delivery.entry_id, delivery.attempt
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Hand a failed delivery back to the queue.
    ///
    /// Only the current holder of the entry's lease can fail it. The
    /// delivery's final attempt dead-letters the entry; earlier attempts are
    /// rescheduled after `base_delay * 2^(attempt-1)`.
    pub fn fail_delivery(
        &self,
        delivery: &Delivery,
        error: &str,
        policy: &RetryPolicy,
    ) -> DbResult<FailureDisposition> {
        let conn = self.conn()?;
        let now = Utc::now();
        let now_str = to_sql_time(&now);

        let (rows, disposition) = if delivery.is_final_attempt() {
            let rows = conn.execute(
                r#"
                UPDATE work_queue
                SET status = 'dead', last_error = ?3, locked_at = NULL, updated_at = ?4
                WHERE id = ?1 AND status = 'processing' AND attempts = ?2
                "#,
                params![delivery.entry_id, delivery.attempt, error, now_str],
            )?;
            (rows, FailureDisposition::DeadLettered)
        } else {
            let delay = policy.delay_for_attempt(delivery.attempt);
            let available_at = now + to_chrono(delay)?;
            let rows = conn.execute(
                r#"
                UPDATE work_queue
                SET status = 'pending', last_error = ?3, available_at = ?4, locked_at = NULL, updated_at = ?5
                WHERE id = ?1 AND status = 'processing' AND attempts = ?2
                "#,
                params![
                    delivery.entry_id,
                    delivery.attempt,
                    error,
                    to_sql_time(&available_at),
                    now_str
                ],
            )?;
            (
                rows,
                FailureDisposition::Retry {
                    available_at,
                    delay,
                },
            )
        };

        if rows == 0 {
            ensure_entry_exists(&conn, &delivery.entry_id)?;
            warn!(
                "Lease on entry {} (attempt {}) was lost, failure not recorded",
                delivery.entry_id, delivery.attempt
            );
            return Ok(FailureDisposition::LeaseLost);
        }

        Ok(disposition)
    }

    /// Dead-letter in-flight entries whose lease expired on their last attempt.
    ///
    /// The returned entries belong to jobs that will never be redelivered.
    pub fn reclaim_exhausted(
        &self,
        visibility_timeout: Duration,
        reason: &str,
    ) -> DbResult<Vec<QueueEntry>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now();
        let now_str = to_sql_time(&now);
        let lease_cutoff = to_sql_time(&(now - to_chrono(visibility_timeout)?));

        let expired = {
            let mut stmt = tx.prepare(&format!(
                r#"
                SELECT {} FROM work_queue
                WHERE status = 'processing' AND locked_at <= ?1 AND attempts >= max_attempts
                ORDER BY created_at ASC
                "#,
                ENTRY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![lease_cutoff], row_to_entry)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut reclaimed = Vec::with_capacity(expired.len());
        for mut entry in expired {
            tx.execute(
                r#"
                UPDATE work_queue
                SET status = 'dead', last_error = ?2, locked_at = NULL, updated_at = ?3
                WHERE id = ?1
                "#,
                params![entry.id, reason, now_str],
            )?;
            entry.status = QueueStatus::Dead;
            entry.last_error = Some(reason.to_string());
            entry.locked_at = None;
            entry.updated_at = now;
            reclaimed.push(entry);
        }

        tx.commit()?;
        Ok(reclaimed)
    }

    /// List queue entries, oldest first, optionally filtered by status.
    pub fn list_queue(&self, status: Option<QueueStatus>, limit: usize) -> DbResult<Vec<QueueEntry>> {
        let conn = self.conn()?;

        let entries = match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM work_queue WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2",
                    ENTRY_COLUMNS
                ))?;
                let rows = stmt.query_map(params![s.as_str(), limit as i64], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM work_queue ORDER BY created_at ASC LIMIT ?1",
                    ENTRY_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit as i64], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(entries)
    }

    /// Entries carrying a job's message, newest first.
    pub fn queue_entries_for_job(&self, job_id: &str) -> DbResult<Vec<QueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM work_queue WHERE job_id = ?1 ORDER BY created_at DESC",
            ENTRY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![job_id], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Dead-lettered entries, oldest first.
    pub fn dead_letters(&self, limit: usize) -> DbResult<Vec<QueueEntry>> {
        self.list_queue(Some(QueueStatus::Dead), limit)
    }

    /// Get queue totals by status.
    pub fn queue_counts(&self) -> DbResult<QueueCounts> {
        let conn = self.conn()?;
        let mut counts = QueueCounts::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM work_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => counts.pending = count,
                Some(QueueStatus::Processing) => counts.processing = count,
                Some(QueueStatus::Done) => counts.done = count,
                Some(QueueStatus::Dead) => counts.dead = count,
                None => {}
            }
        }

        Ok(counts)
    }

    /// Delete acknowledged entries.
    pub fn purge_done(&self) -> DbResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute("DELETE FROM work_queue WHERE status = 'done'", [])?;
        Ok(count)
    }
}

fn ensure_entry_exists(conn: &Connection, entry_id: &str) -> DbResult<()> {
    match fetch_entry(conn, entry_id)? {
        Some(_) => Ok(()),
        None => Err(DbError::NotFound(format!("Queue entry not found: {}", entry_id))),
    }
}

pub(crate) fn insert_entry(conn: &Connection, entry: &QueueEntry) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO work_queue (id, job_id, file_ref, status, attempts, max_attempts, last_error,
                                available_at, locked_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            entry.id,
            entry.message.job_id,
            entry.message.file_ref,
            entry.status.as_str(),
            entry.attempts,
            entry.max_attempts,
            entry.last_error,
            to_sql_time(&entry.available_at),
            entry.locked_at.map(|dt| to_sql_time(&dt)),
            to_sql_time(&entry.created_at),
            to_sql_time(&entry.updated_at),
        ],
    )?;
    Ok(())
}

fn fetch_entry(conn: &Connection, entry_id: &str) -> DbResult<Option<QueueEntry>> {
    let entry = conn
        .query_row(
            &format!("SELECT {} FROM work_queue WHERE id = ?1", ENTRY_COLUMNS),
            params![entry_id],
            row_to_entry,
        )
        .optional()?;
    Ok(entry)
}

fn to_chrono(duration: Duration) -> DbResult<chrono::Duration> {
    chrono::Duration::from_std(duration).map_err(|e| DbError::Other(e.to_string()))
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    let status_str: String = row.get(3)?;
    let available_at_str: String = row.get(7)?;
    let locked_at_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    Ok(QueueEntry {
        id: row.get(0)?,
        message: WorkMessage::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
        status: QueueStatus::from_str(&status_str).unwrap_or_default(),
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        last_error: row.get(6)?,
        available_at: from_sql_time(&available_at_str).unwrap_or_else(Utc::now),
        locked_at: locked_at_str.and_then(|s| from_sql_time(&s)),
        created_at: from_sql_time(&created_at_str).unwrap_or_else(Utc::now),
        updated_at: from_sql_time(&updated_at_str).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_LEASE: Duration = Duration::from_secs(600);

    fn setup(max_attempts: u32) -> (Database, QueueEntry) {
        let db = Database::open_in_memory().unwrap();
        let (_, entry) = db
            .create_job_with_message("job-1", "job-1-a.txt", max_attempts)
            .unwrap();
        (db, entry)
    }

    #[test]
    fn test_enqueue_requires_job() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.enqueue(&WorkMessage::new("ghost", "ghost-a.txt"), 3).is_err());

        db.create_job("job-1", "job-1-a.txt").unwrap();
        let entry = db.enqueue(&WorkMessage::new("job-1", "job-1-a.txt"), 2).unwrap();
        assert_eq!(entry.status, QueueStatus::Pending);

        let delivery = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert_eq!(delivery.entry_id, entry.id);
        assert_eq!(delivery.max_attempts, 2);
    }

    #[test]
    fn test_entries_for_job() {
        let (db, entry) = setup(3);
        db.create_job_with_message("job-2", "job-2-b.txt", 3).unwrap();

        let entries = db.queue_entries_for_job("job-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry.id);
        assert!(db.queue_entries_for_job("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_queue_workflow() {
        let (db, entry) = setup(3);

        let delivery = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert_eq!(delivery.entry_id, entry.id);
        assert_eq!(delivery.message, WorkMessage::new("job-1", "job-1-a.txt"));
        assert_eq!(delivery.attempt, 1);

        // Leased entries are invisible to other consumers
        assert!(db.dequeue(LONG_LEASE).unwrap().is_none());

        assert!(db.ack(&delivery).unwrap());
        let done = db.get_queue_entry(&entry.id).unwrap().unwrap();
        assert_eq!(done.status, QueueStatus::Done);
        assert!(done.locked_at.is_none());

        assert_eq!(db.purge_done().unwrap(), 1);
        assert!(db.get_queue_entry(&entry.id).unwrap().is_none());
    }

    #[test]
    fn test_ack_unknown_entry() {
        let db = Database::open_in_memory().unwrap();
        let ghost = Delivery {
            entry_id: "ghost".to_string(),
            message: WorkMessage::new("ghost", "ghost.txt"),
            attempt: 1,
            max_attempts: 3,
        };
        assert!(matches!(db.ack(&ghost), Err(DbError::NotFound(_))));
        assert!(matches!(
            db.fail_delivery(&ghost, "boom", &RetryPolicy::no_retry()),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_stale_delivery_cannot_settle_entry() {
        let (db, entry) = setup(3);
        let policy = RetryPolicy::new(3, Duration::from_secs(30));

        let stale = db.dequeue(LONG_LEASE).unwrap().unwrap();
        let second = db.dequeue(Duration::ZERO).unwrap().unwrap();
        let current = db.dequeue(Duration::ZERO).unwrap().unwrap();
        assert_eq!((stale.attempt, second.attempt, current.attempt), (1, 2, 3));

        // Older holders neither fail nor ack the entry
        assert_eq!(
            db.fail_delivery(&stale, "late failure", &policy).unwrap(),
            FailureDisposition::LeaseLost
        );
        assert!(!db.ack(&second).unwrap());

        let row = db.get_queue_entry(&entry.id).unwrap().unwrap();
        assert_eq!(row.status, QueueStatus::Processing);
        assert_eq!(row.attempts, 3);
        assert!(row.last_error.is_none());

        // The current holder still settles it
        assert_eq!(
            db.fail_delivery(&current, "model down", &policy).unwrap(),
            FailureDisposition::DeadLettered
        );
        assert!(!db.ack(&current).unwrap());
    }

    #[test]
    fn test_failure_backoff_then_dead_letter() {
        let (db, entry) = setup(3);
        let policy = RetryPolicy::new(3, Duration::from_secs(30));

        let first = db.dequeue(LONG_LEASE).unwrap().unwrap();
        let disposition = db.fail_delivery(&first, "model down", &policy).unwrap();
        match disposition {
            FailureDisposition::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(30)),
            other => panic!("expected retry, got {:?}", other),
        }

        // Backoff keeps it hidden
        assert!(db.dequeue(LONG_LEASE).unwrap().is_none());
        let pending = db.get_queue_entry(&entry.id).unwrap().unwrap();
        assert_eq!(pending.status, QueueStatus::Pending);
        assert_eq!(pending.last_error.as_deref(), Some("model down"));

        make_available(&db, &entry.id);
        let second = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        match db.fail_delivery(&second, "model down", &policy).unwrap() {
            FailureDisposition::Retry { delay, available_at } => {
                assert_eq!(delay, Duration::from_secs(60));
                assert!(available_at > Utc::now() + chrono::Duration::seconds(50));
            }
            other => panic!("expected retry, got {:?}", other),
        }

        make_available(&db, &entry.id);
        let third = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert_eq!(third.attempt, 3);
        assert!(third.is_final_attempt());
        assert_eq!(
            db.fail_delivery(&third, "model down", &policy).unwrap(),
            FailureDisposition::DeadLettered
        );

        assert!(db.dequeue(LONG_LEASE).unwrap().is_none());
        let dead = db.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert_eq!(dead[0].last_error.as_deref(), Some("model down"));
    }

    #[test]
    fn test_expired_lease_is_redelivered() {
        let (db, entry) = setup(3);

        let first = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert_eq!(first.attempt, 1);

        // Worker crashed without ack; a zero timeout treats the lease as expired
        let second = db.dequeue(Duration::ZERO).unwrap().unwrap();
        assert_eq!(second.entry_id, entry.id);
        assert_eq!(second.attempt, 2);
    }

    #[test]
    fn test_reclaim_exhausted() {
        let (db, entry) = setup(1);

        let only = db.dequeue(LONG_LEASE).unwrap().unwrap();
        assert!(only.is_final_attempt());

        // A live lease is left alone
        assert!(db.reclaim_exhausted(LONG_LEASE, "exhausted").unwrap().is_empty());

        // Expired final-attempt leases are never redelivered
        assert!(db.dequeue(Duration::ZERO).unwrap().is_none());

        let reclaimed = db.reclaim_exhausted(Duration::ZERO, "exhausted").unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, entry.id);
        assert_eq!(reclaimed[0].message.job_id, "job-1");
        assert_eq!(reclaimed[0].status, QueueStatus::Dead);

        let counts = db.queue_counts().unwrap();
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.processing, 0);
    }

    #[test]
    fn test_queue_counts_and_listing() {
        let db = Database::open_in_memory().unwrap();
        db.create_job_with_message("a", "a.txt", 3).unwrap();
        db.create_job_with_message("b", "b.txt", 3).unwrap();
        db.create_job_with_message("c", "c.txt", 3).unwrap();

        let delivery = db.dequeue(LONG_LEASE).unwrap().unwrap();
        db.ack(&delivery).unwrap();
        db.dequeue(LONG_LEASE).unwrap().unwrap();

        assert_eq!(
            db.queue_counts().unwrap(),
            QueueCounts {
                pending: 1,
                processing: 1,
                done: 1,
                dead: 0,
            }
        );
        assert_eq!(db.list_queue(None, 10).unwrap().len(), 3);
        assert_eq!(db.list_queue(Some(QueueStatus::Pending), 10).unwrap().len(), 1);
    }

    fn make_available(db: &Database, entry_id: &str) {
        let conn = db.conn().unwrap();
        conn.execute(
            "UPDATE work_queue SET available_at = ?2 WHERE id = ?1",
            params![entry_id, to_sql_time(&(Utc::now() - chrono::Duration::seconds(1)))],
        )
        .unwrap();
    }
}
