//! Job record operations.

use super::queue::insert_entry;
use super::{from_sql_time, is_constraint_violation, to_sql_time};
use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::Utc;
use docent_core::{AnalysisResult, Job, JobCounts, JobState, QueueEntry, Sentiment, WorkMessage};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

const JOB_COLUMNS: &str = "id, state, file_ref, summary, topics, sentiment, error_message, created_at, updated_at";

impl Database {
    /// Create a new job in the `Processing` state.
    pub fn create_job(&self, job_id: &str, file_ref: &str) -> DbResult<Job> {
        let conn = self.conn()?;
        let job = Job::new(job_id, file_ref);
        insert_job(&conn, &job)?;
        Ok(job)
    }

    /// Create a job and enqueue its work message in a single transaction.
    ///
    /// Either both rows exist afterwards or neither does.
    pub fn create_job_with_message(
        &self,
        job_id: &str,
        file_ref: &str,
        max_attempts: u32,
    ) -> DbResult<(Job, QueueEntry)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let job = Job::new(job_id, file_ref);
        insert_job(&tx, &job)?;

        let entry = QueueEntry::new(WorkMessage::new(job_id, file_ref), max_attempts);
        insert_entry(&tx, &entry)?;

        tx.commit()?;
        debug!("Created job {} with queue entry {}", job.id, entry.id);

        Ok((job, entry))
    }

    /// Get a job by ID.
    pub fn get_job(&self, job_id: &str) -> DbResult<Option<Job>> {
        let conn = self.conn()?;
        fetch_job(&conn, job_id)
    }

    /// Record a successful analysis.
    ///
    /// Repeating the call on a completed job is a no-op; a failed job is
    /// never overwritten.
    pub fn mark_job_completed(&self, job_id: &str, result: &AnalysisResult) -> DbResult<Job> {
        let conn = self.conn()?;
        let now = to_sql_time(&Utc::now());
        let topics = serde_json::to_string(&result.topics)?;

        let rows = conn.execute(
            r#"
            UPDATE jobs
            SET state = 'completed', summary = ?2, topics = ?3, sentiment = ?4,
                error_message = NULL, updated_at = ?5
            WHERE id = ?1 AND state = 'processing'
            "#,
            params![
                job_id,
                result.summary,
                topics,
                result.sentiment.as_str(),
                now
            ],
        )?;

        settle_terminal_write(&conn, job_id, rows, JobState::Completed)
    }

    /// Record a failed analysis.
    ///
    /// Repeating the call on a failed job is a no-op; a completed job is
    /// never overwritten.
    pub fn mark_job_failed(&self, job_id: &str, message: &str) -> DbResult<Job> {
        let conn = self.conn()?;
        let now = to_sql_time(&Utc::now());

        let rows = conn.execute(
            r#"
            UPDATE jobs
            SET state = 'failed', error_message = ?2, updated_at = ?3
            WHERE id = ?1 AND state = 'processing'
            "#,
            params![job_id, message, now],
        )?;

        settle_terminal_write(&conn, job_id, rows, JobState::Failed)
    }

    /// List jobs, newest first, optionally filtered by state.
    pub fn list_jobs(&self, state: Option<JobState>, limit: usize) -> DbResult<Vec<Job>> {
        let conn = self.conn()?;

        let jobs = match state {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE state = ?1 ORDER BY created_at DESC LIMIT ?2",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map(params![s.as_str(), limit as i64], row_to_job)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?1",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit as i64], row_to_job)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(jobs)
    }

    /// Get job totals by state.
    pub fn job_counts(&self) -> DbResult<JobCounts> {
        let conn = self.conn()?;
        let mut counts = JobCounts::default();

        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state, count) = row?;
            match JobState::from_str(&state) {
                Some(JobState::Processing) => counts.processing = count,
                Some(JobState::Completed) => counts.completed = count,
                Some(JobState::Failed) => counts.failed = count,
                None => {}
            }
        }

        Ok(counts)
    }
}

pub(crate) fn insert_job(conn: &Connection, job: &Job) -> DbResult<()> {
    conn.execute(
        r#"
        INSERT INTO jobs (id, state, file_ref, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            job.id,
            job.state.as_str(),
            job.file_ref,
            to_sql_time(&job.created_at),
            to_sql_time(&job.updated_at),
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            DbError::AlreadyExists(format!("Job already exists: {}", job.id))
        } else {
            DbError::from(e)
        }
    })?;
    Ok(())
}

fn fetch_job(conn: &Connection, job_id: &str) -> DbResult<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![job_id],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

/// Resolve a conditional terminal update that may have matched no rows.
fn settle_terminal_write(
    conn: &Connection,
    job_id: &str,
    rows: usize,
    target: JobState,
) -> DbResult<Job> {
    let job = fetch_job(conn, job_id)?
        .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", job_id)))?;

    if rows > 0 || job.state == target {
        return Ok(job);
    }

    Err(DbError::InvalidTransition {
        job_id: job_id.to_string(),
        from: job.state,
        to: target,
    })
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let state_str: String = row.get(1)?;
    let topics_json: Option<String> = row.get(4)?;
    let sentiment_str: Option<String> = row.get(5)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    Ok(Job {
        id: row.get(0)?,
        state: JobState::from_str(&state_str).unwrap_or_default(),
        file_ref: row.get(2)?,
        summary: row.get(3)?,
        topics: topics_json.and_then(|s| serde_json::from_str(&s).ok()),
        sentiment: sentiment_str.and_then(|s| Sentiment::from_str(&s)),
        error_message: row.get(6)?,
        created_at: from_sql_time(&created_at_str).unwrap_or_else(Utc::now),
        updated_at: from_sql_time(&updated_at_str).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            summary: "A short note about Rust.".to_string(),
            topics: vec!["rust".to_string(), "notes".to_string()],
            sentiment: Sentiment::Positive,
        }
    }

    #[test]
    fn test_create_and_get_job() {
        let db = Database::open_in_memory().unwrap();

        let job = db.create_job("job-1", "job-1-notes.txt").unwrap();
        assert_eq!(job.state, JobState::Processing);

        let fetched = db.get_job("job-1").unwrap().unwrap();
        assert_eq!(fetched.id, "job-1");
        assert_eq!(fetched.file_ref, "job-1-notes.txt");
        assert_eq!(fetched.state, JobState::Processing);
        assert!(fetched.summary.is_none());
        assert!(fetched.topics.is_none());
        assert!(fetched.error_message.is_none());

        assert!(db.get_job("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let db = Database::open_in_memory().unwrap();

        db.create_job("job-1", "a.txt").unwrap();
        let err = db.create_job("job-1", "b.txt").unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_job_with_message() {
        let db = Database::open_in_memory().unwrap();

        let (job, entry) = db.create_job_with_message("job-1", "job-1-a.txt", 3).unwrap();
        assert_eq!(entry.message.job_id, job.id);
        assert_eq!(entry.max_attempts, 3);

        assert!(db.get_job("job-1").unwrap().is_some());
        assert!(db.get_queue_entry(&entry.id).unwrap().is_some());
    }

    #[test]
    fn test_create_job_with_message_rolls_back() {
        let db = Database::open_in_memory().unwrap();

        db.create_job("job-1", "a.txt").unwrap();
        let err = db.create_job_with_message("job-1", "b.txt", 3).unwrap_err();
        assert!(matches!(err, DbError::AlreadyExists(_)));

        assert_eq!(db.queue_counts().unwrap().pending, 0);
        assert_eq!(db.get_job("job-1").unwrap().unwrap().file_ref, "a.txt");
    }

    #[test]
    fn test_mark_completed() {
        let db = Database::open_in_memory().unwrap();
        db.create_job("job-1", "a.txt").unwrap();

        let job = db.mark_job_completed("job-1", &sample_result()).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result(), Some(sample_result()));
        assert!(job.updated_at >= job.created_at);

        // Repeating is a no-op
        let again = db.mark_job_completed("job-1", &sample_result()).unwrap();
        assert_eq!(again.state, JobState::Completed);
        assert_eq!(again.updated_at, job.updated_at);
    }

    #[test]
    fn test_mark_failed() {
        let db = Database::open_in_memory().unwrap();
        db.create_job("job-1", "a.txt").unwrap();

        let job = db.mark_job_failed("job-1", "blob missing").unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("blob missing"));
        assert!(job.result().is_none());

        let again = db.mark_job_failed("job-1", "blob missing").unwrap();
        assert_eq!(again.state, JobState::Failed);
    }

    #[test]
    fn test_terminal_states_do_not_flip() {
        let db = Database::open_in_memory().unwrap();
        db.create_job("done", "a.txt").unwrap();
        db.create_job("broken", "b.txt").unwrap();

        db.mark_job_completed("done", &sample_result()).unwrap();
        let err = db.mark_job_failed("done", "late failure").unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition {
                from: JobState::Completed,
                to: JobState::Failed,
                ..
            }
        ));

        db.mark_job_failed("broken", "boom").unwrap();
        let err = db.mark_job_completed("broken", &sample_result()).unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        let broken = db.get_job("broken").unwrap().unwrap();
        assert_eq!(broken.state, JobState::Failed);
        assert!(broken.summary.is_none());
    }

    #[test]
    fn test_mark_unknown_job() {
        let db = Database::open_in_memory().unwrap();

        let err = db.mark_job_completed("ghost", &sample_result()).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));

        let err = db.mark_job_failed("ghost", "boom").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_list_and_count_jobs() {
        let db = Database::open_in_memory().unwrap();
        db.create_job("a", "a.txt").unwrap();
        db.create_job("b", "b.txt").unwrap();
        db.create_job("c", "c.txt").unwrap();

        db.mark_job_completed("a", &sample_result()).unwrap();
        db.mark_job_failed("b", "boom").unwrap();

        assert_eq!(db.list_jobs(None, 10).unwrap().len(), 3);
        assert_eq!(db.list_jobs(None, 2).unwrap().len(), 2);

        let failed = db.list_jobs(Some(JobState::Failed), 10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "b");

        let counts = db.job_counts().unwrap();
        assert_eq!(
            counts,
            JobCounts {
                processing: 1,
                completed: 1,
                failed: 1,
            }
        );
    }
}
