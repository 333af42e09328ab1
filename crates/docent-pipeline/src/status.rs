//! Read model for job status queries.

use crate::error::{PipelineError, PipelineResult};
use docent_core::{Job, JobState, Sentiment};
use docent_db::Database;
use serde::Serialize;

/// What a client sees when asking about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobReport {
    fn from(job: Job) -> Self {
        let mut report = JobReport {
            job_id: job.id.clone(),
            status: job.state,
            summary: None,
            topics: None,
            sentiment: None,
            error: None,
        };

        match job.state {
            JobState::Completed => {
                if let Some(result) = job.result() {
                    report.summary = Some(result.summary);
                    report.topics = Some(result.topics);
                    report.sentiment = Some(result.sentiment);
                }
            }
            JobState::Failed => report.error = job.error_message,
            JobState::Processing => {}
        }

        report
    }
}

/// Look up a job's report.
pub fn job_report(db: &Database, job_id: &str) -> PipelineResult<JobReport> {
    let job = db
        .get_job(job_id)?
        .ok_or_else(|| PipelineError::NotFound(format!("Job not found: {}", job_id)))?;
    Ok(job.into())
}
