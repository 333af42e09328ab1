//! Core domain types for Docent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for analysis jobs.
pub type JobId = String;

/// Unique identifier for work queue entries.
pub type EntryId = String;

/// Generate a new unique ID.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Name of the vector-store namespace holding a job's chunks.
pub fn namespace_for(job_id: &str) -> String {
    format!("job_{}", job_id)
}

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Processing)
    }

    /// Jobs only ever move forward out of `Processing`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Processing, JobState::Completed) | (JobState::Processing, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall sentiment of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }

    /// Map a free-form model answer onto a label.
    ///
    /// Total over all inputs: "positive" wins over "negative" when both
    /// appear, and anything else is `Neutral`.
    pub fn from_response(response: &str) -> Self {
        let answer = response.trim().to_lowercase();
        if answer.contains("positive") {
            Sentiment::Positive
        } else if answer.contains("negative") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a document analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
}

/// A document-analysis request and its current outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub file_ref: String,
    pub summary: Option<String>,
    pub topics: Option<Vec<String>>,
    pub sentiment: Option<Sentiment>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<JobId>, file_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: JobState::Processing,
            file_ref: file_ref.into(),
            summary: None,
            topics: None,
            sentiment: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The analysis result, present only once the job has completed.
    pub fn result(&self) -> Option<AnalysisResult> {
        if self.state != JobState::Completed {
            return None;
        }

        Some(AnalysisResult {
            summary: self.summary.clone()?,
            topics: self.topics.clone().unwrap_or_default(),
            sentiment: self.sentiment?,
        })
    }
}

/// Message carried by the work queue from intake to the workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMessage {
    pub job_id: JobId,
    pub file_ref: String,
}

impl WorkMessage {
    pub fn new(job_id: impl Into<JobId>, file_ref: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            file_ref: file_ref.into(),
        }
    }
}

/// Delivery status of a work queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Dead,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Done => "done",
            QueueStatus::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(QueueStatus::Pending),
            "processing" => Some(QueueStatus::Processing),
            "done" => Some(QueueStatus::Done),
            "dead" => Some(QueueStatus::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message persisted in the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub message: WorkMessage,
    pub status: QueueStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(message: WorkMessage, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            message,
            status: QueueStatus::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
            available_at: now,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A claimed queue entry handed to one worker attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub entry_id: EntryId,
    pub message: WorkMessage,
    /// 1-based number of this delivery attempt.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl Delivery {
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// A contiguous slice of a document, indexed for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub namespace: String,
    pub index: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(namespace: impl Into<String>, index: usize, content: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            index,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Stable identifier, so re-indexing the same document replaces rows.
    pub fn id(&self) -> String {
        format!("{}:{}", self.namespace, self.index)
    }
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: DocumentChunk,
    /// Cosine similarity score.
    pub score: f32,
}

/// Job totals by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Queue totals by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub dead: i64,
}
