//! Error types for the analysis pipeline.

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while accepting or analyzing a document.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected upload; nothing was stored.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Blob or vector storage failed after its retries.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Analysis failed: {0}")]
    Analysis(Box<PipelineError>),

    #[error("Delivery attempts exhausted for job {job_id} after {attempts} attempts")]
    DeliveryExhausted { job_id: String, attempts: u32 },

    #[error("File is empty")]
    EmptyDocument,

    #[error("File is not valid UTF-8 text")]
    NotText,

    #[error("Database error: {0}")]
    Database(#[from] docent_db::DbError),

    #[error("Model error: {0}")]
    Model(#[from] docent_ollama::OllamaError),
}

impl PipelineError {
    /// Wrap an error raised while analyzing, without nesting twice.
    pub fn analysis(err: PipelineError) -> Self {
        match err {
            PipelineError::Analysis(_) => err,
            other => PipelineError::Analysis(Box::new(other)),
        }
    }
}
