//! Document submission.

use crate::clients::BlobStore;
use crate::error::{PipelineError, PipelineResult};
use docent_config::IntakeConfig;
use docent_core::{new_id, JobId};
use docent_db::Database;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Validates uploads, stores them and creates their jobs.
pub struct IntakeHandler {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    config: IntakeConfig,
    max_attempts: u32,
}

impl IntakeHandler {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        config: IntakeConfig,
        max_attempts: u32,
    ) -> Self {
        Self {
            db,
            blobs,
            config,
            max_attempts,
        }
    }

    /// Accept a document and queue it for analysis.
    ///
    /// The job row and its queue entry are written together; if that write
    /// fails the stored blob is removed again.
    pub async fn submit(&self, bytes: &[u8], original_name: &str) -> PipelineResult<JobId> {
        self.validate(bytes, original_name)?;

        let job_id = new_id();
        let blob_name = format!("{}-{}", job_id, sanitize_name(original_name));
        let locator = self.blobs.put(bytes, &blob_name).await?;

        if let Err(e) = self
            .db
            .create_job_with_message(&job_id, &locator, self.max_attempts)
        {
            warn!("Failed to create job for {}: {}", original_name, e);
            self.blobs.delete(&locator).await;
            return Err(e.into());
        }

        info!(
            "Accepted {} ({} bytes) as job {}",
            original_name,
            bytes.len(),
            job_id
        );
        Ok(job_id)
    }

    fn validate(&self, bytes: &[u8], name: &str) -> PipelineResult<()> {
        if bytes.is_empty() {
            return Err(PipelineError::Validation("No file content".to_string()));
        }

        if bytes.len() > self.config.max_file_size {
            return Err(PipelineError::Validation(format!(
                "File is {} bytes, the limit is {} bytes",
                bytes.len(),
                self.config.max_file_size
            )));
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let allowed = self
            .config
            .allowed_extensions
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&extension));
        if !allowed {
            return Err(PipelineError::Validation(format!(
                "Unsupported file type '{}', allowed: {}",
                name,
                self.config.allowed_extensions.join(", ")
            )));
        }

        if bytes.contains(&0) || std::str::from_utf8(bytes).is_err() {
            return Err(PipelineError::Validation(
                "Only plain text files are accepted".to_string(),
            ));
        }

        Ok(())
    }
}

/// Reduce an uploaded file name to a safe blob name suffix.
fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}
