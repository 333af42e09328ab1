//! Work queue consumer.
//!
//! Each delivery moves through `Received -> Reading -> Analyzing -> Recording`.
//! A failure at any stage is recorded and handed back to the queue, which
//! either schedules a redelivery or dead-letters the message.

use crate::clients::BlobStore;
use crate::error::{PipelineError, PipelineResult};
use crate::orchestrator::AnalysisOrchestrator;
use docent_config::QueueConfig;
use docent_core::{namespace_for, Delivery, JobId, RetryPolicy};
use docent_db::{Database, DbError, FailureDisposition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Queue timing used by a worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// How long a claimed message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Backoff between delivery attempts.
    pub backoff: RetryPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            visibility_timeout: config.visibility_timeout(),
            poll_interval: config.poll_interval(),
            backoff: RetryPolicy::new(config.max_attempts, config.backoff_base()),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// Processing stage of a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Reading,
    Analyzing,
    Recording,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Reading => "reading",
            Stage::Analyzing => "analyzing",
            Stage::Recording => "recording",
        };
        write!(f, "{}", name)
    }
}

/// What a worker did with one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed { job_id: JobId },
    /// Already terminal or unknown; acknowledged without work.
    Skipped { job_id: JobId },
    Retrying { job_id: JobId, delay: Duration },
    DeadLettered { job_id: JobId },
    /// The message was claimed again while this attempt ran; left to the newer claim.
    LeaseLost { job_id: JobId },
}

enum Handled {
    Completed,
    Skipped,
}

/// Pulls messages from the work queue and drives analysis.
#[derive(Clone)]
pub struct Worker {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    orchestrator: Arc<AnalysisOrchestrator>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        orchestrator: Arc<AnalysisOrchestrator>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            db,
            blobs,
            orchestrator,
            settings,
        }
    }

    /// Claim and process one message. Returns `None` when nothing is deliverable.
    pub async fn process_next(&self) -> PipelineResult<Option<ProcessOutcome>> {
        self.reclaim_exhausted().await?;

        let delivery = match self.db.dequeue(self.settings.visibility_timeout)? {
            Some(delivery) => delivery,
            None => return Ok(None),
        };
        let job_id = delivery.message.job_id.clone();

        info!(
            "Processing job {} (attempt {}/{})",
            job_id, delivery.attempt, delivery.max_attempts
        );

        match self.process(&delivery).await {
            Ok(Handled::Completed) => {
                self.db.ack(&delivery)?;
                info!("Job {} completed", job_id);
                Ok(Some(ProcessOutcome::Completed { job_id }))
            }
            Ok(Handled::Skipped) => {
                self.db.ack(&delivery)?;
                Ok(Some(ProcessOutcome::Skipped { job_id }))
            }
            Err((stage, err)) => self.handle_failure(&delivery, stage, err).await.map(Some),
        }
    }

    /// Process until nothing is deliverable right now.
    pub async fn drain(&self) -> PipelineResult<Vec<ProcessOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Poll the queue until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next().await {
                // Keep going while there is work
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!("Worker error: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    /// Run `concurrency` independent consumers until shutdown.
    pub async fn run_pool(&self, concurrency: usize, shutdown: watch::Receiver<bool>) {
        let handles: Vec<_> = (0..concurrency.max(1))
            .map(|_| {
                let worker = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run(shutdown).await })
            })
            .collect();

        info!("Started {} workers", handles.len());

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
    }

    async fn process(&self, delivery: &Delivery) -> Result<Handled, (Stage, PipelineError)> {
        let job_id = &delivery.message.job_id;

        let job = self
            .db
            .get_job(job_id)
            .map_err(|e| (Stage::Received, e.into()))?;
        match job {
            None => {
                warn!("Job {} not found, dropping its message", job_id);
                return Ok(Handled::Skipped);
            }
            Some(job) if job.state.is_terminal() => {
                debug!("Job {} already {}, skipping duplicate delivery", job_id, job.state);
                return Ok(Handled::Skipped);
            }
            Some(_) => {}
        }

        let bytes = self
            .blobs
            .get(&delivery.message.file_ref)
            .await
            .map_err(|e| (Stage::Reading, e))?;
        let text = decode_document(bytes).map_err(|e| (Stage::Reading, e))?;

        let result = self
            .orchestrator
            .analyze(&text, job_id)
            .await
            .map_err(|e| (Stage::Analyzing, e))?;

        match self.db.mark_job_completed(job_id, &result) {
            Ok(_) => Ok(Handled::Completed),
            Err(DbError::InvalidTransition { from, .. }) => {
                warn!("Job {} is already {}, not overwriting", job_id, from);
                Ok(Handled::Skipped)
            }
            Err(e) => Err((Stage::Recording, e.into())),
        }
    }

    async fn handle_failure(
        &self,
        delivery: &Delivery,
        stage: Stage,
        err: PipelineError,
    ) -> PipelineResult<ProcessOutcome> {
        let job_id = delivery.message.job_id.clone();
        let message = err.to_string();

        error!(
            "Job {} failed while {} (attempt {}/{}): {}",
            job_id, stage, delivery.attempt, delivery.max_attempts, message
        );

        // Only the last attempt may move the job to Failed; earlier ones
        // leave it Processing so a redelivery can still complete it.
        if delivery.is_final_attempt() {
            self.record_failure(&job_id, &message)?;
        }

        if self.orchestrator.cleanup_enabled() {
            self.orchestrator.cleanup(&namespace_for(&job_id)).await;
        }

        match self
            .db
            .fail_delivery(delivery, &message, &self.settings.backoff)?
        {
            FailureDisposition::Retry { delay, .. } => {
                info!("Job {} will be retried in {:?}", job_id, delay);
                Ok(ProcessOutcome::Retrying { job_id, delay })
            }
            FailureDisposition::DeadLettered => {
                warn!(
                    "Job {} dead-lettered after {} attempts",
                    job_id, delivery.attempt
                );
                Ok(ProcessOutcome::DeadLettered { job_id })
            }
            FailureDisposition::LeaseLost => Ok(ProcessOutcome::LeaseLost { job_id }),
        }
    }

    /// Fail jobs whose final attempt was abandoned mid-flight.
    async fn reclaim_exhausted(&self) -> PipelineResult<()> {
        let reclaimed = self
            .db
            .reclaim_exhausted(self.settings.visibility_timeout, "lease expired on final attempt")?;

        for entry in reclaimed {
            let job_id = entry.message.job_id;
            let err = PipelineError::DeliveryExhausted {
                job_id: job_id.clone(),
                attempts: entry.attempts,
            };
            warn!("{}", err);

            self.record_failure(&job_id, &err.to_string())?;
            if self.orchestrator.cleanup_enabled() {
                self.orchestrator.cleanup(&namespace_for(&job_id)).await;
            }
        }

        Ok(())
    }

    fn record_failure(&self, job_id: &str, message: &str) -> PipelineResult<()> {
        match self.db.mark_job_failed(job_id, message) {
            Ok(_) => Ok(()),
            Err(DbError::InvalidTransition { from, .. }) => {
                warn!("Job {} is already {}, not recording failure", job_id, from);
                Ok(())
            }
            Err(DbError::NotFound(_)) => {
                warn!("Job {} not found, cannot record failure", job_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode blob bytes into analyzable text.
fn decode_document(bytes: Vec<u8>) -> PipelineResult<String> {
    let text = String::from_utf8(bytes).map_err(|_| PipelineError::NotText)?;
    if text.trim().is_empty() {
        return Err(PipelineError::EmptyDocument);
    }
    Ok(text)
}
