//! Docent Pipeline - document intake, queue consumption and analysis.
//!
//! This crate provides:
//! - Upload validation and job submission
//! - Filesystem blob storage and a SQLite-backed vector store
//! - Chunking and retrieval-augmented analysis via Ollama
//! - The worker loop that drives jobs to a terminal state

mod blob;
mod chunker;
mod clients;
mod error;
mod intake;
mod llm;
mod orchestrator;
mod retry;
mod status;
mod vector;
mod worker;

#[cfg(test)]
mod testing;

pub use blob::FsBlobStore;
pub use chunker::{ChunkConfig, Chunker};
pub use clients::{BlobStore, Embedder, LanguageModel, VectorStore};
pub use error::{PipelineError, PipelineResult};
pub use intake::IntakeHandler;
pub use llm::{OllamaEmbedder, OllamaModel};
pub use orchestrator::AnalysisOrchestrator;
pub use retry::retry_with_backoff;
pub use status::{job_report, JobReport};
pub use vector::SqliteVectorStore;
pub use worker::{ProcessOutcome, Stage, Worker, WorkerSettings};
