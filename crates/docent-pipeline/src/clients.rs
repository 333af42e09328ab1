//! Collaborator interfaces used by the analysis pipeline.
//!
//! Implementations are built once at startup and shared as `Arc<dyn ...>`.

use crate::error::PipelineResult;
use async_trait::async_trait;
use docent_core::{DocumentChunk, RankedChunk};

/// Durable storage for uploaded documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `name` and return the locator to read them back.
    async fn put(&self, bytes: &[u8], name: &str) -> PipelineResult<String>;

    async fn get(&self, locator: &str) -> PipelineResult<Vec<u8>>;

    /// Best-effort removal; failures are logged, never returned.
    async fn delete(&self, locator: &str);
}

/// Namespaced similarity index over document chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the namespace, or reuse it if it already exists.
    async fn ensure_namespace(&self, namespace: &str) -> PipelineResult<()>;

    /// Embed and store chunks; returns how many were indexed.
    async fn index(&self, namespace: &str, chunks: &[DocumentChunk]) -> PipelineResult<usize>;

    /// Top `k` chunks in the namespace most similar to `text`.
    async fn query(&self, namespace: &str, text: &str, k: usize) -> PipelineResult<Vec<RankedChunk>>;

    /// Remove the namespace and its chunks. Callers treat failure as non-fatal.
    async fn drop_namespace(&self, namespace: &str) -> PipelineResult<()>;
}

/// Text completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> PipelineResult<String>;
}

/// Text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>>;

    fn model_name(&self) -> &str;
}
