//! Vector store backed by the Docent database.

use crate::clients::{Embedder, VectorStore};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use docent_core::{DocumentChunk, RankedChunk};
use docent_db::{Database, DbError};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Embedding requests in flight while indexing one document.
const EMBED_CONCURRENCY: usize = 4;

/// Stores chunk embeddings in SQLite and ranks them by cosine similarity.
pub struct SqliteVectorStore {
    db: Database,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    pub fn new(db: Database, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }
}

fn storage_error(action: &str, namespace: &str, err: DbError) -> PipelineError {
    PipelineError::Storage(format!("Failed to {} namespace {}: {}", action, namespace, err))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_namespace(&self, namespace: &str) -> PipelineResult<()> {
        let created = self
            .db
            .ensure_namespace(namespace)
            .map_err(|e| storage_error("create", namespace, e))?;
        if created {
            debug!("Created namespace {}", namespace);
        } else {
            debug!("Reusing namespace {}", namespace);
        }
        Ok(())
    }

    async fn index(&self, namespace: &str, chunks: &[DocumentChunk]) -> PipelineResult<usize> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_CONCURRENCY) {
            let pending: Vec<_> = batch
                .iter()
                .map(|chunk| self.embedder.embed(&chunk.content))
                .collect();
            vectors.extend(try_join_all(pending).await?);
        }

        let rows: Vec<(DocumentChunk, Vec<f32>)> = chunks.iter().cloned().zip(vectors).collect();
        let count = self
            .db
            .upsert_chunks(namespace, &rows, self.embedder.model_name())
            .map_err(|e| storage_error("index", namespace, e))?;

        info!("Indexed {} chunks in namespace {}", count, namespace);
        Ok(count)
    }

    async fn query(&self, namespace: &str, text: &str, k: usize) -> PipelineResult<Vec<RankedChunk>> {
        let query_vector = self.embedder.embed(text).await?;
        let results = self
            .db
            .search_namespace(namespace, &query_vector, k)
            .map_err(|e| storage_error("query", namespace, e))?;
        debug!(
            "Query in namespace {} returned {} chunks",
            namespace,
            results.len()
        );
        Ok(results)
    }

    async fn drop_namespace(&self, namespace: &str) -> PipelineResult<()> {
        let dropped = self
            .db
            .drop_namespace(namespace)
            .map_err(|e| storage_error("drop", namespace, e))?;
        if dropped {
            debug!("Dropped namespace {}", namespace);
        }
        Ok(())
    }
}
