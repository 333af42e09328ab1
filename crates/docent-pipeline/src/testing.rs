//! In-process fakes for pipeline tests.

use crate::clients::{Embedder, LanguageModel, VectorStore};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use docent_core::{DocumentChunk, RankedChunk};
use docent_ollama::OllamaError;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each word bumps one of 64 buckets.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().map(usize::from).sum::<usize>() % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Answers each analysis prompt with a canned response and counts calls.
pub struct ScriptedModel {
    fail_topics: bool,
    fail_all: bool,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn healthy() -> Self {
        Self {
            fail_topics: false,
            fail_all: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_topics() -> Self {
        Self {
            fail_topics: true,
            ..Self::healthy()
        }
    }

    pub fn offline() -> Self {
        Self {
            fail_all: true,
            ..Self::healthy()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let is_topics = prompt.starts_with("Extract");
        if self.fail_all || (self.fail_topics && is_topics) {
            return Err(PipelineError::Model(OllamaError::ServerNotRunning {
                host: "http://localhost:11434".to_string(),
            }));
        }

        let answer = if prompt.starts_with("Summarize") {
            "  A document about Rust.\n"
        } else if is_topics {
            " rust, ownership , traits,,async, tooling, extra"
        } else {
            "Positive."
        };
        Ok(answer.to_string())
    }
}

/// Holds every prompt until `parties` prompts are in flight at once.
pub struct RendezvousModel {
    barrier: Barrier,
    inner: ScriptedModel,
}

impl RendezvousModel {
    pub fn new(parties: usize) -> Self {
        Self {
            barrier: Barrier::new(parties),
            inner: ScriptedModel::healthy(),
        }
    }
}

#[async_trait]
impl LanguageModel for RendezvousModel {
    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        self.barrier.wait().await;
        self.inner.complete(prompt).await
    }
}

/// A vector store whose every call fails.
pub struct FailingVectorStore;

fn unavailable() -> PipelineError {
    PipelineError::Storage("vector store unavailable".to_string())
}

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn ensure_namespace(&self, _namespace: &str) -> PipelineResult<()> {
        Err(unavailable())
    }

    async fn index(&self, _namespace: &str, _chunks: &[DocumentChunk]) -> PipelineResult<usize> {
        Err(unavailable())
    }

    async fn query(&self, _namespace: &str, _text: &str, _k: usize) -> PipelineResult<Vec<RankedChunk>> {
        Err(unavailable())
    }

    async fn drop_namespace(&self, _namespace: &str) -> PipelineResult<()> {
        Err(unavailable())
    }
}
