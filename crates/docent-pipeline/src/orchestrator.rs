//! Retrieval-augmented analysis of one document.

use crate::chunker::{ChunkConfig, Chunker};
use crate::clients::{LanguageModel, VectorStore};
use crate::error::{PipelineError, PipelineResult};
use docent_config::AnalysisConfig;
use docent_core::{namespace_for, AnalysisResult, Sentiment};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chunks, indexes and retrieves a document, then prompts for its summary,
/// topics and sentiment.
pub struct AnalysisOrchestrator {
    vectors: Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
    chunker: Chunker,
    config: AnalysisConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        model: Arc<dyn LanguageModel>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            vectors,
            model,
            chunker: Chunker::new(ChunkConfig::from_analysis_config(&config)),
            config,
        }
    }

    /// Whether job namespaces are dropped once analysis ends.
    pub fn cleanup_enabled(&self) -> bool {
        self.config.cleanup_vector_store
    }

    /// Analyze a document. Either every field of the result is produced or
    /// the call fails with `PipelineError::Analysis`.
    pub async fn analyze(&self, text: &str, job_id: &str) -> PipelineResult<AnalysisResult> {
        let trimmed = text.trim();

        if trimmed.chars().count() < self.config.short_document_chars {
            debug!("Job {} is a short document, skipping retrieval", job_id);
            return Ok(self.short_document_result(trimmed));
        }

        let namespace = namespace_for(job_id);
        let outcome = self.retrieve_and_prompt(trimmed, &namespace).await;

        if self.cleanup_enabled() {
            self.cleanup(&namespace).await;
        }

        outcome.map_err(PipelineError::analysis)
    }

    /// Drop a namespace, logging instead of failing.
    pub async fn cleanup(&self, namespace: &str) {
        if let Err(e) = self.vectors.drop_namespace(namespace).await {
            warn!("Failed to clean up namespace {}: {}", namespace, e);
        }
    }

    async fn retrieve_and_prompt(
        &self,
        text: &str,
        namespace: &str,
    ) -> PipelineResult<AnalysisResult> {
        self.vectors.ensure_namespace(namespace).await?;

        let chunks = self.chunker.chunk_text(namespace, text);
        self.vectors.index(namespace, &chunks).await?;

        let query: String = text.chars().take(self.config.query_chars).collect();
        let relevant = self
            .vectors
            .query(namespace, &query, self.config.top_k)
            .await?;

        let context = relevant
            .iter()
            .map(|ranked| ranked.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(
            "Prompting with {} of {} chunks from {}",
            relevant.len(),
            chunks.len(),
            namespace
        );

        let summary_request = summary_prompt(&context);
        let topics_request = topics_prompt(&context, self.config.max_topics);
        let sentiment_request = sentiment_prompt(&context);

        let (summary, topics, sentiment) = tokio::try_join!(
            self.model.complete(&summary_request),
            self.model.complete(&topics_request),
            self.model.complete(&sentiment_request),
        )?;

        Ok(AnalysisResult {
            summary: summary.trim().to_string(),
            topics: parse_topics(&topics, self.config.max_topics),
            sentiment: Sentiment::from_response(&sentiment),
        })
    }

    fn short_document_result(&self, trimmed: &str) -> AnalysisResult {
        AnalysisResult {
            summary: format!("Short document: \"{}\"", trimmed),
            topics: trimmed
                .split_whitespace()
                .take(self.config.max_topics)
                .map(str::to_string)
                .collect(),
            sentiment: Sentiment::Neutral,
        }
    }
}

fn summary_prompt(context: &str) -> String {
    format!(
        "Summarize the following document in one paragraph:\n\n{}",
        context
    )
}

fn topics_prompt(context: &str, max_topics: usize) -> String {
    format!(
        "Extract the top {} keywords or topics discussed in this document. Return only the topics separated by commas:\n\n{}",
        max_topics, context
    )
}

fn sentiment_prompt(context: &str) -> String {
    format!(
        "Determine if the sentiment of this text is Positive, Negative, or Neutral. Return only one word:\n\n{}",
        context
    )
}

/// Split a comma-separated answer into at most `max` trimmed topics.
fn parse_topics(response: &str, max: usize) -> Vec<String> {
    response
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingVectorStore, KeywordEmbedder, RendezvousModel, ScriptedModel};
    use crate::vector::SqliteVectorStore;
    use docent_db::Database;

    const LONG_TEXT: &str = "Rust is a systems programming language focused on safety. \
        Ownership and borrowing let the compiler prove memory safety without a garbage \
        collector. Traits describe shared behavior, and async code runs on executors such \
        as tokio. Many teams enjoy the tooling and the helpful compiler messages.";

    fn orchestrator(
        db: &Database,
        model: Arc<ScriptedModel>,
        config: AnalysisConfig,
    ) -> AnalysisOrchestrator {
        let vectors = Arc::new(SqliteVectorStore::new(
            db.clone(),
            Arc::new(KeywordEmbedder::new()),
        ));
        AnalysisOrchestrator::new(vectors, model, config)
    }

    #[tokio::test]
    async fn test_short_document_fast_path() {
        let db = Database::open_in_memory().unwrap();
        let model = Arc::new(ScriptedModel::healthy());
        let orchestrator = orchestrator(&db, model.clone(), AnalysisConfig::default());

        let result = orchestrator
            .analyze("  hello world test file \n", "job-1")
            .await
            .unwrap();

        assert!(result.summary.contains("\"hello world test file\""));
        assert_eq!(result.topics, vec!["hello", "world", "test", "file"]);
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(model.calls(), 0);
        assert!(!db.namespace_exists("job_job-1").unwrap());
    }

    #[tokio::test]
    async fn test_short_document_topics_capped() {
        let db = Database::open_in_memory().unwrap();
        let model = Arc::new(ScriptedModel::healthy());
        let orchestrator = orchestrator(&db, model.clone(), AnalysisConfig::default());

        let result = orchestrator.analyze("a b c d e f g", "job-1").await.unwrap();
        assert_eq!(result.topics, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_full_analysis() {
        let db = Database::open_in_memory().unwrap();
        let model = Arc::new(ScriptedModel::healthy());
        let orchestrator = orchestrator(&db, model.clone(), AnalysisConfig::default());

        let result = orchestrator.analyze(LONG_TEXT, "job-1").await.unwrap();

        assert_eq!(result.summary, "A document about Rust.");
        assert_eq!(
            result.topics,
            vec!["rust", "ownership", "traits", "async", "tooling"]
        );
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert_eq!(model.calls(), 3);

        // Namespace kept when cleanup is off
        assert!(db.namespace_exists("job_job-1").unwrap());
        assert!(db.namespace_chunk_count("job_job-1").unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_cleanup_on_success() {
        let db = Database::open_in_memory().unwrap();
        let config = AnalysisConfig {
            cleanup_vector_store: true,
            ..AnalysisConfig::default()
        };
        let orchestrator = orchestrator(&db, Arc::new(ScriptedModel::healthy()), config);

        orchestrator.analyze(LONG_TEXT, "job-1").await.unwrap();
        assert!(!db.namespace_exists("job_job-1").unwrap());
    }

    #[tokio::test]
    async fn test_model_failure_fails_analysis_and_cleans_up() {
        let db = Database::open_in_memory().unwrap();
        let config = AnalysisConfig {
            cleanup_vector_store: true,
            ..AnalysisConfig::default()
        };
        let orchestrator = orchestrator(&db, Arc::new(ScriptedModel::failing_topics()), config);

        let err = orchestrator.analyze(LONG_TEXT, "job-1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Analysis(_)));
        assert!(err.to_string().starts_with("Analysis failed:"));
        assert!(!db.namespace_exists("job_job-1").unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_error() {
        let config = AnalysisConfig {
            cleanup_vector_store: true,
            ..AnalysisConfig::default()
        };
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(FailingVectorStore),
            Arc::new(ScriptedModel::healthy()),
            config,
        );

        let err = orchestrator.analyze(LONG_TEXT, "job-1").await.unwrap_err();
        assert!(err.to_string().contains("vector store unavailable"));
    }

    #[tokio::test]
    async fn test_prompts_run_concurrently() {
        let db = Database::open_in_memory().unwrap();
        let vectors = Arc::new(SqliteVectorStore::new(
            db.clone(),
            Arc::new(KeywordEmbedder::new()),
        ));
        // Each prompt blocks until all three are waiting
        let orchestrator = AnalysisOrchestrator::new(
            vectors,
            Arc::new(RendezvousModel::new(3)),
            AnalysisConfig::default(),
        );

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            orchestrator.analyze(LONG_TEXT, "job-1"),
        )
        .await
        .expect("prompts were not in flight together")
        .unwrap();

        assert_eq!(result.summary, "A document about Rust.");
        assert_eq!(result.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_parse_topics() {
        assert_eq!(
            parse_topics(" rust , , ownership,traits,async,tooling,extra ", 5),
            vec!["rust", "ownership", "traits", "async", "tooling"]
        );
        assert!(parse_topics(" , ,", 5).is_empty());
        assert_eq!(parse_topics("single", 5), vec!["single"]);
    }
}
