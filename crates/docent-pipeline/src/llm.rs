//! Ollama-backed language model and embedder.

use crate::clients::{Embedder, LanguageModel};
use crate::error::PipelineResult;
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use docent_config::OllamaConfig;
use docent_core::RetryPolicy;
use docent_ollama::{GenerateOptions, GenerateRequest, OllamaClient};
use tracing::debug;

/// Text completion through Ollama's generate endpoint.
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl OllamaModel {
    pub fn new(client: OllamaClient, model: impl Into<String>, temperature: f32, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            retry,
        }
    }

    pub fn from_config(client: OllamaClient, config: &OllamaConfig) -> Self {
        Self::new(
            client,
            &config.model,
            config.temperature,
            RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
        )
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        let request = GenerateRequest::new(&self.model, prompt)
            .with_options(GenerateOptions::with_temperature(self.temperature));
        let (client, request) = (&self.client, &request);

        let response = retry_with_backoff(&self.retry, "generate", move || {
            client.generate(request)
        })
        .await?;

        debug!(
            "Model {} answered with {} chars",
            self.model,
            response.response.len()
        );
        Ok(response.response.trim().to_string())
    }
}

/// Embeddings through Ollama's embeddings endpoint.
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    pub fn from_config(client: OllamaClient, config: &OllamaConfig) -> Self {
        Self::new(
            client,
            &config.embedding_model,
            RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
        )
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>> {
        let (client, model) = (&self.client, self.model.as_str());

        let vector = retry_with_backoff(&self.retry, "embed", move || client.embed(model, text)).await?;
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
