//! Docent Ollama - HTTP client for a local Ollama server.
//!
//! Provides text generation for the analysis prompts and embeddings for
//! the per-job vector index.

mod client;
mod error;
mod types;

pub use client::OllamaClient;
pub use error::{OllamaError, OllamaResult};
pub use types::*;
