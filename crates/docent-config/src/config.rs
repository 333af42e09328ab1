//! Configuration structures and loading.

use crate::error::{ConfigError, ConfigResult};
use crate::paths::{expand_home, AppPaths};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> ConfigResult<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default config file with comments.
    pub fn create_default_file(path: &PathBuf) -> ConfigResult<()> {
        let default_config = Self::default_config_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, default_config)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.analysis.chunk_size == 0 {
            return Err(ConfigError::Invalid("analysis.chunk_size must be > 0".into()));
        }
        if self.analysis.chunk_overlap >= self.analysis.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "analysis.chunk_overlap ({}) must be smaller than analysis.chunk_size ({})",
                self.analysis.chunk_overlap, self.analysis.chunk_size
            )));
        }
        if self.analysis.top_k == 0 {
            return Err(ConfigError::Invalid("analysis.top_k must be > 0".into()));
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be > 0".into()));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid("worker.concurrency must be > 0".into()));
        }
        Ok(())
    }

    /// Apply the `general.data_dir` override to platform paths.
    pub fn resolve_paths(&self, paths: AppPaths) -> AppPaths {
        match self.general.data_dir.as_deref() {
            Some(dir) => paths.with_data_dir(expand_home(dir)),
            None => paths,
        }
    }

    /// Directory blobs are stored in, falling back to the platform data dir.
    pub fn blob_dir(&self, paths: &AppPaths) -> PathBuf {
        self.storage
            .blob_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| paths.blob_dir.clone())
    }

    /// Generate a default config file with helpful comments.
    pub fn default_config_string() -> String {
        r#"# Docent Configuration
# Asynchronous document analysis: summary, topics and sentiment

[general]
# Data directory for database and uploaded documents
# data_dir = "~/.local/share/docent"

[ollama]
# Ollama server address
host = "http://localhost:11434"

# Model used for summaries, topics and sentiment
model = "llama3.1:8b"

# Model for generating embeddings
embedding_model = "nomic-embed-text"

# Request timeout in seconds
timeout_seconds = 120

# Sampling temperature for analysis prompts
temperature = 0.1

# Retries for failed model calls
retry_attempts = 3
retry_base_delay_ms = 500

[storage]
# Where uploaded documents are kept
# blob_dir = "~/.local/share/docent/blobs"

# Retries for blob reads and writes (exponential backoff)
retry_attempts = 3
retry_base_delay_ms = 500

[queue]
# Delivery attempts before a message is dead-lettered
max_attempts = 3

# First retry delay; doubles on every further retry
backoff_base_seconds = 30

# How often idle workers poll for new messages
poll_interval_ms = 1000

# Messages held longer than this by a worker are redelivered
visibility_timeout_seconds = 600

[analysis]
# Chunking for retrieval (characters)
chunk_size = 512
chunk_overlap = 50

# Documents shorter than this skip retrieval and the model entirely
short_document_chars = 50

# Leading characters of the document used as the retrieval query
query_chars = 200

# Chunks retrieved as analysis context
top_k = 5

# Maximum topics kept from the model answer
max_topics = 5

# Drop the job's vector namespace after analysis (success or failure)
cleanup_vector_store = false

[intake]
# Maximum upload size in bytes (1 MiB)
max_file_size = 1048576

# Accepted file extensions
allowed_extensions = ["txt"]

[worker]
# Concurrent consumer tasks
concurrency = 2
"#
        .to_string()
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub data_dir: Option<String>,
}

/// Ollama LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout_seconds: 120,
            temperature: 0.1,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl OllamaConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub blob_dir: Option<String>,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_dir: None,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl StorageConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Work queue delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub poll_interval_ms: u64,
    pub visibility_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_seconds: 30,
            poll_interval_ms: 1000,
            visibility_timeout_seconds: 600,
        }
    }
}

impl QueueConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

/// Analysis pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub short_document_chars: usize,
    pub query_chars: usize,
    pub top_k: usize,
    pub max_topics: usize,
    pub cleanup_vector_store: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            short_document_chars: 50,
            query_chars: 200,
            top_k: 5,
            max_topics: 5,
            cleanup_vector_store: false,
        }
    }
}

/// Upload acceptance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            allowed_extensions: vec!["txt".to_string()],
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 2 }
    }
}
