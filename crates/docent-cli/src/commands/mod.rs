//! CLI command implementations.

pub mod config;
pub mod init;
pub mod jobs;
pub mod queue;
pub mod status;
pub mod submit;
pub mod worker;

use anyhow::{Context, Result};
use docent_config::{AppPaths, Config};
use docent_core::RetryPolicy;
use docent_db::Database;
use docent_ollama::OllamaClient;
use docent_pipeline::{
    AnalysisOrchestrator, FsBlobStore, IntakeHandler, OllamaEmbedder, OllamaModel,
    SqliteVectorStore, Worker, WorkerSettings,
};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs once Docent is initialized.
pub struct Environment {
    pub paths: AppPaths,
    pub config: Config,
    pub db: Database,
}

/// Get the application paths.
pub fn get_paths() -> Result<AppPaths> {
    AppPaths::new().context("Failed to determine application directories")
}

/// Load the config file and apply its data directory override.
pub fn load_config() -> Result<(AppPaths, Config)> {
    let paths = get_paths()?;
    let config = Config::load_from(&paths.config_file).context("Failed to load configuration")?;
    let paths = config.resolve_paths(paths);
    Ok((paths, config))
}

/// Open the database, ensuring docent is initialized.
pub fn get_environment() -> Result<Environment> {
    let (paths, config) = load_config()?;

    if !paths.is_initialized() {
        anyhow::bail!("Docent is not initialized. Run 'docent init' first.");
    }

    let db = Database::open(&paths.database_file).context("Failed to open database")?;
    Ok(Environment { paths, config, db })
}

impl Environment {
    fn blob_store(&self) -> Arc<FsBlobStore> {
        let store = FsBlobStore::new(
            self.config.blob_dir(&self.paths),
            RetryPolicy::new(
                self.config.storage.retry_attempts,
                self.config.storage.retry_base_delay(),
            ),
        );
        debug!("Blob store at {}", store.root().display());
        Arc::new(store)
    }

    pub fn intake(&self) -> IntakeHandler {
        IntakeHandler::new(
            self.db.clone(),
            self.blob_store(),
            self.config.intake.clone(),
            self.config.queue.max_attempts,
        )
    }

    pub fn ollama(&self) -> Result<OllamaClient> {
        OllamaClient::from_config(&self.config.ollama).context("Failed to create Ollama client")
    }

    pub fn worker(&self, client: OllamaClient) -> Worker {
        let embedder = Arc::new(OllamaEmbedder::from_config(client.clone(), &self.config.ollama));
        let vectors = Arc::new(SqliteVectorStore::new(self.db.clone(), embedder));
        let model = Arc::new(OllamaModel::from_config(client, &self.config.ollama));
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            vectors,
            model,
            self.config.analysis.clone(),
        ));

        Worker::new(
            self.db.clone(),
            self.blob_store(),
            orchestrator,
            WorkerSettings::from_config(&self.config.queue),
        )
    }
}

/// First eight characters of an id, for tables.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Shorten `text` to at most `max` characters.
pub fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer line of text", 10), "a much ...");
        assert_eq!(truncate("first\nsecond", 20), "first");
    }
}
