//! Filesystem-backed blob store.

use crate::clients::BlobStore;
use crate::error::{PipelineError, PipelineResult};
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use docent_core::RetryPolicy;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stores each blob as a file in one directory; the locator is the file name.
pub struct FsBlobStore {
    root: PathBuf,
    retry: RetryPolicy,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            root: root.into(),
            retry,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, locator: &str) -> PipelineResult<PathBuf> {
        if locator.is_empty()
            || locator.contains('/')
            || locator.contains('\\')
            || locator.starts_with('.')
        {
            return Err(PipelineError::Validation(format!(
                "Invalid blob name: {}",
                locator
            )));
        }
        Ok(self.root.join(locator))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8], name: &str) -> PipelineResult<String> {
        let path = self.path_for(name)?;
        let (root, path) = (&self.root, &path);

        retry_with_backoff(&self.retry, "blob write", move || async move {
            tokio::fs::create_dir_all(root).await?;
            tokio::fs::write(path, bytes).await
        })
        .await
        .map_err(|e| {
            PipelineError::Storage(format!(
                "Failed to write blob {} after {} attempts: {}",
                name, self.retry.max_attempts, e
            ))
        })?;

        debug!("Stored blob {} ({} bytes)", name, bytes.len());
        Ok(name.to_string())
    }

    async fn get(&self, locator: &str) -> PipelineResult<Vec<u8>> {
        let path = self.path_for(locator)?;
        let path = &path;

        retry_with_backoff(&self.retry, "blob read", move || tokio::fs::read(path))
            .await
            .map_err(|e| {
                PipelineError::Storage(format!(
                    "Failed to read blob {} after {} attempts: {}",
                    locator, self.retry.max_attempts, e
                ))
            })
    }

    async fn delete(&self, locator: &str) {
        let path = match self.path_for(locator) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping blob delete: {}", e);
                return;
            }
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Deleted blob {}", locator),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete blob {}: {}", locator, e),
        }
    }
}
