//! Source fetching through git

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::command;
use crate::errors::CloudlabError;

/// Materializes a repository onto local storage
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `source` into `destination`, which must not exist yet
    async fn fetch(&self, source: &str, destination: &Path) -> Result<(), CloudlabError>;
}

/// Fetcher shelling out to `git clone`
#[derive(Debug, Clone, Default)]
pub struct GitFetcher;

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, source: &str, destination: &Path) -> Result<(), CloudlabError> {
        if tokio::fs::try_exists(destination).await.unwrap_or(false) {
            return Err(CloudlabError::FetchError(format!(
                "destination {} already exists",
                destination.display()
            )));
        }

        info!("Cloning {} into {}", source, destination.display());
        let target = destination.to_string_lossy();
        let output = command::run("git", &["clone", "--depth", "1", "--", source, &*target], None)
            .await
            .map_err(|e| CloudlabError::FetchError(format!("Failed to run git clone: {}", e)))?;

        if !output.success {
            return Err(CloudlabError::FetchError(format!(
                "git clone failed: {}",
                output.failure_reason()
            )));
        }

        debug!("Clone complete: {}", destination.display());
        Ok(())
    }
}
