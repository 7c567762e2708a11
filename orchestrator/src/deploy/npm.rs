//! Dependency installation through npm

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::deploy::command;
use crate::errors::CloudlabError;

/// Installs a project's dependencies inside its checkout
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, workdir: &Path) -> Result<(), CloudlabError>;
}

/// Installer running `npm install`
#[derive(Debug, Clone, Default)]
pub struct NpmInstaller;

#[async_trait]
impl DependencyInstaller for NpmInstaller {
    async fn install(&self, workdir: &Path) -> Result<(), CloudlabError> {
        info!("Installing dependencies in {}", workdir.display());

        let output = command::run("npm", &["install"], Some(workdir))
            .await
            .map_err(|e| CloudlabError::InstallError(format!("Failed to run npm install: {}", e)))?;

        if !output.success {
            return Err(CloudlabError::InstallError(format!(
                "npm install failed: {}",
                output.failure_reason()
            )));
        }

        Ok(())
    }
}
