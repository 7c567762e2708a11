//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::DeployOptions;
use crate::deploy::mock::MockToolchain;
use crate::deploy::pipeline::Toolchain;
use crate::errors::CloudlabError;
use crate::service::orchestrator::Orchestrator;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::ToolchainKind;

/// Main application state
pub struct AppState {
    /// Deployment orchestration service
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(
        layout: &StorageLayout,
        options: &DeployOptions,
    ) -> Result<Self, CloudlabError> {
        info!("Initializing application state...");

        layout.setup().await?;

        let toolchain = match options.toolchain {
            ToolchainKind::System => Toolchain::system(&options.container_cli),
            ToolchainKind::Mock => {
                warn!("Using the mock toolchain, nothing will be cloned, built or run");
                Toolchain::mock(Arc::new(MockToolchain::new()))
            }
        };

        let orchestrator = Orchestrator::new(
            toolchain,
            layout.clone(),
            options.pipeline.clone(),
            options.port_base,
            options.public_host.clone(),
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Shutdown application state
    ///
    /// Containers are left running; the registry is not persisted.
    pub async fn shutdown(&self) -> Result<(), CloudlabError> {
        let deployments = self.orchestrator.registry().len().await;
        info!(deployments, "Shutting down application state...");
        Ok(())
    }
}
