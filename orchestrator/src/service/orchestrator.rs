//! Orchestration service
//!
//! Entry point for every operation on deployments. `deploy` registers the
//! deployment and hands the pipeline to a background task; the other
//! operations answer from the registry or query the container runtime.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::deploy::docker::ContainerRuntime;
use crate::deploy::fsm::{DeploymentEvent, DeploymentStatus, PipelineSettings};
use crate::deploy::pipeline::{bounded, teardown, Pipeline, Toolchain};
use crate::deploy::ports::PortAllocator;
use crate::errors::CloudlabError;
use crate::models::deployment::{ContainerStats, Deployment};
use crate::registry::Registry;
use crate::storage::layout::StorageLayout;

const SUPPORTED_SCHEMES: [&str; 5] = ["http", "https", "git", "ssh", "file"];

/// Trim and check a repository location
///
/// `scheme://` locations must use a scheme git can clone from. Everything
/// else (scp-like `[user@]host:path`, filesystem paths) is passed through.
pub fn validate_source_location(raw: &str) -> Result<String, CloudlabError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CloudlabError::ValidationError("Repo URL required".to_string()));
    }

    // `host:path` parses as a URL with scheme `host`
    if !trimmed.contains("://") {
        return Ok(trimmed.to_string());
    }

    let url = Url::parse(trimmed).map_err(|e| {
        CloudlabError::ValidationError(format!("Invalid repository URL: {}", e))
    })?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(CloudlabError::ValidationError(format!(
            "Unsupported repository scheme: {}",
            url.scheme()
        )));
    }

    Ok(trimmed.to_string())
}

/// Runtime errors surface to callers as `RuntimeUnavailable`
fn unavailable(err: CloudlabError) -> CloudlabError {
    match err {
        CloudlabError::RuntimeUnavailable(_) => err,
        other => CloudlabError::RuntimeUnavailable(other.to_string()),
    }
}

/// Façade over the registry, the pipeline and the container runtime
pub struct Orchestrator {
    registry: Arc<Registry>,
    pipeline: Arc<Pipeline>,
    runtime: Arc<dyn ContainerRuntime>,
    layout: StorageLayout,
    runtime_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        toolchain: Toolchain,
        layout: StorageLayout,
        settings: PipelineSettings,
        port_base: u16,
        public_host: impl Into<String>,
    ) -> Self {
        let runtime = toolchain.runtime.clone();
        let runtime_timeout = settings.runtime_timeout;
        let pipeline = Pipeline::new(
            toolchain,
            Arc::new(PortAllocator::new(port_base)),
            layout.clone(),
            settings,
            public_host,
        );

        Self {
            registry: Arc::new(Registry::new()),
            pipeline: Arc::new(pipeline),
            runtime,
            layout,
            runtime_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a deployment and start its pipeline in the background
    ///
    /// Returns as soon as the deployment is registered.
    pub async fn deploy(&self, source_location: &str) -> Result<Deployment, CloudlabError> {
        let source_location = validate_source_location(source_location)?;

        let handle = self.registry.create(&source_location).await;
        let deployment = handle.snapshot().await;
        info!(deployment_id = %deployment.id, source = %source_location, "Deployment started");

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            pipeline.run(handle).await;
        });

        Ok(deployment)
    }

    pub async fn list(&self) -> Vec<Deployment> {
        self.registry.list().await
    }

    pub async fn find(&self, id: &str) -> Result<Deployment, CloudlabError> {
        Ok(self.registry.find(id).await?.snapshot().await)
    }

    /// Stop and remove the container of a running deployment
    pub async fn stop(&self, id: &str) -> Result<Deployment, CloudlabError> {
        let handle = self.registry.find(id).await?;

        let image = handle
            .image_ref()
            .await
            .ok_or_else(|| CloudlabError::InvalidState("No container to stop".to_string()))?;

        match handle.status().await {
            DeploymentStatus::Running => {}
            DeploymentStatus::Stopped => return Ok(handle.snapshot().await),
            other => {
                return Err(CloudlabError::InvalidState(format!(
                    "Deployment is {}, only running deployments can be stopped",
                    other
                )));
            }
        }

        let limit = self.runtime_timeout;
        let on_timeout: fn(String) -> CloudlabError = CloudlabError::RuntimeUnavailable;

        if let Err(e) = bounded(limit, "docker stop", on_timeout, self.runtime.stop(&image)).await {
            warn!(deployment_id = %id, image = %image, "Failed to stop container: {}", e);
        }
        if let Err(e) = bounded(limit, "docker rm", on_timeout, self.runtime.remove(&image)).await {
            warn!(deployment_id = %id, image = %image, "Failed to remove container: {}", e);
        }

        match handle.apply(DeploymentEvent::Stop).await {
            Ok(_) => info!(deployment_id = %id, image = %image, "Container stopped"),
            // A concurrent stop got there first
            Err(_) if handle.status().await == DeploymentStatus::Stopped => {}
            Err(e) => return Err(e),
        }

        Ok(handle.snapshot().await)
    }

    /// Release every resource of a deployment and unregister it
    pub async fn delete(&self, id: &str) -> Result<(), CloudlabError> {
        let handle = self.registry.find(id).await?;
        if !handle.begin_delete() {
            return Err(CloudlabError::NotFound(format!(
                "deployment {} (already being deleted)",
                id
            )));
        }

        let image = handle.image_ref().await;
        let failures = teardown(
            self.runtime.as_ref(),
            id,
            image.as_deref(),
            &self.layout.checkout_dir(id),
            self.runtime_timeout,
        )
        .await;

        self.registry.remove(id).await?;

        if failures == 0 {
            info!(deployment_id = %id, "Deployment deleted completely");
        } else {
            warn!(deployment_id = %id, failures, "Deployment deleted, some cleanup steps failed");
        }
        Ok(())
    }

    /// Live CPU and memory usage of a deployment's container
    pub async fn stats(&self, id: &str) -> Result<ContainerStats, CloudlabError> {
        let image = self.container_of(id).await?;
        bounded(
            self.runtime_timeout,
            "docker stats",
            CloudlabError::RuntimeUnavailable,
            self.runtime.stats(&image),
        )
        .await
        .map_err(unavailable)
    }

    /// Output captured from a deployment's container
    pub async fn logs(&self, id: &str) -> Result<String, CloudlabError> {
        let image = self.container_of(id).await?;
        bounded(
            self.runtime_timeout,
            "docker logs",
            CloudlabError::RuntimeUnavailable,
            self.runtime.logs(&image),
        )
        .await
        .map_err(unavailable)
    }

    async fn container_of(&self, id: &str) -> Result<String, CloudlabError> {
        self.registry
            .find(id)
            .await?
            .image_ref()
            .await
            .ok_or_else(|| CloudlabError::NotFound("Container not found".to_string()))
    }
}
