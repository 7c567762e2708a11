//! Pipeline driver
//!
//! Walks a single deployment through fetch, install, build and start. Every
//! stage is gated on the previous one and bounded by its own timeout; the
//! first failure marks the deployment `failed` and ends the run.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::deploy::docker::{ensure_dockerfile, ContainerRuntime, DockerCli, ImageBuilder, RunSpec};
use crate::deploy::fsm::{DeploymentEvent, DeploymentStatus, PipelineSettings};
use crate::deploy::git::{GitFetcher, SourceFetcher};
use crate::deploy::mock::MockToolchain;
use crate::deploy::npm::{DependencyInstaller, NpmInstaller};
use crate::deploy::ports::PortAllocator;
use crate::errors::CloudlabError;
use crate::filesys::dir::Dir;
use crate::registry::DeploymentHandle;
use crate::storage::layout::StorageLayout;
use crate::utils::image_ref_for;

/// External collaborators the pipeline calls into
#[derive(Clone)]
pub struct Toolchain {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub installer: Arc<dyn DependencyInstaller>,
    pub builder: Arc<dyn ImageBuilder>,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl Toolchain {
    /// git + npm + a docker-compatible CLI
    pub fn system(container_cli: &str) -> Self {
        let docker = Arc::new(DockerCli::with_program(container_cli));
        Self {
            fetcher: Arc::new(GitFetcher),
            installer: Arc::new(NpmInstaller),
            builder: docker.clone(),
            runtime: docker,
        }
    }

    /// Route every collaborator to the same in-memory fake
    pub fn mock(mock: Arc<MockToolchain>) -> Self {
        Self {
            fetcher: mock.clone(),
            installer: mock.clone(),
            builder: mock.clone(),
            runtime: mock,
        }
    }
}

/// One ordered step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Install,
    Build,
    Start,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Install, Stage::Build, Stage::Start];

    /// Event that moves a deployment into this stage
    fn event(self) -> DeploymentEvent {
        match self {
            Stage::Fetch => DeploymentEvent::Fetch,
            Stage::Install => DeploymentEvent::Install,
            Stage::Build => DeploymentEvent::Build,
            Stage::Start => DeploymentEvent::Start,
        }
    }

    fn timeout(self, settings: &PipelineSettings) -> Duration {
        match self {
            Stage::Fetch => settings.fetch_timeout,
            Stage::Install => settings.install_timeout,
            Stage::Build => settings.build_timeout,
            Stage::Start => settings.start_timeout,
        }
    }

    fn error(self) -> fn(String) -> CloudlabError {
        match self {
            Stage::Fetch => CloudlabError::FetchError,
            Stage::Install => CloudlabError::InstallError,
            Stage::Build => CloudlabError::BuildError,
            Stage::Start => CloudlabError::RunError,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Install => "install",
            Stage::Build => "build",
            Stage::Start => "start",
        };
        f.write_str(name)
    }
}

/// Await `fut` for at most `limit`, turning a timeout into `on_timeout`
pub async fn bounded<T, F>(
    limit: Duration,
    what: &str,
    on_timeout: fn(String) -> CloudlabError,
    fut: F,
) -> Result<T, CloudlabError>
where
    F: Future<Output = Result<T, CloudlabError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!("{} timed out after {:?}", what, limit))),
    }
}

/// Best-effort release of everything a deployment may hold
///
/// Each step runs regardless of earlier failures. Returns the number of steps
/// that failed.
pub async fn teardown(
    runtime: &dyn ContainerRuntime,
    deployment_id: &str,
    image_ref: Option<&str>,
    checkout: &Dir,
    limit: Duration,
) -> usize {
    let mut failures = 0;

    if let Some(image) = image_ref {
        let unavailable: fn(String) -> CloudlabError = CloudlabError::RuntimeUnavailable;

        if let Err(e) = bounded(limit, "docker stop", unavailable, runtime.stop(image)).await {
            warn!(deployment_id, image, "Failed to stop container: {}", e);
            failures += 1;
        }
        if let Err(e) = bounded(limit, "docker rm", unavailable, runtime.remove(image)).await {
            warn!(deployment_id, image, "Failed to remove container: {}", e);
            failures += 1;
        }
        if let Err(e) = bounded(limit, "docker rmi", unavailable, runtime.remove_image(image)).await {
            warn!(deployment_id, image, "Failed to remove image: {}", e);
            failures += 1;
        }
    }

    match checkout.delete().await {
        Ok(true) => debug!(deployment_id, "Removed checkout {}", checkout.path().display()),
        Ok(false) => {}
        Err(e) => {
            warn!(deployment_id, "Failed to remove checkout {}: {}", checkout.path().display(), e);
            failures += 1;
        }
    }

    failures
}

/// Drives deployments through their stages
pub struct Pipeline {
    toolchain: Toolchain,
    ports: Arc<PortAllocator>,
    layout: StorageLayout,
    settings: PipelineSettings,
    public_host: String,
}

impl Pipeline {
    pub fn new(
        toolchain: Toolchain,
        ports: Arc<PortAllocator>,
        layout: StorageLayout,
        settings: PipelineSettings,
        public_host: impl Into<String>,
    ) -> Self {
        Self {
            toolchain,
            ports,
            layout,
            settings,
            public_host: public_host.into(),
        }
    }

    /// Run every stage for `handle`, returning the status it ends in
    #[instrument(skip_all, fields(deployment_id = %handle.id()))]
    pub async fn run(&self, handle: DeploymentHandle) -> DeploymentStatus {
        let checkout = self.layout.checkout_dir(handle.id());

        for stage in Stage::ALL {
            if handle.is_deleting() {
                return self.abandon(&handle, &checkout).await;
            }

            if let Err(e) = handle.apply(stage.event()).await {
                error!(%stage, "Cannot enter stage: {}", e);
                return handle.status().await;
            }
            info!(%stage, "Stage started");

            let limit = stage.timeout(&self.settings);
            let what = format!("{} stage", stage);
            let result = bounded(limit, &what, stage.error(), self.execute(stage, &handle, &checkout)).await;

            if let Err(e) = result {
                error!(%stage, "Stage failed: {}", e);
                // Delete's teardown may have run before the stage created anything
                if handle.is_deleting() {
                    return self.abandon(&handle, &checkout).await;
                }
                if let Err(e) = handle.apply(DeploymentEvent::Fail(e.to_string())).await {
                    error!(%stage, "Cannot mark deployment failed: {}", e);
                }
                return handle.status().await;
            }
            debug!(%stage, "Stage complete");
        }

        if handle.is_deleting() {
            return self.abandon(&handle, &checkout).await;
        }

        let deployment = handle.snapshot().await;
        info!(
            port = deployment.port,
            image = deployment.image_ref.as_deref(),
            "Deployment running at {}",
            deployment.endpoint.as_deref().unwrap_or("-")
        );
        deployment.status
    }

    async fn execute(
        &self,
        stage: Stage,
        handle: &DeploymentHandle,
        checkout: &Dir,
    ) -> Result<(), CloudlabError> {
        match stage {
            Stage::Fetch => {
                let source = handle.snapshot().await.source_location;
                self.toolchain.fetcher.fetch(&source, checkout.path()).await
            }
            Stage::Install => self.toolchain.installer.install(checkout.path()).await,
            Stage::Build => {
                ensure_dockerfile(checkout.path()).await.map_err(|e| {
                    CloudlabError::BuildError(format!("cannot write default Dockerfile: {}", e))
                })?;

                // Recorded before building so delete can clean up a partial image
                let image_ref = image_ref_for(handle.id());
                handle
                    .update(|d| d.image_ref = Some(image_ref.clone()))
                    .await;

                self.toolchain.builder.build(checkout.path(), &image_ref).await
            }
            Stage::Start => {
                let image_ref = handle
                    .image_ref()
                    .await
                    .ok_or_else(|| CloudlabError::RunError("no image to start".to_string()))?;

                let port = self.ports.next()?;
                handle.update(|d| d.port = Some(port)).await;
                debug!(port, "Allocated host port");

                self.toolchain
                    .runtime
                    .run(&image_ref, &RunSpec::for_host_port(port))
                    .await?;

                let endpoint = format!("http://{}:{}", self.public_host, port);
                handle
                    .update(|d| {
                        d.endpoint = Some(endpoint);
                        d.apply(DeploymentEvent::Started)
                    })
                    .await?;
                Ok(())
            }
        }
    }

    /// Release what this run produced after a delete started underneath it
    async fn abandon(&self, handle: &DeploymentHandle, checkout: &Dir) -> DeploymentStatus {
        warn!("Deployment deleted mid-pipeline, releasing its resources");
        let image_ref = handle.image_ref().await;
        teardown(
            self.toolchain.runtime.as_ref(),
            handle.id(),
            image_ref.as_deref(),
            checkout,
            self.settings.runtime_timeout,
        )
        .await;
        handle.status().await
    }
}
