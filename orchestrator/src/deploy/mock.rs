//! In-memory toolchain for exercising the pipeline without git, npm or docker

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

use crate::deploy::docker::{parse_stats, ContainerRuntime, ImageBuilder, RunSpec};
use crate::deploy::git::SourceFetcher;
use crate::deploy::npm::DependencyInstaller;
use crate::errors::CloudlabError;
use crate::models::deployment::ContainerStats;

/// Operation a [`MockToolchain`] can be told to fail or slow down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Fetch,
    Install,
    Build,
    Run,
    Stop,
    Remove,
    RemoveImage,
    Stats,
    Logs,
}

#[derive(Debug, Default)]
struct MockState {
    failures: HashSet<MockOp>,
    delays: HashMap<MockOp, Duration>,
    images: HashSet<String>,
    containers: HashMap<String, RunSpec>,
    calls: Vec<(MockOp, String)>,
    stats_output: Option<String>,
}

/// Fake fetcher, installer, builder and runtime sharing one state
///
/// Fetching creates the destination directory with a `package.json`, so
/// checkout cleanup can be observed on disk.
#[derive(Debug, Default)]
pub struct MockToolchain {
    state: Mutex<MockState>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every later call of `op` fail
    pub fn fail(&self, op: MockOp) {
        self.state().failures.insert(op);
    }

    /// Let `op` succeed again
    pub fn heal(&self, op: MockOp) {
        self.state().failures.remove(&op);
    }

    /// Sleep for `delay` before completing `op`
    pub fn delay(&self, op: MockOp, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    /// Raw text returned by `docker stats` for live containers
    pub fn set_stats_output(&self, raw: impl Into<String>) {
        self.state().stats_output = Some(raw.into());
    }

    pub fn has_image(&self, image_ref: &str) -> bool {
        self.state().images.contains(image_ref)
    }

    pub fn has_container(&self, container: &str) -> bool {
        self.state().containers.contains_key(container)
    }

    /// Spec a container was started with
    pub fn run_spec(&self, container: &str) -> Option<RunSpec> {
        self.state().containers.get(container).cloned()
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<(MockOp, String)> {
        self.state().calls.clone()
    }

    /// Calls of one kind, in order
    pub fn calls_of(&self, op: MockOp) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Record the call, wait out any delay, and report whether it should fail
    async fn enter(&self, op: MockOp, target: &str) -> bool {
        let (delay, failing) = {
            let mut state = self.state();
            state.calls.push((op, target.to_string()));
            (state.delays.get(&op).copied(), state.failures.contains(&op))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failing
    }
}

#[async_trait]
impl SourceFetcher for MockToolchain {
    async fn fetch(&self, source: &str, destination: &Path) -> Result<(), CloudlabError> {
        if self.enter(MockOp::Fetch, source).await {
            return Err(CloudlabError::FetchError(format!("cannot clone {}", source)));
        }
        if fs::try_exists(destination).await? {
            return Err(CloudlabError::FetchError(format!(
                "destination {} already exists",
                destination.display()
            )));
        }
        fs::create_dir_all(destination).await?;
        fs::write(destination.join("package.json"), "{\"name\":\"mock\"}").await?;
        Ok(())
    }
}

#[async_trait]
impl DependencyInstaller for MockToolchain {
    async fn install(&self, workdir: &Path) -> Result<(), CloudlabError> {
        if self.enter(MockOp::Install, &workdir.to_string_lossy()).await {
            return Err(CloudlabError::InstallError("npm install failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for MockToolchain {
    async fn build(&self, _context: &Path, image_ref: &str) -> Result<(), CloudlabError> {
        if self.enter(MockOp::Build, image_ref).await {
            return Err(CloudlabError::BuildError(format!("cannot build {}", image_ref)));
        }
        self.state().images.insert(image_ref.to_string());
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MockToolchain {
    async fn run(&self, image_ref: &str, spec: &RunSpec) -> Result<String, CloudlabError> {
        if self.enter(MockOp::Run, image_ref).await {
            return Err(CloudlabError::RunError(format!("cannot run {}", image_ref)));
        }
        let mut state = self.state();
        if !state.images.contains(image_ref) {
            return Err(CloudlabError::RunError(format!("no such image: {}", image_ref)));
        }
        if state.containers.values().any(|c| c.host_port == spec.host_port) {
            return Err(CloudlabError::RunError(format!(
                "port {} is already allocated",
                spec.host_port
            )));
        }
        state.containers.insert(image_ref.to_string(), spec.clone());
        Ok(image_ref.to_string())
    }

    async fn stop(&self, container: &str) -> Result<(), CloudlabError> {
        if self.enter(MockOp::Stop, container).await {
            return Err(CloudlabError::RuntimeUnavailable("daemon not reachable".to_string()));
        }
        Ok(())
    }

    async fn remove(&self, container: &str) -> Result<(), CloudlabError> {
        if self.enter(MockOp::Remove, container).await {
            return Err(CloudlabError::RuntimeUnavailable("daemon not reachable".to_string()));
        }
        self.state().containers.remove(container);
        Ok(())
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), CloudlabError> {
        if self.enter(MockOp::RemoveImage, image_ref).await {
            return Err(CloudlabError::RuntimeUnavailable("daemon not reachable".to_string()));
        }
        self.state().images.remove(image_ref);
        Ok(())
    }

    async fn stats(&self, container: &str) -> Result<ContainerStats, CloudlabError> {
        if self.enter(MockOp::Stats, container).await {
            return Err(CloudlabError::RuntimeUnavailable("daemon not reachable".to_string()));
        }
        let state = self.state();
        if !state.containers.contains_key(container) {
            return Err(CloudlabError::RuntimeUnavailable(format!(
                "no such container: {}",
                container
            )));
        }
        let raw = state
            .stats_output
            .clone()
            .unwrap_or_else(|| "0.00%|1MiB / 1GiB".to_string());
        parse_stats(&raw)
    }

    async fn logs(&self, container: &str) -> Result<String, CloudlabError> {
        if self.enter(MockOp::Logs, container).await {
            return Err(CloudlabError::RuntimeUnavailable("daemon not reachable".to_string()));
        }
        if !self.has_container(container) {
            return Err(CloudlabError::RuntimeUnavailable(format!(
                "no such container: {}",
                container
            )));
        }
        Ok(format!("> {} listening on 3000\n", container))
    }
}
