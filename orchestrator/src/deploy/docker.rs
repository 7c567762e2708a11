//! Image building and container management through the docker CLI

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::deploy::command;
use crate::errors::CloudlabError;
use crate::models::deployment::ContainerStats;

/// Port every generated image listens on inside the container
pub const CONTAINER_PORT: u16 = 3000;

/// Build descriptor looked up in (and written to) the build context
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Build descriptor used when the repository ships none
pub const DEFAULT_DOCKERFILE: &str = r#"FROM node:18-alpine
WORKDIR /app
COPY package*.json ./
RUN npm install
COPY . .
EXPOSE 3000
CMD ["npm", "start"]
"#;

const STATS_FORMAT: &str = "{{.CPUPerc}}|{{.MemUsage}}";

/// Write the default Dockerfile into `context` unless one exists
///
/// Returns whether a file was written.
pub async fn ensure_dockerfile(context: &Path) -> Result<bool, CloudlabError> {
    let path = context.join(DOCKERFILE_NAME);
    if fs::try_exists(&path).await? {
        return Ok(false);
    }

    info!("No Dockerfile in {}, generating one", context.display());
    fs::write(&path, DEFAULT_DOCKERFILE).await?;
    Ok(true)
}

/// Turns a source tree into a runnable image
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, context: &Path, image_ref: &str) -> Result<(), CloudlabError>;
}

/// Port mapping and environment for a new container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub host_port: u16,
    pub container_port: u16,
    pub env: Vec<(String, String)>,
}

impl RunSpec {
    /// Map `host_port` onto the fixed container port and advertise it as `PORT`
    pub fn for_host_port(host_port: u16) -> Self {
        Self {
            host_port,
            container_port: CONTAINER_PORT,
            env: vec![("PORT".to_string(), CONTAINER_PORT.to_string())],
        }
    }
}

/// Starts, stops, removes and inspects containers
///
/// Containers are addressed by name; `stop`, `remove` and `remove_image`
/// succeed when the target is already gone.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container named after `image_ref`, returning its handle
    async fn run(&self, image_ref: &str, spec: &RunSpec) -> Result<String, CloudlabError>;

    async fn stop(&self, container: &str) -> Result<(), CloudlabError>;

    async fn remove(&self, container: &str) -> Result<(), CloudlabError>;

    async fn remove_image(&self, image_ref: &str) -> Result<(), CloudlabError>;

    async fn stats(&self, container: &str) -> Result<ContainerStats, CloudlabError>;

    async fn logs(&self, container: &str) -> Result<String, CloudlabError>;
}

/// Split `docker stats` output of the form `<cpu>|<memory>`
pub fn parse_stats(raw: &str) -> Result<ContainerStats, CloudlabError> {
    let line = raw.trim();
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();

    match fields.as_slice() {
        [cpu, memory] if !cpu.is_empty() && !memory.is_empty() => Ok(ContainerStats {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }),
        _ => Err(CloudlabError::RuntimeUnavailable(format!(
            "unexpected stats output: {:?}",
            line
        ))),
    }
}

/// Error text docker prints for resources that do not exist
fn is_missing(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("no such container")
        || reason.contains("no such image")
        || reason.contains("not found")
}

/// Builder and runtime backed by the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Use a docker-compatible binary (e.g. `podman`)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn exec(&self, args: &[&str], cwd: Option<&Path>) -> Result<command::CommandOutput, std::io::Error> {
        command::run(&self.program, args, cwd).await
    }

    /// Run a cleanup command, treating an already-missing target as done
    async fn cleanup(&self, args: &[&str], what: &str) -> Result<(), CloudlabError> {
        let output = self.exec(args, None).await.map_err(|e| {
            CloudlabError::RuntimeUnavailable(format!("Failed to run docker {}: {}", args[0], e))
        })?;

        if output.success {
            debug!("{} done", what);
            return Ok(());
        }

        let reason = output.failure_reason();
        if is_missing(&reason) {
            debug!("{} skipped, already gone", what);
            return Ok(());
        }
        Err(CloudlabError::RuntimeUnavailable(format!("{} failed: {}", what, reason)))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, context: &Path, image_ref: &str) -> Result<(), CloudlabError> {
        info!("Building image {} from {}", image_ref, context.display());

        let output = self
            .exec(&["build", "-t", image_ref, "."], Some(context))
            .await
            .map_err(|e| CloudlabError::BuildError(format!("Failed to run docker build: {}", e)))?;

        if !output.success {
            return Err(CloudlabError::BuildError(format!(
                "docker build failed: {}",
                output.failure_reason()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, image_ref: &str, spec: &RunSpec) -> Result<String, CloudlabError> {
        let publish = format!("{}:{}", spec.host_port, spec.container_port);
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["run", "-d"];
        for pair in &env {
            args.push("-e");
            args.push(pair);
        }
        args.extend(["-p", publish.as_str(), "--name", image_ref, image_ref]);

        info!("Starting container {} on host port {}", image_ref, spec.host_port);
        let output = self
            .exec(&args, None)
            .await
            .map_err(|e| CloudlabError::RunError(format!("Failed to run docker run: {}", e)))?;

        if !output.success {
            return Err(CloudlabError::RunError(format!(
                "docker run failed: {}",
                output.failure_reason()
            )));
        }

        debug!("Container id: {}", output.stdout.trim());
        Ok(image_ref.to_string())
    }

    async fn stop(&self, container: &str) -> Result<(), CloudlabError> {
        self.cleanup(&["stop", container], &format!("stop container {}", container))
            .await
    }

    async fn remove(&self, container: &str) -> Result<(), CloudlabError> {
        self.cleanup(&["rm", container], &format!("remove container {}", container))
            .await
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), CloudlabError> {
        self.cleanup(&["rmi", image_ref], &format!("remove image {}", image_ref))
            .await
    }

    async fn stats(&self, container: &str) -> Result<ContainerStats, CloudlabError> {
        let output = self
            .exec(&["stats", container, "--no-stream", "--format", STATS_FORMAT], None)
            .await
            .map_err(|e| {
                CloudlabError::RuntimeUnavailable(format!("Failed to run docker stats: {}", e))
            })?;

        if !output.success {
            return Err(CloudlabError::RuntimeUnavailable(format!(
                "docker stats failed: {}",
                output.failure_reason()
            )));
        }
        parse_stats(&output.stdout)
    }

    async fn logs(&self, container: &str) -> Result<String, CloudlabError> {
        let output = self.exec(&["logs", container], None).await.map_err(|e| {
            CloudlabError::RuntimeUnavailable(format!("Failed to run docker logs: {}", e))
        })?;

        if !output.success {
            return Err(CloudlabError::RuntimeUnavailable(format!(
                "docker logs failed: {}",
                output.failure_reason()
            )));
        }

        // Containers often log to stderr only
        if output.stdout.is_empty() {
            Ok(output.stderr)
        } else {
            Ok(output.stdout)
        }
    }
}
