//! Error types for the Cloudlab orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum CloudlabError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Cloning the source repository failed
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Installing dependencies in the checkout failed
    #[error("Install error: {0}")]
    InstallError(String),

    /// Building the container image failed
    #[error("Build error: {0}")]
    BuildError(String),

    /// Starting the container failed
    #[error("Run error: {0}")]
    RunError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A live query against the container runtime failed
    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("No host ports left to allocate (last tried {0})")]
    PortsExhausted(u32),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}
