//! Settings file management

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deploy::ports::DEFAULT_PORT_BASE;
use crate::errors::CloudlabError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Read the settings file, falling back to defaults when it does not exist
pub async fn load_settings(file: &File) -> Result<Settings, CloudlabError> {
    if !file.exists().await {
        return Ok(Settings::default());
    }
    file.read_json::<Settings>().await.map_err(|e| {
        CloudlabError::ConfigError(format!("{}: {}", file.path().display(), e))
    })
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under `<base_dir>/logs`
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Host name used when building deployment URLs
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// First host port handed to deployments
    #[serde(default = "default_port_base")]
    pub port_base: u16,

    /// Root of checkouts and log files
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Collaborators that run the pipeline
    #[serde(default)]
    pub toolchain: ToolchainKind,

    /// Docker-compatible CLI used to build and run images
    #[serde(default = "default_container_cli")]
    pub container_cli: String,

    /// Stage timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Upper bound for a graceful shutdown, in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_public_host() -> String {
    "localhost".to_string()
}

fn default_port_base() -> u16 {
    DEFAULT_PORT_BASE
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("cloudlab")
}

fn default_container_cli() -> String {
    "docker".to_string()
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            public_host: default_public_host(),
            port_base: default_port_base(),
            base_dir: default_base_dir(),
            toolchain: ToolchainKind::default(),
            container_cli: default_container_cli(),
            timeouts: TimeoutSettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Which collaborators the pipeline drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    /// git, npm and the container CLI
    #[default]
    System,

    /// In-memory fakes; nothing is cloned, built or run
    Mock,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Stage timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,

    #[serde(default = "default_install_secs")]
    pub install_secs: u64,

    #[serde(default = "default_build_secs")]
    pub build_secs: u64,

    #[serde(default = "default_start_secs")]
    pub start_secs: u64,

    /// Stop, remove, stats and logs calls
    #[serde(default = "default_runtime_secs")]
    pub runtime_secs: u64,
}

fn default_fetch_secs() -> u64 {
    300
}

fn default_install_secs() -> u64 {
    600
}

fn default_build_secs() -> u64 {
    900
}

fn default_start_secs() -> u64 {
    120
}

fn default_runtime_secs() -> u64 {
    30
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            install_secs: default_install_secs(),
            build_secs: default_build_secs(),
            start_secs: default_start_secs(),
            runtime_secs: default_runtime_secs(),
        }
    }
}
