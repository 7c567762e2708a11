//! Application configuration options

use std::time::Duration;

use crate::deploy::fsm::PipelineSettings;
use crate::deploy::ports::DEFAULT_PORT_BASE;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, ToolchainKind};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub layout: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// Pipeline configuration
    pub deploy: DeployOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            server: ServerOptions::default(),
            deploy: DeployOptions::default(),
        }
    }
}

impl AppOptions {
    /// Options described by a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let timeouts = &settings.timeouts;
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            layout: StorageLayout::new(settings.base_dir.clone()),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            deploy: DeployOptions {
                toolchain: settings.toolchain,
                container_cli: settings.container_cli.clone(),
                port_base: settings.port_base,
                public_host: settings.public_host.clone(),
                pipeline: PipelineSettings {
                    fetch_timeout: Duration::from_secs(timeouts.fetch_secs),
                    install_timeout: Duration::from_secs(timeouts.install_secs),
                    build_timeout: Duration::from_secs(timeouts.build_secs),
                    start_timeout: Duration::from_secs(timeouts.start_secs),
                    runtime_timeout: Duration::from_secs(timeouts.runtime_secs),
                },
            },
        }
    }
}

/// Lifecycle options for the orchestrator
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Deployment pipeline options
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Which collaborators run the stages
    pub toolchain: ToolchainKind,

    /// Docker-compatible CLI
    pub container_cli: String,

    /// First host port handed out
    pub port_base: u16,

    /// Host name used in deployment URLs
    pub public_host: String,

    /// Stage timeouts
    pub pipeline: PipelineSettings,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            toolchain: ToolchainKind::System,
            container_cli: "docker".to_string(),
            port_base: DEFAULT_PORT_BASE,
            public_host: "localhost".to_string(),
            pipeline: PipelineSettings::default(),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_carries_timeouts() {
        let settings: Settings = serde_json::from_str(
            r#"{"base_dir":"/srv/cloudlab","server":{"port":8100},"timeouts":{"build_secs":60}}"#,
        )
        .unwrap();

        let options = AppOptions::from_settings(&settings);
        assert_eq!(options.server.port, 8100);
        assert_eq!(options.server.host, "0.0.0.0");
        assert_eq!(options.layout.base_dir, std::path::PathBuf::from("/srv/cloudlab"));
        assert_eq!(options.deploy.pipeline.build_timeout, Duration::from_secs(60));
        assert_eq!(options.deploy.pipeline.fetch_timeout, Duration::from_secs(300));
        assert_eq!(options.lifecycle.max_shutdown_delay, Duration::from_secs(30));
    }
}
