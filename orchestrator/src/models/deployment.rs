//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{transition, DeploymentEvent, DeploymentStatus};
use crate::errors::CloudlabError;

/// A source repository being turned into a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Repository location handed to the source fetcher
    #[serde(rename = "repoUrl")]
    pub source_location: String,

    /// Current pipeline status
    pub status: DeploymentStatus,

    /// Host port mapped to the container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Image (and container) name
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Reachable address once running
    #[serde(rename = "url", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Reason of the stage failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a new deployment in pending state
    pub fn new(id: impl Into<String>, source_location: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source_location: source_location.into(),
            status: DeploymentStatus::Pending,
            port: None,
            image_ref: None,
            endpoint: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status by one event
    ///
    /// Invalid transitions leave the record untouched.
    pub fn apply(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, CloudlabError> {
        let next = transition(self.status, &event)?;
        if let DeploymentEvent::Fail(reason) = event {
            self.error = Some(reason);
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}

/// Live resource usage reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// CPU usage, as formatted by the runtime (e.g. "0.15%")
    pub cpu: String,

    /// Memory usage, as formatted by the runtime (e.g. "12MiB / 1.9GiB")
    pub memory: String,
}
