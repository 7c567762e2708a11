//! In-memory registry of deployments
//!
//! The registry owns the map of every known deployment. Each record lives
//! behind its own lock so the pipeline can update one deployment while other
//! requests list, find or remove the rest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::deploy::fsm::{DeploymentEvent, DeploymentStatus};
use crate::errors::CloudlabError;
use crate::models::deployment::Deployment;
use crate::utils::generate_uuid;

/// Shared reference to one registered deployment
///
/// Clones point at the same record, so updates made through one handle are
/// visible through all of them.
#[derive(Debug, Clone)]
pub struct DeploymentHandle {
    id: String,
    record: Arc<RwLock<Deployment>>,
    deleting: Arc<AtomicBool>,
}

impl DeploymentHandle {
    fn new(deployment: Deployment) -> Self {
        Self {
            id: deployment.id.clone(),
            record: Arc::new(RwLock::new(deployment)),
            deleting: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the record as it is now
    pub async fn snapshot(&self) -> Deployment {
        self.record.read().await.clone()
    }

    pub async fn status(&self) -> DeploymentStatus {
        self.record.read().await.status
    }

    pub async fn image_ref(&self) -> Option<String> {
        self.record.read().await.image_ref.clone()
    }

    /// Mutate the record in place
    pub async fn update<R>(&self, f: impl FnOnce(&mut Deployment) -> R) -> R {
        let mut record = self.record.write().await;
        let result = f(&mut record);
        record.updated_at = chrono::Utc::now();
        result
    }

    /// Advance the record's status by one event
    pub async fn apply(&self, event: DeploymentEvent) -> Result<DeploymentStatus, CloudlabError> {
        self.record.write().await.apply(event)
    }

    /// Claim the deployment for deletion
    ///
    /// Only the first caller gets `true`.
    pub fn begin_delete(&self) -> bool {
        !self.deleting.swap(true, Ordering::SeqCst)
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting.load(Ordering::SeqCst)
    }
}

/// Authoritative set of deployments, keyed by id
#[derive(Debug, Default)]
pub struct Registry {
    deployments: RwLock<HashMap<String, DeploymentHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending deployment under a fresh id
    pub async fn create(&self, source_location: &str) -> DeploymentHandle {
        let mut deployments = self.deployments.write().await;

        let mut id = generate_uuid();
        while deployments.contains_key(&id) {
            id = generate_uuid();
        }

        let handle = DeploymentHandle::new(Deployment::new(id.clone(), source_location));
        deployments.insert(id.clone(), handle.clone());
        debug!(deployment_id = %id, "Registered deployment");

        handle
    }

    /// Snapshot of every deployment, oldest first
    pub async fn list(&self) -> Vec<Deployment> {
        let handles: Vec<DeploymentHandle> =
            self.deployments.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.snapshot().await);
        }
        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        snapshots
    }

    pub async fn find(&self, id: &str) -> Result<DeploymentHandle, CloudlabError> {
        self.deployments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CloudlabError::NotFound(format!("deployment {}", id)))
    }

    pub async fn remove(&self, id: &str) -> Result<(), CloudlabError> {
        match self.deployments.write().await.remove(id) {
            Some(_) => {
                debug!(deployment_id = %id, "Unregistered deployment");
                Ok(())
            }
            None => Err(CloudlabError::NotFound(format!("deployment {}", id))),
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.deployments.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.deployments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
