//! Finite State Machine for the deployment pipeline

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CloudlabError;

/// Per-stage time budgets for the pipeline and for runtime queries
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Timeout for cloning the source repository
    pub fetch_timeout: Duration,

    /// Timeout for installing dependencies
    pub install_timeout: Duration,

    /// Timeout for building the image
    pub build_timeout: Duration,

    /// Timeout for starting the container
    pub start_timeout: Duration,

    /// Timeout for stop/remove/stats/logs calls against the runtime
    pub runtime_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(300),
            install_timeout: Duration::from_secs(600),
            build_timeout: Duration::from_secs(900),
            start_timeout: Duration::from_secs(120),
            runtime_timeout: Duration::from_secs(30),
        }
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Registered, pipeline not started
    Pending,

    /// Cloning the repository
    Fetching,

    /// Installing dependencies
    Installing,

    /// Building the image
    Building,

    /// Starting the container
    Starting,

    /// Container is up
    Running,

    /// Container stopped by the operator
    Stopped,

    /// A stage failed
    Failed,
}

impl DeploymentStatus {
    /// Whether the pipeline has nothing left to do for this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Running | DeploymentStatus::Stopped | DeploymentStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Fetching => "fetching",
            DeploymentStatus::Installing => "installing",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Begin cloning
    Fetch,

    /// Checkout ready, begin installing
    Install,

    /// Dependencies ready, begin building
    Build,

    /// Image ready, begin starting the container
    Start,

    /// Container started
    Started,

    /// Operator stopped the container
    Stop,

    /// A stage failed
    Fail(String),
}

/// Compute the status reached from `from` on `event`
///
/// Any pair not listed here is an invalid transition.
pub fn transition(
    from: DeploymentStatus,
    event: &DeploymentEvent,
) -> Result<DeploymentStatus, CloudlabError> {
    let to = match (from, event) {
        (DeploymentStatus::Pending, DeploymentEvent::Fetch) => DeploymentStatus::Fetching,
        (DeploymentStatus::Fetching, DeploymentEvent::Install) => DeploymentStatus::Installing,
        (DeploymentStatus::Installing, DeploymentEvent::Build) => DeploymentStatus::Building,
        (DeploymentStatus::Building, DeploymentEvent::Start) => DeploymentStatus::Starting,
        (DeploymentStatus::Starting, DeploymentEvent::Started) => DeploymentStatus::Running,
        (DeploymentStatus::Running, DeploymentEvent::Stop) => DeploymentStatus::Stopped,

        (state, DeploymentEvent::Fail(_)) if !state.is_terminal() => DeploymentStatus::Failed,

        (state, event) => {
            return Err(CloudlabError::InvalidState(format!(
                "cannot apply {:?} to a deployment that is {}",
                event, state
            )));
        }
    };

    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(events: Vec<DeploymentEvent>) -> Result<DeploymentStatus, CloudlabError> {
        events
            .iter()
            .try_fold(DeploymentStatus::Pending, |state, event| transition(state, event))
    }

    #[test]
    fn test_transitions_happy_path() {
        let end = walk(vec![
            DeploymentEvent::Fetch,
            DeploymentEvent::Install,
            DeploymentEvent::Build,
            DeploymentEvent::Start,
            DeploymentEvent::Started,
        ])
        .unwrap();
        assert_eq!(end, DeploymentStatus::Running);

        let stopped = transition(end, &DeploymentEvent::Stop).unwrap();
        assert_eq!(stopped, DeploymentStatus::Stopped);
    }

    #[test]
    fn test_fail_from_every_active_state() {
        for state in [
            DeploymentStatus::Pending,
            DeploymentStatus::Fetching,
            DeploymentStatus::Installing,
            DeploymentStatus::Building,
            DeploymentStatus::Starting,
        ] {
            let next = transition(state, &DeploymentEvent::Fail("boom".to_string())).unwrap();
            assert_eq!(next, DeploymentStatus::Failed);
        }
    }

    #[test]
    fn test_terminal_states_reject_failure() {
        for state in [
            DeploymentStatus::Running,
            DeploymentStatus::Stopped,
            DeploymentStatus::Failed,
        ] {
            assert!(transition(state, &DeploymentEvent::Fail("late".to_string())).is_err());
        }
    }

    #[test]
    fn test_no_skipping() {
        assert!(walk(vec![DeploymentEvent::Build]).is_err());
        assert!(walk(vec![DeploymentEvent::Fetch, DeploymentEvent::Start]).is_err());
        assert!(transition(DeploymentStatus::Building, &DeploymentEvent::Stop).is_err());
        assert!(transition(DeploymentStatus::Failed, &DeploymentEvent::Fetch).is_err());
    }
}
