//! Orchestrator tests against the in-memory toolchain

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cloudlab::deploy::docker::{ContainerRuntime, RunSpec, CONTAINER_PORT};
use cloudlab::deploy::fsm::{DeploymentStatus, PipelineSettings};
use cloudlab::deploy::mock::{MockOp, MockToolchain};
use cloudlab::deploy::pipeline::Toolchain;
use cloudlab::errors::CloudlabError;
use cloudlab::models::deployment::{ContainerStats, Deployment};
use cloudlab::service::orchestrator::Orchestrator;
use cloudlab::storage::layout::StorageLayout;

const REPO: &str = "https://github.com/acme/app.git";

fn orchestrator(root: &Path, mock: &Arc<MockToolchain>) -> Orchestrator {
    orchestrator_with(root, mock, PipelineSettings::default(), 9000)
}

fn orchestrator_with(
    root: &Path,
    mock: &Arc<MockToolchain>,
    settings: PipelineSettings,
    port_base: u16,
) -> Orchestrator {
    Orchestrator::new(
        Toolchain::mock(mock.clone()),
        StorageLayout::new(root),
        settings,
        port_base,
        "localhost",
    )
}

/// Poll until the deployment reaches a status matching `done`
async fn wait_for(
    orchestrator: &Orchestrator,
    id: &str,
    done: impl Fn(DeploymentStatus) -> bool,
) -> Deployment {
    for _ in 0..300 {
        let deployment = orchestrator.find(id).await.unwrap();
        if done(deployment.status) {
            return deployment;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {} did not reach the expected status", id);
}

/// Every distinct status a deployment passes through until it settles
async fn status_history(orchestrator: &Orchestrator, id: &str) -> Vec<DeploymentStatus> {
    let mut history: Vec<DeploymentStatus> = Vec::new();
    for _ in 0..1000 {
        let status = orchestrator.find(id).await.unwrap().status;
        if history.last() != Some(&status) {
            history.push(status);
        }
        if status.is_terminal() {
            return history;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("deployment {} never settled, saw {:?}", id, history);
}

/// Statuses of a successful run, in order
const LIFECYCLE: [DeploymentStatus; 6] = [
    DeploymentStatus::Pending,
    DeploymentStatus::Fetching,
    DeploymentStatus::Installing,
    DeploymentStatus::Building,
    DeploymentStatus::Starting,
    DeploymentStatus::Running,
];

fn lifecycle_position(status: DeploymentStatus) -> usize {
    LIFECYCLE
        .iter()
        .position(|s| *s == status)
        .unwrap_or_else(|| panic!("{} is not part of a successful run", status))
}

/// Runtime whose container only appears after a slow start that then fails
struct LateFailingRuntime {
    inner: Arc<MockToolchain>,
    delay: Duration,
}

#[async_trait]
impl ContainerRuntime for LateFailingRuntime {
    async fn run(&self, image_ref: &str, spec: &RunSpec) -> Result<String, CloudlabError> {
        tokio::time::sleep(self.delay).await;
        self.inner.run(image_ref, spec).await?;
        Err(CloudlabError::RunError("port is already allocated".to_string()))
    }

    async fn stop(&self, container: &str) -> Result<(), CloudlabError> {
        self.inner.stop(container).await
    }

    async fn remove(&self, container: &str) -> Result<(), CloudlabError> {
        self.inner.remove(container).await
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), CloudlabError> {
        self.inner.remove_image(image_ref).await
    }

    async fn stats(&self, container: &str) -> Result<ContainerStats, CloudlabError> {
        self.inner.stats(container).await
    }

    async fn logs(&self, container: &str) -> Result<String, CloudlabError> {
        self.inner.logs(container).await
    }
}

async fn wait_settled(orchestrator: &Orchestrator, id: &str) -> Deployment {
    wait_for(orchestrator, id, |s| s.is_terminal()).await
}

async fn deploy_running(orchestrator: &Orchestrator) -> Deployment {
    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let deployment = wait_settled(orchestrator, &id).await;
    assert_eq!(deployment.status, DeploymentStatus::Running, "{:?}", deployment.error);
    deployment
}

// ================================= DEPLOY ======================================= //

#[tokio::test]
async fn test_deploy_returns_pending_record() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.delay(MockOp::Fetch, Duration::from_millis(100));
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = orchestrator.deploy(format!("  {}  ", REPO).as_str()).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Pending);
    assert_eq!(deployment.source_location, REPO);
    assert!(deployment.port.is_none());
    assert!(deployment.image_ref.is_none());
    assert!(orchestrator.registry().contains(&deployment.id).await);
}

#[tokio::test]
async fn test_deploy_reaches_running() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = deploy_running(&orchestrator).await;

    assert_eq!(deployment.port, Some(9000));
    assert_eq!(deployment.endpoint.as_deref(), Some("http://localhost:9000"));
    assert!(deployment.error.is_none());

    let image = deployment.image_ref.unwrap();
    assert!(image.starts_with(&format!("cloudlab-{}-", deployment.id)));
    assert!(mock.has_image(&image));

    let spec = mock.run_spec(&image).unwrap();
    assert_eq!(spec.host_port, 9000);
    assert_eq!(spec.container_port, CONTAINER_PORT);
    assert!(spec.env.contains(&("PORT".to_string(), "3000".to_string())));

    // Stages ran in order, against this deployment's checkout
    let checkout = StorageLayout::new(root.path()).checkout_dir(&deployment.id);
    assert!(checkout.exists().await);
    assert_eq!(mock.calls_of(MockOp::Fetch), vec![REPO.to_string()]);
    assert_eq!(
        mock.calls_of(MockOp::Install),
        vec![checkout.path().to_string_lossy().to_string()]
    );
    let ops: Vec<MockOp> = mock.calls().into_iter().map(|(op, _)| op).collect();
    assert_eq!(ops, vec![MockOp::Fetch, MockOp::Install, MockOp::Build, MockOp::Run]);
}

#[tokio::test]
async fn test_statuses_follow_the_lifecycle_in_order() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    for op in [MockOp::Fetch, MockOp::Install, MockOp::Build, MockOp::Run] {
        mock.delay(op, Duration::from_millis(60));
    }
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let history = status_history(&orchestrator, &id).await;

    let positions: Vec<usize> = history.iter().map(|s| lifecycle_position(*s)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", history);
    for status in &LIFECYCLE[1..] {
        assert!(history.contains(status), "{} never observed in {:?}", status, history);
    }
}

#[tokio::test]
async fn test_failed_run_is_a_lifecycle_prefix_then_failed() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.delay(MockOp::Fetch, Duration::from_millis(60));
    mock.delay(MockOp::Install, Duration::from_millis(60));
    mock.fail(MockOp::Build);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let mut history = status_history(&orchestrator, &id).await;

    assert_eq!(history.pop(), Some(DeploymentStatus::Failed));
    let positions: Vec<usize> = history.iter().map(|s| lifecycle_position(*s)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", history);
    assert!(history.contains(&DeploymentStatus::Installing));
    assert!(!history.contains(&DeploymentStatus::Starting));
    assert!(!history.contains(&DeploymentStatus::Running));
}

#[tokio::test]
async fn test_deploy_rejects_empty_location() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    for raw in ["", "   "] {
        let err = orchestrator.deploy(raw).await.unwrap_err();
        assert!(matches!(err, CloudlabError::ValidationError(_)));
    }
    assert!(orchestrator.registry().is_empty().await);
    assert!(mock.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deploys_get_distinct_ids_and_ports() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let deploys = (0..10).map(|_| orchestrator.deploy(REPO));
    let ids: Vec<String> = futures::future::join_all(deploys)
        .await
        .into_iter()
        .map(|result| result.unwrap().id)
        .collect();
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 10);

    let mut ports = HashSet::new();
    for id in &ids {
        let deployment = wait_settled(&orchestrator, id).await;
        assert_eq!(deployment.status, DeploymentStatus::Running);
        ports.insert(deployment.port.unwrap());
    }
    assert_eq!(ports.len(), 10);
    assert!(ports.iter().all(|port| (9000..9010).contains(port)));
}

// ================================ FAILURES ====================================== //

#[tokio::test]
async fn test_fetch_failure_marks_failed() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Fetch);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let deployment = wait_settled(&orchestrator, &id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error.as_deref().unwrap().contains("cannot clone"));
    assert!(deployment.port.is_none());
    assert!(deployment.image_ref.is_none());
    assert!(mock.calls_of(MockOp::Install).is_empty());
}

#[tokio::test]
async fn test_build_failure_keeps_image_ref_for_cleanup() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Build);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let deployment = wait_settled(&orchestrator, &id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.image_ref.is_some());
    assert!(deployment.port.is_none());
    assert!(mock.calls_of(MockOp::Run).is_empty());
}

#[tokio::test]
async fn test_run_failure_records_port_without_endpoint() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Run);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let deployment = wait_settled(&orchestrator, &id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(deployment.port, Some(9000));
    assert!(deployment.endpoint.is_none());
}

#[tokio::test]
async fn test_stage_timeout_marks_failed() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.delay(MockOp::Install, Duration::from_secs(5));
    let settings = PipelineSettings {
        install_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(root.path(), &mock, settings, 9000);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let deployment = wait_settled(&orchestrator, &id).await;

    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error.as_deref().unwrap().contains("timed out"));
    assert!(mock.calls_of(MockOp::Build).is_empty());
}

#[tokio::test]
async fn test_port_exhaustion_fails_start() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator_with(root.path(), &mock, PipelineSettings::default(), 65535);

    let first = deploy_running(&orchestrator).await;
    assert_eq!(first.port, Some(65535));

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let second = wait_settled(&orchestrator, &id).await;
    assert_eq!(second.status, DeploymentStatus::Failed);
    assert!(second.port.is_none());
    assert!(second.error.as_deref().unwrap().contains("No host ports left"));
}

// ================================== STOP ======================================== //

#[tokio::test]
async fn test_stop_running_deployment() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = deploy_running(&orchestrator).await;
    let image = deployment.image_ref.clone().unwrap();

    let stopped = orchestrator.stop(&deployment.id).await.unwrap();
    assert_eq!(stopped.status, DeploymentStatus::Stopped);
    assert!(!mock.has_container(&image));
    // The image stays until the deployment is deleted
    assert!(mock.has_image(&image));

    let err = orchestrator.stats(&deployment.id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::RuntimeUnavailable(_)));
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let id = deploy_running(&orchestrator).await.id;
    orchestrator.stop(&id).await.unwrap();
    let again = orchestrator.stop(&id).await.unwrap();

    assert_eq!(again.status, DeploymentStatus::Stopped);
    assert_eq!(mock.calls_of(MockOp::Stop).len(), 1);
}

#[tokio::test]
async fn test_stop_tolerates_runtime_failures() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let id = deploy_running(&orchestrator).await.id;
    mock.fail(MockOp::Stop);
    mock.fail(MockOp::Remove);

    let stopped = orchestrator.stop(&id).await.unwrap();
    assert_eq!(stopped.status, DeploymentStatus::Stopped);
}

#[tokio::test]
async fn test_stop_without_image_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.delay(MockOp::Fetch, Duration::from_millis(300));
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    wait_for(&orchestrator, &id, |s| s == DeploymentStatus::Fetching).await;

    let err = orchestrator.stop(&id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::InvalidState(_)));
    assert_eq!(
        orchestrator.find(&id).await.unwrap().status,
        DeploymentStatus::Fetching
    );
    assert!(mock.calls_of(MockOp::Stop).is_empty());
}

#[tokio::test]
async fn test_stop_failed_deployment_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Build);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    wait_settled(&orchestrator, &id).await;

    let err = orchestrator.stop(&id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::InvalidState(_)));
    assert_eq!(
        orchestrator.find(&id).await.unwrap().status,
        DeploymentStatus::Failed
    );
}

#[tokio::test]
async fn test_stop_unknown_deployment() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let err = orchestrator.stop("nope").await.unwrap_err();
    assert!(matches!(err, CloudlabError::NotFound(_)));
}

// ================================= DELETE ======================================= //

#[tokio::test]
async fn test_delete_releases_everything() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = deploy_running(&orchestrator).await;
    let image = deployment.image_ref.clone().unwrap();
    let checkout = StorageLayout::new(root.path()).checkout_dir(&deployment.id);

    orchestrator.delete(&deployment.id).await.unwrap();

    assert!(orchestrator.list().await.is_empty());
    assert!(!mock.has_container(&image));
    assert!(!mock.has_image(&image));
    assert!(!checkout.exists().await);
    assert_eq!(mock.calls_of(MockOp::Stop), vec![image.clone()]);
    assert_eq!(mock.calls_of(MockOp::RemoveImage), vec![image]);

    let err = orchestrator.delete(&deployment.id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_survives_cleanup_failures() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = deploy_running(&orchestrator).await;
    let image = deployment.image_ref.clone().unwrap();
    let checkout = StorageLayout::new(root.path()).checkout_dir(&deployment.id);
    mock.fail(MockOp::Stop);
    mock.fail(MockOp::Remove);
    mock.fail(MockOp::RemoveImage);

    orchestrator.delete(&deployment.id).await.unwrap();

    // Every step was still attempted
    assert_eq!(mock.calls_of(MockOp::Remove), vec![image.clone()]);
    assert_eq!(mock.calls_of(MockOp::RemoveImage), vec![image]);
    assert!(!checkout.exists().await);
    assert!(!orchestrator.registry().contains(&deployment.id).await);
}

#[tokio::test]
async fn test_delete_failed_deployment_without_image() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Install);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    wait_settled(&orchestrator, &id).await;
    let checkout = StorageLayout::new(root.path()).checkout_dir(&id);
    assert!(checkout.exists().await);

    orchestrator.delete(&id).await.unwrap();

    assert!(!checkout.exists().await);
    assert!(mock.calls_of(MockOp::Stop).is_empty());
    assert!(mock.calls_of(MockOp::RemoveImage).is_empty());
}

#[tokio::test]
async fn test_delete_mid_pipeline_abandons_run() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.delay(MockOp::Install, Duration::from_millis(200));
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    wait_for(&orchestrator, &id, |s| s == DeploymentStatus::Installing).await;

    orchestrator.delete(&id).await.unwrap();
    assert!(!orchestrator.registry().contains(&id).await);

    // Let the install finish; the pipeline must not build or start anything
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(mock.calls_of(MockOp::Build).is_empty());
    assert!(mock.calls_of(MockOp::Run).is_empty());
    assert!(!StorageLayout::new(root.path()).checkout_dir(&id).exists().await);
}

#[tokio::test]
async fn test_delete_during_failing_start_releases_late_container() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    // Keep the image around so the late `run` can still create its container
    mock.fail(MockOp::RemoveImage);
    let toolchain = Toolchain {
        fetcher: mock.clone(),
        installer: mock.clone(),
        builder: mock.clone(),
        runtime: Arc::new(LateFailingRuntime {
            inner: mock.clone(),
            delay: Duration::from_millis(200),
        }),
    };
    let orchestrator = Orchestrator::new(
        toolchain,
        StorageLayout::new(root.path()),
        PipelineSettings::default(),
        9000,
        "localhost",
    );

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    let starting = wait_for(&orchestrator, &id, |s| s == DeploymentStatus::Starting).await;
    let image = starting.image_ref.unwrap();

    orchestrator.delete(&id).await.unwrap();
    assert!(!mock.has_container(&image));

    // The start finishes after the delete: its container must not outlive it
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(mock.calls_of(MockOp::Run), vec![image.clone()]);
    assert!(!mock.has_container(&image));
    assert!(!StorageLayout::new(root.path()).checkout_dir(&id).exists().await);
}

#[tokio::test]
async fn test_delete_unknown_deployment() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let err = orchestrator.delete("nope").await.unwrap_err();
    assert!(matches!(err, CloudlabError::NotFound(_)));
    assert!(mock.calls().is_empty());
}

// ============================== STATS AND LOGS ================================== //

#[tokio::test]
async fn test_stats_and_logs_of_running_deployment() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.set_stats_output("12.50%|48MiB / 1.94GiB\n");
    let orchestrator = orchestrator(root.path(), &mock);

    let deployment = deploy_running(&orchestrator).await;

    let stats = orchestrator.stats(&deployment.id).await.unwrap();
    assert_eq!(stats.cpu, "12.50%");
    assert_eq!(stats.memory, "48MiB / 1.94GiB");

    let logs = orchestrator.logs(&deployment.id).await.unwrap();
    assert!(logs.contains("listening on 3000"));
}

#[tokio::test]
async fn test_stats_malformed_output() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.set_stats_output("garbage");
    let orchestrator = orchestrator(root.path(), &mock);

    let id = deploy_running(&orchestrator).await.id;

    let err = orchestrator.stats(&id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::RuntimeUnavailable(_)));
}

#[tokio::test]
async fn test_runtime_query_failures_are_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let orchestrator = orchestrator(root.path(), &mock);

    let id = deploy_running(&orchestrator).await.id;
    mock.fail(MockOp::Stats);
    mock.fail(MockOp::Logs);

    assert!(matches!(
        orchestrator.stats(&id).await.unwrap_err(),
        CloudlabError::RuntimeUnavailable(_)
    ));
    assert!(matches!(
        orchestrator.logs(&id).await.unwrap_err(),
        CloudlabError::RuntimeUnavailable(_)
    ));
}

#[tokio::test]
async fn test_runtime_query_timeout_is_unavailable() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    let settings = PipelineSettings {
        runtime_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let orchestrator = orchestrator_with(root.path(), &mock, settings, 9000);

    let id = deploy_running(&orchestrator).await.id;
    mock.delay(MockOp::Logs, Duration::from_secs(5));

    let err = orchestrator.logs(&id).await.unwrap_err();
    assert!(matches!(err, CloudlabError::RuntimeUnavailable(_)));
}

#[tokio::test]
async fn test_stats_and_logs_without_container() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Fetch);
    let orchestrator = orchestrator(root.path(), &mock);

    let id = orchestrator.deploy(REPO).await.unwrap().id;
    wait_settled(&orchestrator, &id).await;

    for id in [id.as_str(), "nope"] {
        assert!(matches!(
            orchestrator.stats(id).await.unwrap_err(),
            CloudlabError::NotFound(_)
        ));
        assert!(matches!(
            orchestrator.logs(id).await.unwrap_err(),
            CloudlabError::NotFound(_)
        ));
    }
    assert!(mock.calls_of(MockOp::Stats).is_empty());
}

// ================================== LIST ======================================== //

#[tokio::test]
async fn test_list_is_stable_and_complete() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockToolchain::new());
    mock.fail(MockOp::Fetch);
    let orchestrator = orchestrator(root.path(), &mock);

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(orchestrator.deploy(REPO).await.unwrap().id);
    }
    for id in &ids {
        wait_settled(&orchestrator, id).await;
    }

    let listed: Vec<String> = orchestrator.list().await.into_iter().map(|d| d.id).collect();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed.iter().collect::<HashSet<_>>(), ids.iter().collect::<HashSet<_>>());
    let again: Vec<String> = orchestrator.list().await.into_iter().map(|d| d.id).collect();
    assert_eq!(listed, again);
}
