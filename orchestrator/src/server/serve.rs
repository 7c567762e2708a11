//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::CloudlabError;
use crate::server::handlers::{
    delete_handler, deploy_handler, deployment_handler, deployments_handler, health_handler,
    logs_handler, stats_handler, stop_handler, version_handler,
};
use crate::server::state::ServerState;

/// Routes of the orchestrator API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deploy", post(deploy_handler))
        .route("/deployments", get(deployments_handler))
        .route("/deployments/{id}", get(deployment_handler))
        .route("/stop/{id}", post(stop_handler))
        .route("/delete/{id}", delete(delete_handler))
        // Container queries
        .route("/stats/{id}", get(stats_handler))
        .route("/logs/{id}", get(logs_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), CloudlabError>>, CloudlabError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| CloudlabError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| CloudlabError::ServerError(e.to_string()))
    });

    Ok(handle)
}
