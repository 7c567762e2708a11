//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::CloudlabError;
use crate::models::deployment::{ContainerStats, Deployment};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Service error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(CloudlabError);

impl From<CloudlabError> for ApiError {
    fn from(error: CloudlabError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            CloudlabError::ValidationError(_) | CloudlabError::InvalidState(_) => {
                StatusCode::BAD_REQUEST
            }
            CloudlabError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self.0 {
            // Validation messages are meant for the caller as they are
            CloudlabError::ValidationError(message) => message,
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(ErrorResponse { message: self.message() })).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "cloudlab".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Deploy request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    #[serde(default)]
    pub repo_url: String,
}

/// Message plus the affected deployment
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub message: String,
    pub data: Deployment,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Container logs
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: String,
}

/// Deploy handler
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|e| CloudlabError::ValidationError(e.body_text()))?;
    let deployment = state.orchestrator.deploy(&request.repo_url).await?;
    Ok(Json(DeployResponse {
        message: "Deployment started".to_string(),
        data: deployment,
    }))
}

/// Deployments list handler
pub async fn deployments_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<Deployment>> {
    Json(state.orchestrator.list().await)
}

/// Single deployment handler
pub async fn deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Deployment>, ApiError> {
    Ok(Json(state.orchestrator.find(&id).await?))
}

/// Stop handler
pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator.stop(&id).await?;
    Ok(Json(MessageResponse {
        message: "Deployment stopped".to_string(),
    }))
}

/// Delete handler
pub async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.orchestrator.delete(&id).await?;
    Ok(Json(MessageResponse {
        message: "Deployment deleted completely".to_string(),
    }))
}

/// Container stats handler
pub async fn stats_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerStats>, ApiError> {
    Ok(Json(state.orchestrator.stats(&id).await?))
}

/// Container logs handler
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<LogsResponse>, ApiError> {
    let logs = state.orchestrator.logs(&id).await?;
    Ok(Json(LogsResponse { logs }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CloudlabError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (CloudlabError::InvalidState("x".into()), StatusCode::BAD_REQUEST),
            (CloudlabError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                CloudlabError::RuntimeUnavailable("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_validation_message_is_passed_through() {
        let error = ApiError::from(CloudlabError::ValidationError("Repo URL required".into()));
        assert_eq!(error.message(), "Repo URL required");
    }
}
