//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use blacktree_wire::ResultMessage;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ApiError;
use crate::messaging::consumer::ApplyOutcome;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "blacktree-api".to_string(),
        version: state.version.clone(),
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Outcome of a replayed result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub deployment_id: Uuid,

    /// `applied`, `unchanged` or `ignored`
    pub outcome: &'static str,

    /// Status stored after the result was handled
    pub status: DeploymentStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Apply a result message as if it had arrived on the result queue
pub async fn result_handler(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let message = match ResultMessage::from_payload(&body) {
        Ok(message) => message,
        Err(e) => return error_response(ApiError::DecodeError(e.to_string())),
    };

    match state
        .consumer
        .apply_result_status(message.deployment_id, &message.status)
        .await
    {
        Ok(outcome) => {
            let (outcome, status) = match outcome {
                ApplyOutcome::Applied { to, .. } => ("applied", to),
                ApplyOutcome::Unchanged(status) => ("unchanged", status),
                ApplyOutcome::Ignored { current, .. } => ("ignored", current),
            };
            Json(ResultResponse {
                deployment_id: message.deployment_id,
                outcome,
                status,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// HTTP status for an error
pub fn status_code(err: &ApiError) -> StatusCode {
    match err {
        ApiError::DecodeError(_) | ApiError::UnknownStatus(_) | ApiError::ValidationError(_) => {
            StatusCode::BAD_REQUEST
        }
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        ApiError::Conflict(_) => StatusCode::CONFLICT,
        e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ApiError) -> Response {
    let status = status_code(&err);
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
