//! Admin HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ApiError;
use crate::server::handlers::{health_handler, result_handler, version_handler};
use crate::server::state::ServerState;

/// Build the admin router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/results", post(result_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the admin HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ApiError>>, ApiError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting admin HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ApiError::ServerError(e.to_string()))
    });

    Ok(handle)
}
