//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler. Reports `degraded` when the store does not
/// answer a ping.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.provider.client().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("Store ping failed: {}", e);
            "degraded"
        }
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Keel Reconciliation Server"
}
