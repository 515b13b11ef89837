//! HTTP route definitions.

mod health;
mod resources;

pub use resources::Routed;

use crate::error::AppError;
use crate::AppState;
use axum::http::Uri;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(resources::routes())
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}
