//! Keel Server - serves the resource lifecycle over HTTP.
//!
//! Each resource kind (database, collection, index) gets the same set of
//! endpoints under `/v1/{kind}/`. Handlers build a call context from the
//! request, run the matching driver operation and return the recorded state.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use axum::Router;
use keel_engine::Provider;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Provider,
    /// Deadline applied when a request does not set one
    pub call_timeout: Duration,
}

impl AppState {
    pub fn new(provider: Provider, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
