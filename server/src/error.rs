//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keel_engine::Error as EngineError;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Engine(e) => match e {
                EngineError::InvalidIdentity { .. }
                | EngineError::Validation { .. }
                | EngineError::InvalidExtendedJson { .. } => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::AlreadyExists { .. } | EngineError::ReplaceRequired { .. } => {
                    StatusCode::CONFLICT
                }
                EngineError::CreateFailed { .. } | EngineError::Store { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                EngineError::Cancelled | EngineError::DeadlineExceeded => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                EngineError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_message, details) = match &self {
            AppError::Engine(EngineError::Store { operation, source }) => {
                tracing::error!("Store error during {}: {}", operation, source);
                (format!("{operation} failed"), Some(source.to_string()))
            }
            AppError::Engine(EngineError::ReplaceRequired { fields, .. }) => {
                tracing::warn!("Engine error: {}", self);
                (self.to_string(), Some(fields.join(", ")))
            }
            AppError::Engine(e) if status.is_server_error() => {
                tracing::error!("Engine error: {:?}", e);
                (e.to_string(), None)
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (e.to_string(), None)
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) => (msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
