//! Request handlers for lifecycle operations.

mod lifecycle;

pub use lifecycle::*;

use crate::error::{AppError, Result};
use axum::http::HeaderMap;
use keel_engine::CallContext;
use std::time::Duration;

/// Header a caller sets to bound one lifecycle call, in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-keel-timeout-ms";

/// Build the call context for a request.
///
/// The deadline comes from [`TIMEOUT_HEADER`] when present, otherwise from
/// the configured default.
pub fn call_context(headers: &HeaderMap, default_timeout: Duration) -> Result<CallContext> {
    let timeout = match headers.get(TIMEOUT_HEADER) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "{TIMEOUT_HEADER} must be a positive number of milliseconds"
                ))
            })?,
        None => default_timeout,
    };

    let ctx = CallContext::new().with_timeout(timeout);
    tracing::debug!(call_id = %ctx.call_id(), timeout_ms = timeout.as_millis() as u64, "call context");
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn header_sets_deadline() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("250"));
        let before = tokio::time::Instant::now();
        let ctx = call_context(&headers, Duration::from_secs(30)).unwrap();
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= before + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn bad_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("soon"));
        assert!(matches!(
            call_context(&headers, Duration::from_secs(30)),
            Err(AppError::BadRequest(_))
        ));
    }
}
