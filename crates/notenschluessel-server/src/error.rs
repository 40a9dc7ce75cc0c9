//! Error types for the server.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Seconds until the client earns another request.
        retry_after_seconds: u64,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Session store or rate limiter error.
    #[error("Registry error: {0}")]
    Registry(#[from] notenschluessel_registry::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::RateLimitExceeded { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded")
            }
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ServerError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let detail = self.to_string();

        // Internal causes are logged but never sent to the client.
        let message = match &self {
            ServerError::Internal(_) | ServerError::Registry(_) => {
                tracing::error!(status = %status, code, error = %detail, "Server error");
                "Internal server error".to_string()
            }
            _ => {
                tracing::warn!(status = %status, code, error = %detail, "Client error");
                detail
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        match self {
            ServerError::RateLimitExceeded {
                retry_after_seconds,
            } => (
                status,
                [(header::RETRY_AFTER, retry_after_seconds.to_string())],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}
