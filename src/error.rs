//! Common error types for the gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unknown: {0}")]
    ServiceNotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Circuit open for service: {0}")]
    CircuitOpen(String),

    #[error("Upstream call failed: {0}")]
    Upstream(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable error code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::Forbidden(_) => "FORBIDDEN",
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::NotFound(_) | GatewayError::ServiceNotFound(_) => "NOT_FOUND",
            GatewayError::ServiceUnavailable(_)
            | GatewayError::CircuitOpen(_)
            | GatewayError::Upstream(_) => "SERVICE_UNAVAILABLE",
            GatewayError::RateLimited => "RATE_LIMITED",
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) | GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ServiceUnavailable(_)
            | GatewayError::CircuitOpen(_)
            | GatewayError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to expose to clients. Internal variants are collapsed so
    /// underlying causes stay in the server logs only.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                "Internal server error".to_string()
            }
            GatewayError::Upstream(_) | GatewayError::CircuitOpen(_) => {
                "Service temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = Json(ApiResponse::failure(self.code(), self.public_message()));
        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_causes_are_not_exposed() {
        let err = GatewayError::Internal("secret connection string".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.public_message().contains("secret"));
    }

    #[test]
    fn availability_errors_share_one_code() {
        for err in [
            GatewayError::ServiceUnavailable("photo".into()),
            GatewayError::CircuitOpen("photo".into()),
            GatewayError::Upstream("connection refused".into()),
        ] {
            assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
            assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
