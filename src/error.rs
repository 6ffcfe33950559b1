//! Error handling for protect-bridge

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad credentials or expired bearer token (triggers renewal)
    #[error("Authorization failure: {0}")]
    Auth(String),

    /// Network / timeout while talking to the NVR
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Value store read/write failure (per-item skip, batch continues)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Unexpected API shape; the affected record is skipped
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write to a non-writable state path
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unexpected response from the NVR API
    #[error("API error: {0}")]
    Api(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::Auth(msg) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone()),
            Error::Transport(e) => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR", e.to_string()),
            Error::Backend(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "BACKEND_ERROR",
                msg.clone(),
            ),
            Error::Malformed(msg) => (StatusCode::BAD_REQUEST, "MALFORMED_DATA", msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            Error::Api(msg) => (StatusCode::BAD_GATEWAY, "API_ERROR", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Sqlx(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
