//! Error types and handling for the application server.
//!
//! Each layer owns its own error vocabulary:
//!
//! - [`ConfigError`]: malformed or invalid startup configuration
//! - [`DispatchError`]: listener lifecycle failures (bind, invalid state)
//! - [`ClientError`]: failures talking to the backend inference server
//! - [`ApiError`]: per-request failures, converted into HTTP responses

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to open config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source ended before line `line`.
    #[error("Line {line}: missing {field}")]
    MissingLine { line: usize, field: &'static str },

    /// Line `line` is blank or a comment where a value is expected.
    #[error("Line {line}: {field} is required")]
    MissingValue { line: usize, field: &'static str },

    /// A port line is not an integer.
    #[error("Line {line}: invalid port number '{value}'")]
    InvalidPort { line: usize, value: String },

    #[error("Invalid {field} port: {port} (must be between 1024 and 65535)")]
    PortOutOfRange { field: &'static str, port: i64 },

    #[error("llama-server and app-server ports must be different (both are {port})")]
    PortConflict { port: i64 },

    #[error("llama-server not found or not executable: {}", path.display())]
    BackendNotExecutable { path: PathBuf },

    #[error("Model file not found or not readable: {}", path.display())]
    ModelNotReadable { path: PathBuf },
}

impl ConfigError {
    /// The 1-based config line this error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ConfigError::MissingLine { line, .. }
            | ConfigError::MissingValue { line, .. }
            | ConfigError::InvalidPort { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Dispatcher lifecycle errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The listener could not bind to the configured port.
    ///
    /// `port` is the raw configured value, which may lie outside `u16`.
    #[error("Failed to start server on port {port}: {source}")]
    Bind {
        port: i64,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed after binding.
    #[error("Server on port {port} failed: {source}")]
    Serve {
        port: i64,
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a dispatcher that is already listening or stopped.
    #[error("Dispatcher cannot start from state {0}")]
    InvalidState(&'static str),

    /// The backend client could not be built from the config.
    #[error("Invalid backend configuration: {0}")]
    Backend(#[from] ClientError),
}

/// Errors raised by [`crate::services::BackendClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// No response was received (connection refused, timeout, reset).
    #[error("HTTP request failed: connection error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The backend answered with a non-200 status.
    #[error("HTTP request failed with status: {status}")]
    Backend { status: u16, body: String },

    /// The backend answered 200 but the body is not valid JSON.
    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend URL could not be split into host and port.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Only transport failures are worth retrying; everything else is a
    /// definitive answer from the backend.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// HTTP status returned by the backend, for [`ClientError::Backend`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Per-request errors on the business route.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The inbound body is not valid JSON. The handler is never invoked.
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The body could not be read (too large, aborted upload).
    #[error("Invalid request body: {0}")]
    BodyRejected(#[from] BytesRejection),

    /// The business handler returned an error.
    #[error("{0:#}")]
    Handler(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::BodyRejected(rejection) => rejection.status(),
            ApiError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": "failed"
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`ApiError`].
pub type Result<T> = std::result::Result<T, ApiError>;
