use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that affect the whole proxy: startup, the transport connection or the listener.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Unsupported transport/router identifier or an inconsistent configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The StatsD transport could not be opened.
    #[error("StatsD connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// The HTTP listener could not be bound or stopped serving on its own.
    #[error("HTTP listener error: {0}")]
    Bind(#[source] std::io::Error),

    /// TLS certificate or private key could not be loaded.
    #[error("TLS error: {0}")]
    Tls(#[source] std::io::Error),

    /// The listener did not drain in-flight requests within the grace period.
    #[error("HTTP server did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// An I/O error from the standard library.
    #[error("Std Io error: {0}")]
    StdIo(#[from] std::io::Error),
}

impl From<String> for ProxyError {
    fn from(value: String) -> Self {
        Self::Configuration(value)
    }
}

impl From<&str> for ProxyError {
    fn from(value: &str) -> Self {
        Self::Configuration(value.to_string())
    }
}

/// A malformed metric request. Always the client's fault, answered with `400 Bad Request`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `value` of a count or gauge is not an integer.
    #[error("Invalid value specified")]
    InvalidValue,

    /// `value` of a set is not an integer.
    #[error("Invalid set value specified")]
    InvalidSetValue,

    /// `sampleRate` is not a number in `(0, 1]`.
    #[error("Invalid sample rate specified")]
    InvalidSampleRate,

    /// `time` is missing or not a 64-bit integer.
    #[error("Invalid time specified")]
    InvalidTime,

    /// The request body is neither form-urlencoded nor multipart form data.
    #[error("Invalid request body")]
    InvalidBody,

    /// The metric name is empty.
    #[error("Metric key not specified")]
    EmptySuffix,
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}
