//! Error types for the request layer.
//!
//! Failures travel through two layers. [`NetworkError`] describes what went
//! wrong while talking to the HTTP client. Before anything reaches a caller it
//! is normalized once into a [`RequestError`], the fixed-shape record returned
//! by every request.

use serde::{Deserialize, Serialize};

/// Message used for every explicitly cancelled request.
pub const CANCELED_MESSAGE: &str = "Request canceled";

/// Message used when a failure carries no usable `message` field.
pub const GENERIC_MESSAGE: &str = "Something went wrong";

/// Transport-level errors raised while issuing a request.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// Response body could not be decoded into the requested type.
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// Request was cancelled.
    #[error("Request was cancelled")]
    Cancelled,
    /// HTTP error status (anything outside 2xx).
    #[error("HTTP {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, if it parsed as JSON.
        body: Option<serde_json::Value>,
    },
    /// Redirect limit exceeded.
    #[error("Too many redirects")]
    TooManyRedirects,
    /// Proxy configuration error.
    #[error("Proxy error: {0}")]
    Proxy(String),
    /// A response interceptor rejected the response.
    #[error("Rejected by interceptor: {0}")]
    Interceptor(String),
}

impl NetworkError {
    /// The response payload attached to this failure, if any.
    pub fn response_body(&self) -> Option<&serde_json::Value> {
        match self {
            Self::HttpStatus { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Check if this error signals explicit cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for NetworkError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for transport operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// The normalized failure record returned by every request.
///
/// Serializes as `{"success": false, "message": "..."}`, with `error_code`
/// present only when the server supplied one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    /// Always `false`.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Numeric error code from the response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

impl RequestError {
    /// Create a normalized error.
    pub fn new(message: impl Into<String>, error_code: Option<i64>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_code,
        }
    }

    /// The error produced for cancelled requests.
    pub fn canceled() -> Self {
        Self::new(CANCELED_MESSAGE, None)
    }

    /// Check if this is the cancellation error.
    pub fn is_canceled(&self) -> bool {
        self.error_code.is_none() && self.message == CANCELED_MESSAGE
    }

    /// Normalize a transport failure.
    ///
    /// Cancellation maps to [`RequestError::canceled`]. Otherwise the message
    /// and code are read from the response payload's `message` and
    /// `error_code` fields, falling back to [`GENERIC_MESSAGE`].
    pub fn normalize(error: &NetworkError) -> Self {
        if error.is_cancelled() {
            return Self::canceled();
        }

        let body = error.response_body();
        let message = body
            .and_then(|body| body.get("message"))
            .and_then(serde_json::Value::as_str)
            .filter(|message| !message.is_empty())
            .unwrap_or(GENERIC_MESSAGE);
        let error_code = body
            .and_then(|body| body.get("error_code"))
            .and_then(serde_json::Value::as_i64);

        Self::new(message, error_code)
    }
}

impl From<NetworkError> for RequestError {
    fn from(error: NetworkError) -> Self {
        Self::normalize(&error)
    }
}

impl From<&NetworkError> for RequestError {
    fn from(error: &NetworkError) -> Self {
        Self::normalize(error)
    }
}
