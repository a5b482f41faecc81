//! Error types and handling for the OpenRouter proxy.
//!
//! [`AppError`] covers every way a request can fail before its response
//! headers are committed. Variants are listed in the order they are checked
//! for a request: local validation first, then the credential check, then
//! whatever the upstream call produced.

use crate::core::metrics::get_metrics;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Message returned when no server-held credential is configured.
pub const MISSING_API_KEY_MESSAGE: &str = "Missing OpenRouter API key";

/// Message returned for transport-level upstream failures.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error with OpenRouter API";

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Inbound request is malformed (wrong content type, unparsable body)
    #[error("{0}")]
    BadRequest(String),

    /// No server-held API key is configured
    #[error("Missing OpenRouter API key")]
    MissingApiKey,

    /// Upstream answered with a non-2xx status; body is passed through as-is
    #[error("Upstream returned HTTP {status}")]
    Upstream {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    /// Connection-level failure reaching the upstream
    #[error("{}", describe_error(.0))]
    Transport(#[source] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal server errors with custom message
    #[error("{0}")]
    Internal(String),
}

/// Coarse error category used for metrics labels and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Upstream4xx,
    Upstream5xx,
    Timeout,
    Transport,
    Internal,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::Upstream4xx => "upstream_4xx",
            Self::Upstream5xx => "upstream_5xx",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::BadRequest(_) => ErrorCategory::InvalidRequest,
            AppError::MissingApiKey => ErrorCategory::Authentication,
            AppError::Upstream { status, .. } if status.is_server_error() => {
                ErrorCategory::Upstream5xx
            }
            AppError::Upstream { .. } => ErrorCategory::Upstream4xx,
            AppError::Transport(e) if e.is_timeout() => ErrorCategory::Timeout,
            AppError::Transport(_) => ErrorCategory::Transport,
            AppError::Serialization(_) | AppError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Status code the caller will receive.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MissingApiKey => StatusCode::UNAUTHORIZED,
            AppError::Upstream { status, .. } => *status,
            AppError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() || e.is_decode() {
            AppError::Internal(describe_error(&e))
        } else {
            AppError::Transport(e)
        }
    }
}

/// Render an error together with its source chain.
///
/// reqwest's top-level message omits the cause ("error sending request"),
/// which is the part operators actually need.
pub fn describe_error(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.category();
        get_metrics()
            .upstream_errors
            .with_label_values(&[category.as_str()])
            .inc();

        match self {
            AppError::Upstream {
                status,
                content_type,
                body,
            } => {
                tracing::warn!(
                    status = %status,
                    error_category = %category,
                    body_len = body.len(),
                    "Passing upstream error response through"
                );
                let content_type = content_type
                    .unwrap_or_else(|| HeaderValue::from_static("application/json"));
                Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap_or_else(|_| status.into_response())
            }
            AppError::Transport(e) => {
                let details = describe_error(&e);
                tracing::error!(
                    error = %details,
                    is_timeout = e.is_timeout(),
                    is_connect = e.is_connect(),
                    error_category = %category,
                    "Upstream transport failure"
                );
                (
                    status,
                    Json(json!({
                        "error": CONNECTION_ERROR_MESSAGE,
                        "details": details,
                    })),
                )
                    .into_response()
            }
            other => {
                let message = other.to_string();
                if status.is_server_error() {
                    tracing::error!(error = %message, error_category = %category, "Request failed");
                } else {
                    tracing::warn!(error = %message, error_category = %category, "Request rejected");
                }
                (status, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
