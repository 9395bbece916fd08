//! API error types and their HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::task::{StoreError, SubmitError};

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error category, e.g. `ValidationError`
    pub error: &'static str,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed, missing or empty input
    #[error("{message}")]
    Validation { message: String, details: String },

    /// Missing upstream credential
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    /// A stored task record could not be read back
    #[error("{message}")]
    StorageCorruption { message: String, details: String },

    /// Too many outstanding tasks
    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Configuration(_)
            | ApiError::StorageCorruption { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "ValidationError",
            ApiError::Configuration(_) => "ConfigurationError",
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::StorageCorruption { .. } => "StorageCorruptionError",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::Internal(_) => "InternalError",
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Validation { details, .. } | ApiError::StorageCorruption { details, .. } => {
                Some(details.clone())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", self);
        }
        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
            status_code: status.as_u16(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(
            "Request body must be a valid JSON object",
            rejection.body_text(),
        )
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ApiError::NotFound(format!("Task {} not found", id)),
            StoreError::Corrupted { task_id, reason } => ApiError::StorageCorruption {
                message: format!("Task {} record is unreadable", task_id),
                details: reason,
            },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Configuration => ApiError::Configuration(
                "Language model credential (GEMINI_API_KEY) is not configured".to_string(),
            ),
            SubmitError::QueueFull(outstanding) => ApiError::ServiceUnavailable(format!(
                "Too many tasks in progress ({}), try again later",
                outstanding
            )),
            SubmitError::Store(e) => ApiError::Internal(format!("Failed to create task: {}", e)),
        }
    }
}
