//! API error type and its HTTP mapping.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use kacls_directory::DirectoryError;
use kacls_envelope::EnvelopeError;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Caller is not allowed (403).
    #[error("{0}")]
    Forbidden(String),

    /// Unknown or expired resource (404).
    #[error("{0}")]
    NotFound(String),

    /// Server-side failure (500). The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::InvalidInput(_) | EnvelopeError::AlreadyRotated(_) => {
                Self::BadRequest(err.to_string())
            }
            EnvelopeError::Denied(_) => Self::Forbidden(err.to_string()),
            EnvelopeError::KeyNotFound(_) => Self::NotFound("Key not found or expired".into()),
            EnvelopeError::DecryptionFailed
            | EnvelopeError::Seal(_)
            | EnvelopeError::Storage(_)
            | EnvelopeError::Crypto(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidInput(_) | DirectoryError::UnsupportedAlgorithm(_) => {
                Self::BadRequest(err.to_string())
            }
            DirectoryError::Denied => Self::Forbidden("Unauthorized user".into()),
            DirectoryError::NotFound(_) => Self::NotFound("Public key not found for this user".into()),
        }
    }
}
