//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use beatsync_media::MediaError;
use beatsync_models::{ParamError, UploadRejection};
use beatsync_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Longest slice of processor stderr echoed back to the caller.
const MAX_DIAGNOSTIC_CHARS: usize = 4000;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Processing(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(MediaError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Processing(_)
            | ApiError::Internal(_)
            | ApiError::Storage(_)
            | ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "client_error",
            ApiError::PayloadTooLarge(_) => "too_large",
            ApiError::NotFound(_) => "not_found",
            ApiError::Timeout(_) => "timeout",
            ApiError::Processing(_) => "processing",
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Media(_) => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Media(_)
        )
    }
}

impl From<UploadRejection> for ApiError {
    fn from(rejection: UploadRejection) -> Self {
        if rejection.is_too_large() {
            ApiError::PayloadTooLarge(rejection.to_string())
        } else {
            ApiError::BadRequest(rejection.to_string())
        }
    }
}

impl From<ParamError> for ApiError {
    fn from(err: ParamError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("File is too large.".to_string())
        } else {
            ApiError::BadRequest(format!("Invalid upload: {}", err.body_text()))
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Timeout(_) => ApiError::Timeout(
                "Processing timeout. Video might be too complex or long.".to_string(),
            ),
            MediaError::ProcessorFailed { stderr, exit_code } => {
                let diagnostic = diagnostic_tail(&stderr);
                let diagnostic = if diagnostic.is_empty() {
                    match exit_code {
                        Some(code) => format!("processor exited with status {}", code),
                        None => "processor was terminated by a signal".to_string(),
                    }
                } else {
                    diagnostic
                };
                ApiError::Processing(format!("Video processing failed: {}", diagnostic))
            }
            MediaError::MissingOutput(_) => ApiError::Processing(
                "Processing completed but output file was not created".to_string(),
            ),
            other => ApiError::Media(other),
        }
    }
}

/// Last `MAX_DIAGNOSTIC_CHARS` characters of the tool's stderr, trimmed.
fn diagnostic_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal faults are logged in full but never echoed (paths, OS errors).
        let message = if self.is_internal() {
            error!(kind = self.kind(), "Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
        };

        (status, Json(body)).into_response()
    }
}
