//! API error types.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ffbox_media::{ErrorClass, MediaError};
use ffbox_storage::StorageError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Media(e) => match e.class() {
                ErrorClass::Validation => StatusCode::BAD_REQUEST,
                ErrorClass::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                ErrorClass::NotFound => StatusCode::NOT_FOUND,
                ErrorClass::External => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(StorageError::InvalidFilename(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors whose text may carry paths or OS details.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Storage(StorageError::Io(_))
                | ApiError::Media(MediaError::Io(_))
        )
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge("File too large".to_string())
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

/// Error body: `{code, msg}` with the HTTP status as `code`.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    msg: String,
}

/// Response extension marking a message that may carry paths or OS details.
#[derive(Debug, Clone, Copy)]
pub struct InternalDetail;

fn error_response(status: StatusCode, msg: String) -> Response {
    let body = ErrorResponse {
        code: status.as_u16(),
        msg,
    };
    (status, Json(body)).into_response()
}

/// Same status, generic message.
pub fn redacted_response(status: StatusCode) -> Response {
    error_response(status, "Internal server error".to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let internal = self.is_internal();
        let mut response = error_response(status, self.to_string());
        if internal {
            response.extensions_mut().insert(InternalDetail);
        }
        response
    }
}
