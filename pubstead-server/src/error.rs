//! # Error Handling and Response Types
//!
//! Two layers of errors live here:
//!
//! - [`RegistryError`]: the typed outcome of every core registry operation
//!   (model, stores, upload pipeline, access control). Each variant is a distinct
//!   kind so callers can branch on it; in particular [`RegistryError::NotFound`]
//!   means "absent locally" and drives the upstream fallback rather than an error
//!   response.
//! - [`AppError`]: the HTTP-facing error returned by handlers. It wraps
//!   `RegistryError` and request-level failures, and renders them in the
//!   envelope pub clients understand:
//!
//! ```json
//! { "error": { "code": "version_conflict", "message": "..." } }
//! ```
//!
//! Server-side failures are logged with full detail and reported to the caller
//! only as `internal server error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Typed outcome of core registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid pubspec: {0}")]
    InvalidManifest(String),

    #[error("archive does not contain a pubspec.yaml")]
    MissingManifest,

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("version {version} of package {package} already exists")]
    VersionConflict { package: String, version: String },

    #[error(
        "version {attempted} of package {package} must be greater than the latest version {latest}"
    )]
    VersionOutOfOrder {
        package: String,
        latest: String,
        attempted: String,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} is already an uploader")]
    AlreadyExists(String),

    #[error("{0} is not an uploader")]
    UploaderNotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("upload of {actual} bytes exceeds the limit of {max} bytes")]
    UploadTooLarge { actual: u64, max: u64 },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl RegistryError {
    /// Convenience constructor for engine failures with context.
    pub fn storage(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        RegistryError::Storage(format!("{context}: {err}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

/// Result type for core registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    InvalidManifest,
    MissingManifest,
    InvalidArchive,
    BadRequest,
    VersionConflict,
    VersionOutOfOrder,
    Forbidden,
    AlreadyExists,
    UploaderNotFound,
    Unauthorized,
    UploadTooLarge,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidManifest => "invalid_manifest",
            ErrorCode::MissingManifest => "missing_manifest",
            ErrorCode::InvalidArchive => "invalid_archive",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::VersionConflict => "version_conflict",
            ErrorCode::VersionOutOfOrder => "version_out_of_order",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::UploaderNotFound => "uploader_not_found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::UploadTooLarge => "upload_too_large",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound | ErrorCode::UploaderNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidManifest
            | ErrorCode::MissingManifest
            | ErrorCode::InvalidArchive
            | ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::VersionConflict
            | ErrorCode::VersionOutOfOrder
            | ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, ErrorCode::InternalError)
    }
}

impl From<&RegistryError> for ErrorCode {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            RegistryError::InvalidManifest(_) => ErrorCode::InvalidManifest,
            RegistryError::MissingManifest => ErrorCode::MissingManifest,
            RegistryError::InvalidArchive(_) => ErrorCode::InvalidArchive,
            RegistryError::InvalidInput(_) => ErrorCode::BadRequest,
            RegistryError::VersionConflict { .. } => ErrorCode::VersionConflict,
            RegistryError::VersionOutOfOrder { .. } => ErrorCode::VersionOutOfOrder,
            RegistryError::Forbidden(_) => ErrorCode::Forbidden,
            RegistryError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            RegistryError::UploaderNotFound(_) => ErrorCode::UploaderNotFound,
            RegistryError::Unauthorized(_) => ErrorCode::Unauthorized,
            RegistryError::UploadTooLarge { .. } => ErrorCode::UploadTooLarge,
            RegistryError::Storage(_) => ErrorCode::InternalError,
        }
    }
}

/// Body of an error response.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Serialize, Debug)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

/// HTTP-facing error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Registry(err) => ErrorCode::from(err),
            // The body limit surfaces while reading a multipart field.
            AppError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::UploadTooLarge
            }
            AppError::Multipart(_) | AppError::BadRequest(_) => ErrorCode::BadRequest,
            AppError::Json(_) | AppError::Io(_) | AppError::InternalError(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Message safe to return to an untrusted caller.
    pub fn public_message(&self) -> String {
        if self.error_code().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: ApiErrorBody {
                code: self.error_code().as_str().to_string(),
                message: self.public_message(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code.is_server_error() {
            tracing::error!(error = %self, "Request failed with internal error");
        } else {
            tracing::info!(error = %self, code = code.as_str(), "Request rejected");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Convenient result type for handler operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = AppError::from(RegistryError::VersionConflict {
            package: "retry".to_string(),
            version: "1.0.0".to_string(),
        });
        assert_eq!(err.error_code().http_status(), StatusCode::CONFLICT);
        let body = err.to_error_response();
        assert_eq!(body.error.code, "version_conflict");
        assert!(body.error.message.contains("1.0.0"));
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::from(RegistryError::Storage(
            "disk /var/lib/pubstead is full".to_string(),
        ));
        assert_eq!(
            err.error_code().http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let body = err.to_error_response();
        assert_eq!(body.error.message, "internal server error");
        assert!(!body.error.message.contains("/var/lib"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RegistryError::MissingManifest, StatusCode::BAD_REQUEST),
            (
                RegistryError::Forbidden("no".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                RegistryError::AlreadyExists("a@b.c".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                RegistryError::UploaderNotFound("a@b.c".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                RegistryError::UploadTooLarge { actual: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ErrorCode::from(&err).http_status(), status, "{err}");
        }
    }
}
