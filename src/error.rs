//! # Error Handling
//!
//! This module defines the application's error taxonomy and how each kind is
//! turned into an HTTP response.
//!
//! ## Error Categories:
//! - **BadUpload**: the form submission itself is unusable (400, plain text)
//! - **PayloadTooLarge**: the upload exceeds the configured limit (413, plain text)
//! - **MediaDecode**: the uploaded file has no decodable audio
//! - **RecognitionService**: the remote recognizer failed or heard nothing
//! - **Internal / ConfigError**: server-side problems (500, JSON)
//!
//! `MediaDecode` and `RecognitionService` normally never reach `error_response`:
//! the upload handler catches them and renders them inline on the page.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::BadUpload("No file uploaded".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Server-side failures (disk I/O, template rendering, ...)
    Internal(String),

    /// Missing file part, empty filename, disallowed extension
    BadUpload(String),

    /// Upload larger than `uploads.max_file_size_mb`
    PayloadTooLarge(String),

    /// Source media unreadable, no audio stream, or extraction failed
    MediaDecode(String),

    /// Recognizer unreachable, rejected the audio, timed out, or returned nothing usable
    RecognitionService(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            // Shown to the user verbatim, e.g. "No file uploaded"
            AppError::BadUpload(msg) => write!(f, "{}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "{}", msg),
            AppError::MediaDecode(msg) => write!(f, "Media decode error: {}", msg),
            AppError::RecognitionService(msg) => {
                write!(f, "Speech recognition error: {}", msg)
            }
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Machine-readable name used in JSON bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadUpload(_) => "bad_upload",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::MediaDecode(_) => "media_decode_error",
            AppError::RecognitionService(_) => "recognition_service_error",
            AppError::ConfigError(_) => "config_error",
        }
    }

    /// True for the two failures the pipeline itself can produce.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(self, AppError::MediaDecode(_) | AppError::RecognitionService(_))
    }
}

/// Maps each error to a status code and body.
///
/// Upload problems answer with a plain-text reason so a browser shows the
/// message as-is; everything else uses the JSON shape:
/// ```json
/// {
///   "error": {
///     "type": "internal_error",
///     "message": "...",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadUpload(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MediaDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RecognitionService(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        match self {
            AppError::BadUpload(msg) | AppError::PayloadTooLarge(msg) => HttpResponse::build(status)
                .content_type("text/plain; charset=utf-8")
                .body(msg.clone()),
            _ => HttpResponse::build(status).json(json!({
                "error": {
                    "type": self.kind(),
                    "message": self.to_string(),
                    "timestamp": chrono::Utc::now().to_rfc3339()
                }
            })),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// A multipart body that cannot be parsed is a bad upload, not a server fault.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadUpload(format!("Malformed upload: {}", err))
    }
}

impl From<tera::Error> for AppError {
    fn from(err: tera::Error) -> Self {
        AppError::Internal(format!("Template error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_bad_upload_displays_reason_verbatim() {
        let err = AppError::BadUpload("No file uploaded".to_string());
        assert_eq!(err.to_string(), "No file uploaded");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_failures() {
        assert!(AppError::MediaDecode("x".into()).is_pipeline_failure());
        assert!(AppError::RecognitionService("x".into()).is_pipeline_failure());
        assert!(!AppError::BadUpload("x".into()).is_pipeline_failure());
        assert!(!AppError::Internal("x".into()).is_pipeline_failure());
    }

    #[actix_web::test]
    async fn test_bad_upload_response_is_plain_text() {
        let resp = AppError::BadUpload("No selected file".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], b"No selected file");
    }

    #[actix_web::test]
    async fn test_internal_error_response_is_json() {
        let resp = AppError::Internal("disk full".to_string()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "internal_error");
        assert_eq!(value["error"]["message"], "Internal error: disk full");
    }
}
