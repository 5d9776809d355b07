/// Error types for the geopost service
///
/// Every failure a handler can surface maps onto one of these variants, and
/// each variant onto exactly one HTTP status.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Result type for geopost-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed required input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A write was attempted without a resolvable device identifier
    #[error("Device ID required: {0}")]
    AuthRequired(String),

    /// Target of a mutation does not exist or is owned by another device.
    /// The two cases are reported identically.
    #[error("Post not found or permission denied")]
    NotFoundOrForbidden,

    /// Post store failure
    #[error("Database error: {0}")]
    Backend(String),

    /// Object storage failure
    #[error("Storage error: {0}")]
    Upload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            AppError::Backend(_) | AppError::Upload(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Backend(err.to_string())
    }
}

impl From<s3_utils::S3Error> for AppError {
    fn from(err: s3_utils::S3Error) -> Self {
        AppError::Upload(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
