/// Unified error types for the Files backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for account, session and board operations
#[derive(Error, Debug)]
pub enum AppError {
    /// Transient infrastructure failure (database unreachable, busy, ...)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// No matching account or email
    #[error("Not found: {0}")]
    NotFound(String),

    /// No credential addition holds the presented token
    #[error("Token not found")]
    TokenNotFound,

    /// Duplicate email on registration, duplicate link, duplicate answer
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Re-confirmation or resend on a settled account
    #[error("Email already confirmed")]
    AlreadyConfirmed,

    /// The token's window has lapsed
    #[error("Token expired")]
    TokenExpired,

    /// Password confirmation fields differ
    #[error("Passwords do not match")]
    Mismatch,

    /// OAuth anti-forgery check failed
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Email dispatch failed after state was already persisted
    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Identity provider errors (code exchange, userinfo)
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Only transient store failures are worth retrying on the caller side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StoreUnavailable(_))
    }

    /// Stable machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AppError::StoreUnavailable(_) => "StoreUnavailable",
            AppError::NotFound(_) => "NotFound",
            AppError::TokenNotFound => "TokenNotFound",
            AppError::AlreadyExists(_) => "AlreadyExists",
            AppError::AlreadyConfirmed => "AlreadyConfirmed",
            AppError::TokenExpired => "TokenExpired",
            AppError::Mismatch => "Mismatch",
            AppError::StateMismatch => "StateMismatch",
            AppError::NotificationFailed(_) => "NotificationFailed",
            AppError::Validation(_) => "InvalidRequest",
            AppError::Authentication(_) => "AuthenticationRequired",
            AppError::Authorization(_) => "Forbidden",
            AppError::Provider(_) => "ProviderError",
            AppError::RateLimitExceeded { .. } => "RateLimitExceeded",
            AppError::Internal(_) | AppError::Io(_) => "InternalServerError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::TokenNotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) | AppError::AlreadyConfirmed => StatusCode::CONFLICT,
            AppError::TokenExpired => StatusCode::GONE,
            AppError::Mismatch | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StateMismatch | AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::NotificationFailed(_) | AppError::Internal(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Don't leak details
            AppError::StoreUnavailable(e) => {
                tracing::error!("store failure: {}", e);
                "Service temporarily unavailable".to_string()
            }
            AppError::Internal(_) | AppError::Io(_) => {
                tracing::error!("internal failure: {}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
