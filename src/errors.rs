use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::storage::StorageError;

/// Error taxonomy at the HTTP boundary. Every variant maps to a status code
/// and a JSON body of the shape `{ "error": "<message>" }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad or missing input, including a failed CSRF check (400)
    #[error("{0}")]
    Validation(String),

    /// No logged-in user in the session (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Failed login attempt (401); deliberately does not say which part was wrong
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Logged in, but not allowed to do this (403)
    #[error("{0}")]
    Forbidden(String),

    /// Resource does not exist (404)
    #[error("{0}")]
    NotFound(String),

    /// Duplicate resource (409)
    #[error("{0}")]
    Conflict(String),

    /// Sliding-window rate limit exceeded (429)
    #[error("Too many {0} attempts. Please try again later.")]
    RateLimited(String),

    /// Unexpected failure; detail is logged, the client gets a generic body (500)
    #[error("An internal server error occurred")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_csrf() -> Self {
        Self::Validation("Invalid CSRF token".to_string())
    }

    pub fn admin_required() -> Self {
        Self::Forbidden("Admin privileges required".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!("internal error: {}", detail);
        }
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UserNotFound(id) => ApiError::NotFound(format!("User not found: {}", id)),
            StorageError::PostNotFound(_) => ApiError::NotFound("Post not found".to_string()),
            StorageError::CommentNotFound(_) => {
                ApiError::NotFound("Comment not found".to_string())
            }
            StorageError::CategoryNotFound(_) => {
                ApiError::NotFound("Category not found".to_string())
            }
            StorageError::DuplicateUsername(_) => {
                ApiError::Conflict("Username already exists".to_string())
            }
            StorageError::DuplicateEmail(_) => {
                ApiError::Conflict("Email already exists".to_string())
            }
            StorageError::DuplicateCategory(_) => {
                ApiError::Conflict("Category already exists".to_string())
            }
            StorageError::InvalidVerificationToken => {
                ApiError::Validation("Invalid or expired verification token".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::invalid_csrf().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::admin_required().status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::RateLimited("login".to_string()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_rate_limited_message() {
        let err = ApiError::RateLimited("login".to_string());
        assert_eq!(
            err.to_string(),
            "Too many login attempts. Please try again later."
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: ApiError = StorageError::DuplicateUsername("bob".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        let err: ApiError = StorageError::PostNotFound("x".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
