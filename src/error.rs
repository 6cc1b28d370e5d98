//! Error types for the taqueria review service
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Client errors (4xx) carry a JSON body `{"error": "..."}`.
/// Server errors (5xx) are logged and answered with a bare status.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown OAuth provider name (400)
    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    /// Referenced user or taqueria does not exist (500)
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// OAuth provider rejected or failed the exchange (502)
    #[error("OAuth provider error: {0}")]
    OAuth(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::InvalidProvider(_) => (StatusCode::BAD_REQUEST, "invalid_provider"),
            AppError::OAuth(_) => (StatusCode::BAD_GATEWAY, "oauth"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "http_client"),
            AppError::ForeignKeyViolation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "foreign_key_violation")
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            AppError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encryption"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_type) = self.status_and_type();

        // Record error metric
        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[error_type])
            .inc();

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
            return status.into_response();
        }

        let error_message = match self {
            AppError::Validation(msg) => msg,
            AppError::OAuth(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Validation("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidProvider("myspace".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn foreign_key_violation_is_server_error() {
        let response = AppError::ForeignKeyViolation("FOREIGN KEY constraint failed".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provider_errors_map_to_bad_gateway() {
        assert_eq!(
            AppError::OAuth("token exchange failed".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
