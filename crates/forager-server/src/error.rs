use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use forager_core::error::ProductError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `ProductError`.
pub struct ApiError(pub ProductError);

impl From<ProductError> for ApiError {
    fn from(err: ProductError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            ProductError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ProductError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            ProductError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ProductError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
            ProductError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            ProductError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            ProductError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
