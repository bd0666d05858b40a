//! API error handling
//!
//! Services raise kind-tagged `GigwireError`s; this module maps them to
//! HTTP status codes and sanitized response bodies. Only messages
//! constructed by our own services are quoted to clients; anything else
//! is replaced with a generic message and logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use gigwire_types::GigwireError;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// API-layer error with an HTTP mapping
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Schema or range failure (400)
    Validation(String),
    /// No such job or result (404)
    NotFound(String),
    /// Transition not permitted from the current state (400)
    StateError(String),
    /// Caller wallet does not match the required role (403)
    Forbidden(String),
    /// Submitted transaction does not meet the requirements (402)
    PaymentInvalid(String),
    /// Chain submit/confirm error (502)
    PaymentBackend,
    /// Too many requests (429)
    TooManyRequests { retry_after_secs: u64 },
    /// Job is cancelled or expired; the result will never exist (410)
    Gone(String),
    /// Everything else (500)
    Internal,
}

/// Serialized error body: `{error, message}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error kind, stable across releases
    pub error: String,
    /// Sanitized human-readable message
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::StateError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PaymentInvalid(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentBackend => StatusCode::BAD_GATEWAY,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Gone(_) => StatusCode::GONE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::StateError(_) => "state_error",
            Self::Forbidden(_) => "authorization",
            Self::PaymentInvalid(_) => "payment_invalid",
            Self::PaymentBackend => "payment_backend",
            Self::TooManyRequests { .. } => "rate_limited",
            Self::Gone(_) => "gone",
            Self::Internal => "internal",
        }
    }

    /// Client-visible message. The quotable set is closed: backend and
    /// internal failures collapse to fixed text.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::StateError(m)
            | Self::Forbidden(m)
            | Self::PaymentInvalid(m)
            | Self::Gone(m) => m.clone(),
            Self::PaymentBackend => "payment backend unavailable".to_string(),
            Self::TooManyRequests { .. } => "too many requests".to_string(),
            Self::Internal => "internal server error".to_string(),
        }
    }
}

impl From<&ApiError> for ErrorResponse {
    fn from(error: &ApiError) -> Self {
        Self {
            error: error.kind().to_string(),
            message: error.message(),
        }
    }
}

impl From<GigwireError> for ApiError {
    fn from(err: GigwireError) -> Self {
        match &err {
            GigwireError::Validation { .. } => Self::Validation(err.to_string()),
            GigwireError::JobNotFound { .. } | GigwireError::EscrowNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            GigwireError::InvalidState { .. } => Self::StateError(err.to_string()),
            GigwireError::Unauthorized { .. } => Self::Forbidden(err.to_string()),
            GigwireError::PaymentInvalid { .. } => Self::PaymentInvalid(err.to_string()),
            GigwireError::PaymentBackend { .. } => {
                tracing::error!(error = %err, "payment backend failure");
                Self::PaymentBackend
            }
            GigwireError::RateLimited { retry_after_secs } => Self::TooManyRequests {
                retry_after_secs: *retry_after_secs,
            },
            GigwireError::Internal { .. } => {
                tracing::error!(error = %err, "internal failure");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from(&self);

        let mut response = (status, Json(body)).into_response();
        if let Self::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_kinds() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::StateError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PaymentInvalid("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(ApiError::PaymentBackend.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::Gone("x".into()).status_code(),
            StatusCode::GONE
        );
    }

    #[test]
    fn backend_and_internal_messages_are_generic() {
        let err: ApiError = GigwireError::payment_backend("rpc: secret url leaked").into();
        assert_eq!(err.message(), "payment backend unavailable");

        let err: ApiError = GigwireError::internal("stack trace details").into();
        assert_eq!(err.message(), "internal server error");
    }

    #[test]
    fn domain_messages_pass_through() {
        let err: ApiError = GigwireError::payment_invalid("deposit transaction already used").into();
        assert_eq!(err.kind(), "payment_invalid");
        assert_eq!(err.message(), "Payment invalid: deposit transaction already used");
    }
}
