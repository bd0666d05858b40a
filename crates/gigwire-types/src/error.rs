//! Error types for Gigwire
//!
//! Every failure carries a kind so the HTTP layer can map it to a status
//! code without inspecting message text.

use thiserror::Error;

use crate::JobStatus;

/// Result type for Gigwire operations
pub type Result<T> = std::result::Result<T, GigwireError>;

/// Gigwire error types
#[derive(Debug, Clone, Error)]
pub enum GigwireError {
    /// Schema or range failure on an input
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// No such job or result
    #[error("Job {job_id} not found")]
    JobNotFound { job_id: String },

    /// No escrow record held for the job
    #[error("No escrow held for job {job_id}")]
    EscrowNotFound { job_id: String },

    /// Transition not permitted from the current state
    #[error("Cannot {action} job {job_id} in status {current}")]
    InvalidState {
        job_id: String,
        current: JobStatus,
        action: &'static str,
    },

    /// Caller wallet does not match the required role
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Submitted transaction does not meet the payment requirements
    #[error("Payment invalid: {reason}")]
    PaymentInvalid { reason: String },

    /// Chain submit/confirm failure
    #[error("Payment backend error: {reason}")]
    PaymentBackend { reason: String },

    /// Too many requests
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// All other failures
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GigwireError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Create a payment-invalid error
    pub fn payment_invalid(reason: impl Into<String>) -> Self {
        Self::PaymentInvalid {
            reason: reason.into(),
        }
    }

    /// Create a payment-backend error
    pub fn payment_backend(reason: impl Into<String>) -> Self {
        Self::PaymentBackend {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The error kind, used by the HTTP adapter for status mapping
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::JobNotFound { .. } | Self::EscrowNotFound { .. } => "not_found",
            Self::InvalidState { .. } => "state_error",
            Self::Unauthorized { .. } => "authorization",
            Self::PaymentInvalid { .. } => "payment_invalid",
            Self::PaymentBackend { .. } => "payment_backend",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether the message is safe to quote to a client verbatim.
    ///
    /// Internal errors may wrap arbitrary lower-level messages and are
    /// replaced by a generic message at the HTTP boundary.
    pub fn is_quotable(&self) -> bool {
        !matches!(self, Self::Internal { .. })
    }
}
