use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Every failure a handler can report. Each kind maps to one status code and
/// one stable machine-readable code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Issue quota exceeded: free accounts may report {limit} issues, upgrade to premium")]
    QuotaExceeded { limit: u32 },

    #[error("Payment not completed: {0}")]
    PaymentIncomplete(String),

    #[error("Payment mismatch: {0}")]
    PaymentMismatch(String),

    #[error("Payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("Payload too large: limit is {limit_bytes} bytes")]
    PayloadTooLarge { limit_bytes: usize },

    #[error("Internal error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            Self::AccountBlocked => (StatusCode::FORBIDDEN, "ACCOUNT_BLOCKED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::InvalidOperation(_) => (StatusCode::BAD_REQUEST, "INVALID_OPERATION"),
            Self::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::QuotaExceeded { .. } => (StatusCode::FORBIDDEN, "QUOTA_EXCEEDED"),
            Self::PaymentIncomplete(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_INCOMPLETE"),
            Self::PaymentMismatch(_) => (StatusCode::BAD_REQUEST, "PAYMENT_MISMATCH"),
            Self::PaymentProviderUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PAYMENT_PROVIDER_UNAVAILABLE")
            }
            Self::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

/// Store failures are logged here and never leak details to the caller.
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Store error: {:#}", e);
        Self::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorResponse {
            success: false,
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_stable_codes() {
        assert_eq!(
            ApiError::InvalidTransition("x".into()).status_and_code(),
            (StatusCode::CONFLICT, "INVALID_TRANSITION")
        );
        assert_eq!(
            ApiError::QuotaExceeded { limit: 3 }.status_and_code().1,
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("disk full")).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
