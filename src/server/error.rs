use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;
use crate::validation::ValidationError;
use crate::waitlist::WaitlistError;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Error response: a status plus a JSON `{error, message}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    pub fn unauthorized(error: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::QuotaReached { .. } => {
                Self::new(StatusCode::FORBIDDEN, "quota_exceeded", err.to_string())
            }
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => e.into(),
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
            StoreError::UniqueViolation(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            StoreError::QuotaExceeded(_) => {
                Self::new(StatusCode::FORBIDDEN, "quota_exceeded", err.to_string())
            }
            _ => {
                tracing::error!("Store failure: {}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        }
    }
}

impl From<WaitlistError> for ApiError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::Invalid(e) => e.into(),
            WaitlistError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.error,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
