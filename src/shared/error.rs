//! Application Error Types
//!
//! Centralized error handling. `AppError` is what collaborator adapters and
//! the HTTP surface speak; `SignalingError` is what the call core surfaces to
//! a connection as an `<namespace>:error` event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 10001, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 10003, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 10004, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, 10007, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 10000, "Internal server error".into())
            }
        };

        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

/// Errors produced by the call core.
///
/// None of these are fatal: the gateway turns them into an error event for
/// the originating connection and keeps the connection open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("User is already in a call")]
    AlreadyInCall,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Failed to persist call record: {0}")]
    PersistenceFailure(String),

    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Shorthand for the most common miss.
    pub fn call_not_found() -> Self {
        SignalingError::NotFound("Call")
    }

    /// Stable machine-readable kind, sent alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingError::Unauthenticated => "unauthenticated",
            SignalingError::NotFound(_) => "not_found",
            SignalingError::AccessDenied(_) => "access_denied",
            SignalingError::AlreadyInCall => "already_in_call",
            SignalingError::InvalidTransition(_) => "invalid_transition",
            SignalingError::PersistenceFailure(_) => "persistence_failure",
            SignalingError::Validation(_) => "validation",
            SignalingError::Internal(_) => "internal",
        }
    }
}

impl From<AppError> for SignalingError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => SignalingError::NotFound("Resource"),
            AppError::Unauthorized(_) => SignalingError::Unauthenticated,
            AppError::Forbidden(msg) => SignalingError::AccessDenied(msg),
            AppError::Validation(msg) => SignalingError::Validation(msg),
            other => {
                tracing::error!(error = %other, "Collaborator lookup failed");
                SignalingError::Internal("Service temporarily unavailable".into())
            }
        }
    }
}
