//! Custom error types for the authentication service

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// A single rejected input field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Custom error type for the authentication service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown user, inactive user, or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Forbidden")]
    Forbidden,

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Too many login attempts")]
    TooManyAttempts,

    #[error("Failed to destroy session: {0}")]
    SessionDestroyFailure(#[source] anyhow::Error),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(constraint) if constraint == "users_username_key" => {
                AuthError::DuplicateUsername
            }
            other => AuthError::Internal(other.into()),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(vec![FieldError::new("body", rejection.body_text())])
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AuthError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            AuthError::DuplicateUsername => (StatusCode::CONFLICT, "Username already exists"),
            AuthError::TooManyAttempts => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts, try again later",
            ),
            AuthError::SessionDestroyFailure(cause) => {
                error!("Failed to destroy session: {:#}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to destroy session",
                )
            }
            AuthError::Validation(errors) => {
                let body = Json(json!({
                    "success": false,
                    "message": "Validation failed",
                    "errors": errors,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AuthError::NotFound(what) => {
                let body = Json(json!({
                    "success": false,
                    "message": format!("{} not found", what),
                }));
                return (StatusCode::NOT_FOUND, body).into_response();
            }
            AuthError::Internal(cause) => {
                error!("Internal error: {:#}", cause);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;
