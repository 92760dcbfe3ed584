use crate::db::errors::DbError;
use crate::types::{Action, Resource};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const ACCOUNT_DEACTIVATED: &str = "Your account has been deactivated. Please contact support.";

#[derive(ThisError, Debug)]
pub enum Error {
    /// One or more request fields failed validation
    #[error("Validation failed")]
    ValidationFailed { errors: Vec<FieldError> },

    /// The email address already belongs to an account
    #[error("{message}")]
    DuplicateEmail { message: String },

    /// Login failed, without saying which half was wrong
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// A single-use token was unknown, expired or already consumed
    #[error("{message}")]
    InvalidOrExpiredToken { message: String },

    /// Authentication required but missing or no longer valid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    #[error("Account deactivated")]
    AccountDeactivated,

    /// Authenticated, but the role, ownership or verification check failed
    #[error("{message}")]
    Forbidden { message: String },

    /// The role's permission set lacks the action on the resource
    #[error("Insufficient permissions to {action} {resource}")]
    InsufficientPermissions { action: Action, resource: Resource },

    #[error("{message}")]
    NotFound { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// A federated login matched an account registered with another method
    #[error("{message}")]
    ProviderMismatch { message: String },

    /// Outbound email could not be delivered
    #[error("Email delivery failed: {message}")]
    EmailDelivery { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Storage operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A single field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ValidationFailed { .. } | Error::DuplicateEmail { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidOrExpiredToken { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::Unauthenticated { .. } | Error::AccountDeactivated => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } | Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::ProviderMismatch { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::EmailDelivery { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::ValidationFailed { .. } => "Validation failed".to_string(),
            Error::DuplicateEmail { message }
            | Error::InvalidOrExpiredToken { message }
            | Error::Forbidden { message }
            | Error::NotFound { message }
            | Error::BadRequest { message }
            | Error::ProviderMismatch { message } => message.clone(),
            Error::InvalidCredentials => INVALID_CREDENTIALS.to_string(),
            Error::AccountDeactivated => ACCOUNT_DEACTIVATED.to_string(),
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource } => {
                format!("You don't have permission to {action} {resource}")
            }
            Error::EmailDelivery { .. } => "Email could not be sent. Please try again later.".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Internal server error".to_string(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::EmailDelivery { .. } => {
                tracing::warn!("Dependency error: {}", self);
            }
            Error::InvalidCredentials
            | Error::Unauthenticated { .. }
            | Error::AccountDeactivated
            | Error::Forbidden { .. }
            | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        let body = match &self {
            Error::ValidationFailed { errors } => {
                let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                json!({
                    "status": "error",
                    "message": self.user_message(),
                    "errors": messages,
                    "details": errors,
                })
            }
            _ => json!({
                "status": "error",
                "message": self.user_message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
