//! Guard error types and their HTTP mapping

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Guard error types.
///
/// Display strings carry operator detail and go to logs and audit records.
/// HTTP bodies only ever carry the generic message from
/// [`GuardError::public_message`].
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {permission}")]
    Forbidden { permission: String },

    #[error("Rate limit exceeded for {route}")]
    RateLimited { route: String, retry_after_secs: u64 },

    #[error(transparent)]
    MalformedPermission(warden_permissions::PermissionError),

    #[error("Permission evaluation failed: {0}")]
    Evaluation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to load role document {path}: {source}")]
    RoleDocument {
        path: PathBuf,
        #[source]
        source: warden_permissions::PermissionError,
    },

    #[error("Invalid principal header '{0}'")]
    InvalidHeader(String),
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GuardError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            GuardError::Unauthenticated => "authentication_error",
            GuardError::Forbidden { .. } => "authorization_error",
            GuardError::RateLimited { .. } => "rate_limit_exceeded",
            _ => "internal_error",
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> &'static str {
        match self {
            GuardError::Unauthenticated => "Authentication required",
            GuardError::Forbidden { .. } => "Insufficient permissions",
            GuardError::RateLimited { .. } => "Too many requests",
            _ => "Internal server error",
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.public_message(),
            }
        }));

        (self.status(), body).into_response()
    }
}

/// Result type alias for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;
