//! Audit error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors raised by audit sinks.
///
/// The logger absorbs these on the write path; they only reach callers of the
/// read-side queries.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink error: {message}")]
    Sink { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
