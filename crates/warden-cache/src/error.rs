//! Cache-related error types

use thiserror::Error;

/// Cache operation errors.
///
/// Cloneable so a single failed load can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The backing store could not be reached; callers fall back to the loader
    #[error("Cache storage unavailable: {message}")]
    Unavailable { message: String },

    /// Resolving the permission set failed
    #[error("Permission load failed for user '{user_id}': {message}")]
    Load { user_id: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;
