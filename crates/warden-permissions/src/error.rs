//! Error types for the permissions core

use thiserror::Error;

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, PermissionError>;

/// Errors raised while parsing permissions or resolving role bindings
#[derive(Error, Debug)]
pub enum PermissionError {
    /// Input did not follow the `resource:action:scope` grammar
    #[error("Malformed permission '{input}': {reason}")]
    MalformedPermission { input: String, reason: String },

    #[error("Invalid role definition: {0}")]
    InvalidRole(String),

    /// The role-binding store could not answer
    #[error("Role store error: {0}")]
    RoleStore(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PermissionError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        PermissionError::MalformedPermission {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error comes from a caller passing a bad permission string
    pub fn is_malformed(&self) -> bool {
        matches!(self, PermissionError::MalformedPermission { .. })
    }
}
