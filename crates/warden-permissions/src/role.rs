//! Role definitions and user bindings

use serde::{Deserialize, Serialize};

use crate::error::{PermissionError, Result};
use crate::permission::Permission;

/// Named set of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            name: name.into(),
            description: None,
            permissions,
        }
    }

    /// Build a role from raw permission strings, rejecting the first malformed one
    pub fn from_strings<S: AsRef<str>>(name: impl Into<String>, permissions: &[S]) -> Result<Self> {
        let parsed = permissions
            .iter()
            .map(|p| Permission::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, parsed))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PermissionError::InvalidRole("role name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Binding of a role to a user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleBinding {
    pub user_id: String,
    pub role: String,
}

impl RoleBinding {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_strings() {
        let role =
            Role::from_strings("Basic Client", &["user:view:own", "contact:view:own"]).unwrap();
        assert_eq!(role.name, "Basic Client");
        assert_eq!(role.permissions.len(), 2);
        assert_eq!(role.permissions[0].to_string(), "user:view:own");
    }

    #[test]
    fn test_role_from_strings_rejects_malformed() {
        let err = Role::from_strings("Broken", &["user:view:own", "user:view"]).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_role_deserializes_and_validates_permissions() {
        let yaml = "name: Auditor\ndescription: Read-only\npermissions:\n  - \"audit:view:all\"\n";
        let role: Role = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(role.description.as_deref(), Some("Read-only"));
        assert_eq!(role.permissions[0].to_string(), "audit:view:all");

        let bad = "name: Auditor\npermissions:\n  - \"audit view all\"\n";
        assert!(serde_yaml::from_str::<Role>(bad).is_err());
    }

    #[test]
    fn test_role_validate_rejects_blank_name() {
        assert!(Role::new("  ", Vec::new()).validate().is_err());
        assert!(Role::new("Admin", Vec::new()).validate().is_ok());
    }
}
