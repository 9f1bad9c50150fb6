//! Permission sets and allow/deny decisions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::permission::models::Permission;

/// A permission contributed by a named role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: String,
    pub permission: Permission,
}

/// Resolved union of a principal's role permissions.
///
/// This is the unit cached per user; every decision, cached or not, is made
/// by [`PermissionSet::check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    user_id: String,
    roles: Vec<String>,
    grants: Vec<Grant>,
}

impl PermissionSet {
    /// Create an empty set for a user with no roles
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
            grants: Vec::new(),
        }
    }

    pub fn new(user_id: impl Into<String>, roles: Vec<String>, grants: Vec<Grant>) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
            grants,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    /// Distinct permissions held, in grant order
    pub fn permissions(&self) -> Vec<&Permission> {
        let mut seen: Vec<&Permission> = Vec::with_capacity(self.grants.len());
        for grant in &self.grants {
            if !seen.contains(&&grant.permission) {
                seen.push(&grant.permission);
            }
        }
        seen
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Decide whether this set grants `requested`.
    ///
    /// A set without roles denies everything.
    pub fn check(&self, requested: &Permission) -> Decision {
        if self.roles.is_empty() {
            return Decision::deny(requested.clone(), DecisionReason::NoRoles);
        }

        match self.grants.iter().find(|g| g.permission.grants(requested)) {
            Some(grant) => Decision::allow(
                requested.clone(),
                DecisionReason::Granted {
                    role: grant.role.clone(),
                    granted: grant.permission.clone(),
                },
            ),
            None => Decision::deny(requested.clone(), DecisionReason::NoMatchingPermission),
        }
    }
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    /// A role held by the user grants the permission
    Granted { role: String, granted: Permission },
    /// The user has no role bindings
    NoRoles,
    /// None of the user's roles grants the permission
    NoMatchingPermission,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Granted { role, granted } => {
                write!(f, "granted by role '{}' via {}", role, granted)
            }
            DecisionReason::NoRoles => write!(f, "no_roles"),
            DecisionReason::NoMatchingPermission => write!(f, "no_matching_permission"),
        }
    }
}

/// Outcome of evaluating one permission for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub required_permission: Permission,
}

impl Decision {
    pub fn allow(required_permission: Permission, reason: DecisionReason) -> Self {
        Self {
            allowed: true,
            reason,
            required_permission,
        }
    }

    pub fn deny(required_permission: Permission, reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
            required_permission,
        }
    }
}
