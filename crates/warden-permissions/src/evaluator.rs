//! Permission evaluation against role bindings

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::permission::{Decision, Grant, Permission, PermissionSet};
use crate::storage::RoleBindingStore;

/// Resolves a user's roles into a [`PermissionSet`] and decides permission requests.
///
/// Evaluation is fail-closed: no roles means no grants, bindings to unknown
/// roles contribute nothing, and store failures are returned as errors rather
/// than being turned into a decision.
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn RoleBindingStore>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<dyn RoleBindingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RoleBindingStore> {
        &self.store
    }

    /// Resolve every role bound to `user_id` into the user's effective permission set
    pub async fn resolve_permissions(&self, user_id: &str) -> Result<PermissionSet> {
        let bindings = self.store.role_bindings_for(user_id).await?;

        let mut roles = Vec::with_capacity(bindings.len());
        let mut grants = Vec::new();
        for binding in bindings {
            if roles.contains(&binding.role) {
                continue;
            }
            match self.store.role(&binding.role).await? {
                Some(role) => {
                    grants.extend(role.permissions.into_iter().map(|permission| Grant {
                        role: role.name.clone(),
                        permission,
                    }));
                    roles.push(role.name);
                }
                None => {
                    warn!(user_id, role = %binding.role, "Role binding references unknown role");
                }
            }
        }

        debug!(
            user_id,
            roles = roles.len(),
            grants = grants.len(),
            "Resolved permission set"
        );
        Ok(PermissionSet::new(user_id, roles, grants))
    }

    /// Evaluate a raw permission string for a user.
    ///
    /// The string is validated before the role store is touched.
    pub async fn evaluate(&self, user_id: &str, permission: &str) -> Result<Decision> {
        let permission = Permission::parse(permission)?;
        self.evaluate_permission(user_id, &permission).await
    }

    pub async fn evaluate_permission(
        &self,
        user_id: &str,
        permission: &Permission,
    ) -> Result<Decision> {
        let set = self.resolve_permissions(user_id).await?;
        Ok(set.check(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PermissionError;
    use crate::permission::DecisionReason;
    use crate::role::{Role, RoleBinding};
    use crate::storage::InMemoryRoleStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn evaluator_with(store: InMemoryRoleStore) -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(store))
    }

    fn basic_store() -> InMemoryRoleStore {
        let store = InMemoryRoleStore::new();
        store
            .upsert_role(Role::from_strings("Basic Client", &["user:view:own"]).unwrap())
            .unwrap();
        store
            .upsert_role(
                Role::from_strings(
                    "HR Manager",
                    &["employee:*:organization", "attendance:view:all"],
                )
                .unwrap(),
            )
            .unwrap();
        store.bind("client", "Basic Client");
        store.bind("hr", "HR Manager");
        store.bind("hr", "Basic Client");
        store
    }

    #[tokio::test]
    async fn test_allows_bound_permission() {
        let evaluator = evaluator_with(basic_store());
        let decision = evaluator.evaluate("client", "user:view:own").await.unwrap();
        assert!(decision.allowed);
        assert!(matches!(
            decision.reason,
            DecisionReason::Granted { ref role, .. } if role == "Basic Client"
        ));
    }

    #[tokio::test]
    async fn test_denies_unbound_permission() {
        let evaluator = evaluator_with(basic_store());
        let decision = evaluator.evaluate("client", "admin:access:all").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::NoMatchingPermission);
        assert_eq!(decision.required_permission.to_string(), "admin:access:all");
    }

    #[tokio::test]
    async fn test_user_without_roles_is_denied() {
        let evaluator = evaluator_with(basic_store());
        let decision = evaluator.evaluate("stranger", "user:view:own").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::NoRoles);
    }

    #[tokio::test]
    async fn test_unknown_role_grants_nothing() {
        let store = InMemoryRoleStore::new();
        store.bind("ghost", "Deleted Role");
        let evaluator = evaluator_with(store);

        let set = evaluator.resolve_permissions("ghost").await.unwrap();
        assert!(set.roles().is_empty());
        assert!(!evaluator.evaluate("ghost", "*:*:*").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_union_of_roles() {
        let evaluator = evaluator_with(basic_store());
        let set = evaluator.resolve_permissions("hr").await.unwrap();
        assert_eq!(set.roles().len(), 2);
        assert_eq!(set.grants().len(), 3);

        assert!(evaluator.evaluate("hr", "employee:edit:own").await.unwrap().allowed);
        assert!(evaluator.evaluate("hr", "user:view:own").await.unwrap().allowed);
        assert!(!evaluator.evaluate("hr", "employee:edit:all").await.unwrap().allowed);
    }

    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RoleBindingStore for CountingStore {
        async fn role_bindings_for(&self, _user_id: &str) -> Result<Vec<RoleBinding>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn role(&self, _name: &str) -> Result<Option<Role>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_malformed_permission_rejected_before_store_access() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let evaluator = PermissionEvaluator::new(store.clone());

        let err = evaluator.evaluate("u1", "admin-access").await.unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    struct FailingStore;

    #[async_trait]
    impl RoleBindingStore for FailingStore {
        async fn role_bindings_for(&self, _user_id: &str) -> Result<Vec<RoleBinding>> {
            Err(PermissionError::RoleStore("connection refused".to_string()))
        }

        async fn role(&self, _name: &str) -> Result<Option<Role>> {
            Err(PermissionError::RoleStore("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error_not_a_decision() {
        let evaluator = PermissionEvaluator::new(Arc::new(FailingStore));
        let err = evaluator.evaluate("u1", "user:view:own").await.unwrap_err();
        assert!(matches!(err, PermissionError::RoleStore(_)));
    }
}
