//! Assembling a guard and rate limiter from [`WardenConfig`]

use std::sync::Arc;

use axum::http::HeaderName;
use tracing::{info, warn};
use warden_audit::{AuditLogger, AuditSink, JsonLinesAuditSink, MemoryAuditSink};
use warden_cache::{MemoryStorage, PermissionCache};
use warden_permissions::{FileRoleStore, InMemoryRoleStore, PermissionEvaluator, RoleBindingStore};

use crate::config::WardenConfig;
use crate::error::{GuardError, Result};
use crate::guard::Guard;
use crate::mode::EnforcementModeHandle;
use crate::principal::HeaderPrincipalResolver;
use crate::rate_limit::InMemoryRateLimiter;

/// Everything a service needs to guard its routes
pub struct WardenStack {
    pub config: WardenConfig,
    pub guard: Guard,
    pub limiter: Arc<InMemoryRateLimiter>,
    /// Present when `roles_file` is configured; reload it and invalidate the
    /// cache to pick up role changes.
    pub roles: Option<Arc<FileRoleStore>>,
}

impl WardenStack {
    /// Build the stack described by `config`.
    ///
    /// Starts the audit worker, so it must be called within a Tokio runtime.
    /// Without `roles_file` every check is denied; without `audit_file` the
    /// audit trail is kept in memory.
    pub async fn from_config(config: WardenConfig) -> Result<Self> {
        let header = HeaderName::from_bytes(config.principal_header.as_bytes())
            .map_err(|_| GuardError::InvalidHeader(config.principal_header.clone()))?;

        let roles = match &config.roles_file {
            Some(path) => {
                let store = FileRoleStore::open(path).await.map_err(|source| {
                    GuardError::RoleDocument {
                        path: path.clone(),
                        source,
                    }
                })?;
                Some(Arc::new(store))
            }
            None => {
                warn!("No roles_file configured, every permission check will be denied");
                None
            }
        };
        let store: Arc<dyn RoleBindingStore> = match &roles {
            Some(roles) => roles.clone(),
            None => Arc::new(InMemoryRoleStore::new()),
        };

        let storage = match config.cache.max_entries {
            Some(max_entries) => MemoryStorage::with_max_entries(max_entries),
            None => MemoryStorage::new(),
        };
        let cache = PermissionCache::with_config(
            Arc::new(storage),
            Arc::new(PermissionEvaluator::new(store)),
            config.cache.cache_config(),
        );

        let sink: Arc<dyn AuditSink> = match &config.audit_file {
            Some(path) => Arc::new(JsonLinesAuditSink::new(path)),
            None => Arc::new(MemoryAuditSink::new()),
        };

        let guard = Guard::new(
            EnforcementModeHandle::new(config.mode),
            Arc::new(HeaderPrincipalResolver::new(header)),
            cache,
            AuditLogger::with_config(sink, config.audit),
        );
        let limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone()));

        info!(
            mode = %config.mode,
            principal_header = %config.principal_header,
            file_roles = roles.is_some(),
            file_audit = config.audit_file.is_some(),
            "Warden stack ready"
        );

        Ok(Self {
            config,
            guard,
            limiter,
            roles,
        })
    }
}

impl std::fmt::Debug for WardenStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenStack")
            .field("config", &self.config)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}
