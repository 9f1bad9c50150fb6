//! Permission cache with versioned invalidation and single-flight loading
//!
//! Every read first captures the user's current [`CacheVersion`]. Stored
//! entries are only served when their stamp equals that version, and misses
//! are coalesced per `(user, version)`. Because `invalidate_user` bumps the
//! version before returning, no read issued afterwards can be served an entry
//! or join a load that predates the invalidation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_permissions::{Decision, Permission, PermissionEvaluator, PermissionSet};

use crate::error::{CacheError, Result};
use crate::metrics::{CacheMetrics, CacheStats};
use crate::storage::{CacheEntry, CacheStorage, CacheVersion};

/// Source of truth consulted on a miss
#[async_trait]
pub trait PermissionLoader: Send + Sync {
    async fn load(&self, user_id: &str) -> warden_permissions::Result<PermissionSet>;
}

#[async_trait]
impl PermissionLoader for PermissionEvaluator {
    async fn load(&self, user_id: &str) -> warden_permissions::Result<PermissionSet> {
        self.resolve_permissions(user_id).await
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a stored entry; also bounds staleness across processes
    /// sharing one store
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
        }
    }
}

type LoadResult = std::result::Result<Arc<PermissionSet>, CacheError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct InFlight {
    version: CacheVersion,
    load: SharedLoad,
}

struct CacheInner {
    storage: Arc<dyn CacheStorage>,
    loader: Arc<dyn PermissionLoader>,
    config: CacheConfig,
    epoch: AtomicU64,
    /// Per-user invalidation counts within the current epoch. Cleared with
    /// every epoch bump, so it only holds users invalidated since the last
    /// `invalidate_all`.
    generations: DashMap<String, u64>,
    /// Shared by version reads and `invalidate_user`, exclusive for the
    /// epoch bump; no reader sees the new epoch with pre-reset generations.
    stamps: RwLock<()>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    metrics: CacheMetrics,
}

/// Per-user cache of effective permission sets.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PermissionCache {
    inner: Arc<CacheInner>,
}

impl PermissionCache {
    pub fn new(storage: Arc<dyn CacheStorage>, loader: Arc<dyn PermissionLoader>) -> Self {
        Self::with_config(storage, loader, CacheConfig::default())
    }

    pub fn with_config(
        storage: Arc<dyn CacheStorage>,
        loader: Arc<dyn PermissionLoader>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                storage,
                loader,
                config,
                epoch: AtomicU64::new(0),
                generations: DashMap::new(),
                stamps: RwLock::new(()),
                in_flight: Mutex::new(HashMap::new()),
                metrics: CacheMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.snapshot()
    }

    /// Current invalidation stamp for a user
    pub fn version_of(&self, user_id: &str) -> CacheVersion {
        self.inner.current_version(user_id)
    }

    /// Users carrying a per-user stamp in the current epoch
    pub fn invalidated_users(&self) -> usize {
        self.inner.generations.len()
    }

    /// Return the user's permission set, loading it on a miss.
    ///
    /// Storage failures are absorbed; only loader failures are returned.
    pub async fn get_user_permissions(&self, user_id: &str) -> Result<Arc<PermissionSet>> {
        let started = Instant::now();
        let version = self.inner.current_version(user_id);

        match self.inner.storage.get(user_id).await {
            Ok(Some(entry)) if entry.is_servable(version) => {
                self.inner.metrics.record_hit(started);
                return Ok(entry.permissions);
            }
            Ok(_) => {}
            Err(e) => {
                self.inner.metrics.record_storage_error();
                warn!(
                    user_id,
                    error = %e,
                    "Permission cache storage unavailable, loading directly"
                );
            }
        }

        self.inner.metrics.record_miss();
        self.load_coalesced(user_id, version).await
    }

    /// Decide `permission` for `user_id` using the cached permission set
    pub async fn check(&self, user_id: &str, permission: &Permission) -> Result<Decision> {
        let set = self.get_user_permissions(user_id).await?;
        Ok(set.check(permission))
    }

    /// Invalidate one user's cached permissions.
    ///
    /// Once this returns, no `get_user_permissions` call started afterwards can
    /// observe the set cached before it.
    pub async fn invalidate_user(&self, user_id: &str) {
        {
            let _stamps = self.inner.stamps.read();
            *self
                .inner
                .generations
                .entry(user_id.to_string())
                .or_insert(0) += 1;
        }
        self.inner.metrics.record_invalidation();
        debug!(user_id, "Invalidated cached permissions");

        if let Err(e) = self.inner.storage.remove(user_id).await {
            self.inner.metrics.record_storage_error();
            warn!(
                user_id,
                error = %e,
                "Failed to evict invalidated entry; version stamp still excludes it"
            );
        }
    }

    /// Invalidate every user, e.g. after a role definition changes.
    ///
    /// Per-user counters restart under the new epoch, so stamps issued
    /// before the call can never be issued again.
    pub async fn invalidate_all(&self) {
        let epoch = {
            let _stamps = self.inner.stamps.write();
            let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.generations.clear();
            epoch
        };
        self.inner.metrics.record_invalidation();
        debug!(epoch, "Invalidated all cached permissions");

        if let Err(e) = self.inner.storage.clear().await {
            self.inner.metrics.record_storage_error();
            warn!(
                error = %e,
                "Failed to clear cache storage; epoch stamp still excludes old entries"
            );
        }
    }

    async fn load_coalesced(
        &self,
        user_id: &str,
        version: CacheVersion,
    ) -> Result<Arc<PermissionSet>> {
        let load = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(user_id) {
                Some(existing) if existing.version == version => {
                    self.inner.metrics.record_coalesced();
                    existing.load.clone()
                }
                _ => {
                    let load = self.spawn_load(user_id.to_string(), version);
                    in_flight.insert(
                        user_id.to_string(),
                        InFlight {
                            version,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };

        load.await
    }

    /// Start a load on its own task so it finishes and populates the cache
    /// even if every waiter is cancelled.
    fn spawn_load(&self, user_id: String, version: CacheVersion) -> SharedLoad {
        let inner = Arc::clone(&self.inner);
        let task_user = user_id.clone();
        let handle = tokio::spawn(async move { inner.load_and_store(task_user, version).await });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(CacheError::Load {
                    user_id,
                    message: format!("load task failed: {join_error}"),
                }),
            }
        }
        .boxed()
        .shared()
    }
}

impl CacheInner {
    fn current_version(&self, user_id: &str) -> CacheVersion {
        let _stamps = self.stamps.read();
        CacheVersion {
            epoch: self.epoch.load(Ordering::SeqCst),
            generation: self.generations.get(user_id).map(|g| *g).unwrap_or(0),
        }
    }

    async fn load_and_store(&self, user_id: String, version: CacheVersion) -> LoadResult {
        self.metrics.record_load();
        let result = self.loader.load(&user_id).await;

        let outcome = match result {
            Ok(set) => {
                let set = Arc::new(set);
                if self.current_version(&user_id) == version {
                    let entry = CacheEntry::new(Arc::clone(&set), version, self.config.ttl);
                    if let Err(e) = self.storage.set(entry).await {
                        self.metrics.record_storage_error();
                        warn!(user_id = %user_id, error = %e, "Failed to store permission set");
                    }
                } else {
                    debug!(user_id = %user_id, "Load superseded by invalidation, not storing");
                }
                Ok(set)
            }
            Err(e) => {
                self.metrics.record_load_error();
                warn!(user_id = %user_id, error = %e, "Permission load failed");
                Err(CacheError::Load {
                    user_id: user_id.clone(),
                    message: e.to_string(),
                })
            }
        };

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&user_id)
            .is_some_and(|current| current.version == version)
        {
            in_flight.remove(&user_id);
        }

        outcome
    }
}
