//! Cache storage backends

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use warden_permissions::PermissionSet;

use crate::Result;

/// Invalidation stamp carried by every entry.
///
/// `epoch` moves on `invalidate_all`, `generation` on `invalidate_user`. An
/// entry is only served when its stamp equals the user's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CacheVersion {
    pub epoch: u64,
    pub generation: u64,
}

/// Cached permission set for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub user_id: String,
    pub permissions: Arc<PermissionSet>,
    pub version: CacheVersion,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl CacheEntry {
    pub fn new(permissions: Arc<PermissionSet>, version: CacheVersion, ttl: Duration) -> Self {
        let created_at = SystemTime::now();
        Self {
            user_id: permissions.user_id().to_string(),
            permissions,
            version,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    /// Whether this entry may be served to a reader holding `current`
    pub fn is_servable(&self, current: CacheVersion) -> bool {
        self.version == current && !self.is_expired()
    }
}

/// Backing store for cache entries.
///
/// Implementations may be in-process or shared between processes. Errors are
/// treated by the cache as "store unavailable" and never reach callers.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, entry: CacheEntry) -> Result<()>;

    async fn remove(&self, user_id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}

/// In-memory cache storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: DashMap<String, CacheEntry>,
    max_entries: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of entries; when full, the entry closest to expiry is evicted
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            data: DashMap::with_capacity(max_entries),
            max_entries: Some(max_entries),
        }
    }

    fn evict_one(&self) {
        let victim = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.data.remove(&key);
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn get(&self, user_id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.data.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        if let Some(max) = self.max_entries {
            if !self.data.contains_key(&entry.user_id) && self.data.len() >= max {
                self.evict_one();
            }
        }
        self.data.insert(entry.user_id.clone(), entry);
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<bool> {
        Ok(self.data.remove(user_id).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.data.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }
}
