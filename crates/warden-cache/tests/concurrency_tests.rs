//! Concurrency tests for warden-cache
//!
//! These tests validate the cache's concurrency guarantees:
//! - Concurrent misses for one user share a single load
//! - Reads started after `invalidate_user` returns never see the old set
//! - Loads survive cancellation of the request that started them
//! - Storage outages degrade to direct loading

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use warden_cache::{
    CacheEntry, CacheError, CacheStorage, MemoryStorage, PermissionCache, PermissionLoader,
};
use warden_permissions::{Grant, Permission, PermissionSet};

/// Loader that sleeps before answering and reports whichever permission is current
struct SlowLoader {
    calls: AtomicUsize,
    delay: Duration,
    permission: Mutex<String>,
}

impl SlowLoader {
    fn new(permission: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            permission: Mutex::new(permission.to_string()),
        })
    }

    fn set_permission(&self, permission: &str) {
        *self.permission.lock() = permission.to_string();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionLoader for SlowLoader {
    async fn load(&self, user_id: &str) -> warden_permissions::Result<PermissionSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Snapshot role state before the delay, like a real query would.
        let permission = Permission::parse(&self.permission.lock().clone())?;
        tokio::time::sleep(self.delay).await;
        Ok(PermissionSet::new(
            user_id,
            vec!["role".to_string()],
            vec![Grant {
                role: "role".to_string(),
                permission,
            }],
        ))
    }
}

fn granted(set: &PermissionSet) -> String {
    set.grants()[0].permission.to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_share_one_load() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(50));
    let cache = PermissionCache::new(Arc::new(MemoryStorage::new()), loader.clone());

    let gets = (0..50).map(|_| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_user_permissions("u1").await })
    });
    let results = join_all(gets).await;

    for result in results {
        let set = result.unwrap().unwrap();
        assert_eq!(granted(&set), "user:view:own");
    }
    assert_eq!(loader.calls(), 1);
    assert_eq!(cache.stats().coalesced, 49);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_users_load_independently() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(20));
    let cache = PermissionCache::new(Arc::new(MemoryStorage::new()), loader.clone());

    let gets = (0..10).map(|i| {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_user_permissions(&format!("u{}", i % 5)).await })
    });
    for result in join_all(gets).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(loader.calls(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalidation_mid_burst_never_serves_stale_set() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(15));
    let cache = PermissionCache::new(Arc::new(MemoryStorage::new()), loader.clone());
    cache.get_user_permissions("u1").await.unwrap();

    let invalidated = Arc::new(AtomicBool::new(false));

    let gets = (0..50u64).map(|i| {
        let cache = cache.clone();
        let invalidated = invalidated.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(i % 25)).await;
            let started_after = invalidated.load(Ordering::SeqCst);
            let set = cache.get_user_permissions("u1").await.unwrap();
            (started_after, granted(&set))
        })
    });
    let gets: Vec<_> = gets.collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    loader.set_permission("user:edit:all");
    cache.invalidate_user("u1").await;
    invalidated.store(true, Ordering::SeqCst);

    let mut observed_after = 0;
    for result in join_all(gets).await {
        let (started_after, permission) = result.unwrap();
        if started_after {
            observed_after += 1;
            assert_eq!(permission, "user:edit:all", "stale set served after invalidation");
        }
    }
    assert!(observed_after > 0);

    let set = cache.get_user_permissions("u1").await.unwrap();
    assert_eq!(granted(&set), "user:edit:all");
}

#[tokio::test]
async fn test_superseded_load_is_not_stored() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(40));
    let cache = PermissionCache::new(Arc::new(MemoryStorage::new()), loader.clone());

    let early = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_user_permissions("u1").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    loader.set_permission("user:view:all");
    cache.invalidate_user("u1").await;

    // The early waiter still receives the result of the load it joined.
    let early = early.await.unwrap().unwrap();
    assert_eq!(granted(&early), "user:view:own");

    let fresh = cache.get_user_permissions("u1").await.unwrap();
    assert_eq!(granted(&fresh), "user:view:all");
    assert_eq!(loader.calls(), 2);
}

#[tokio::test]
async fn test_cancelled_request_still_populates_cache() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(50));
    let cache = PermissionCache::new(Arc::new(MemoryStorage::new()), loader.clone());

    let timed_out =
        tokio::time::timeout(Duration::from_millis(5), cache.get_user_permissions("u1")).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let set = cache.get_user_permissions("u1").await.unwrap();
    assert_eq!(granted(&set), "user:view:own");
    assert_eq!(loader.calls(), 1);
    assert_eq!(cache.stats().hits, 1);
}

/// Storage that is always down
struct UnavailableStorage;

#[async_trait]
impl CacheStorage for UnavailableStorage {
    async fn get(&self, _user_id: &str) -> warden_cache::Result<Option<CacheEntry>> {
        Err(CacheError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn set(&self, _entry: CacheEntry) -> warden_cache::Result<()> {
        Err(CacheError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn remove(&self, _user_id: &str) -> warden_cache::Result<bool> {
        Err(CacheError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn clear(&self) -> warden_cache::Result<()> {
        Err(CacheError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn len(&self) -> warden_cache::Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_unavailable_storage_degrades_to_loader() {
    let loader = SlowLoader::new("user:view:own", Duration::from_millis(1));
    let cache = PermissionCache::new(Arc::new(UnavailableStorage), loader.clone());

    for _ in 0..3 {
        let set = cache.get_user_permissions("u1").await.unwrap();
        assert_eq!(granted(&set), "user:view:own");
    }
    cache.invalidate_user("u1").await;
    cache.invalidate_all().await;

    assert_eq!(loader.calls(), 3);
    let stats = cache.stats();
    // three failed reads, three failed writes, one failed remove, one failed clear
    assert_eq!(stats.storage_errors, 8);
}
