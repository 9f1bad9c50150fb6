//! Cache performance monitoring and metrics

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};

use serde::{Deserialize, Serialize};

/// Cache performance statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads served from storage
    pub hits: u64,
    /// Reads that needed a load (absent, expired, or superseded entry)
    pub misses: u64,
    /// Loader invocations
    pub loads: u64,
    /// Reads that joined a load already in flight
    pub coalesced: u64,
    pub load_errors: u64,
    pub invalidations: u64,
    /// Storage failures absorbed by falling back to the loader
    pub storage_errors: u64,
    /// Average time to serve a hit (microseconds)
    pub avg_hit_time_us: f64,
    pub created_at: SystemTime,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Thread-safe cache metrics tracker
#[derive(Debug)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    coalesced: AtomicU64,
    load_errors: AtomicU64,
    invalidations: AtomicU64,
    storage_errors: AtomicU64,
    total_hit_time_us: AtomicU64,
    created_at: SystemTime,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            load_errors: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
            total_hit_time_us: AtomicU64::new(0),
            created_at: SystemTime::now(),
        }
    }

    pub fn record_hit(&self, started: Instant) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_hit_time_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_error(&self) {
        self.load_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let total_hit_time_us = self.total_hit_time_us.load(Ordering::Relaxed);

        CacheStats {
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            avg_hit_time_us: if hits > 0 {
                total_hit_time_us as f64 / hits as f64
            } else {
                0.0
            },
            created_at: self.created_at,
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
