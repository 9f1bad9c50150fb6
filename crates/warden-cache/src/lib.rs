//! # Warden Cache
//!
//! Per-user cache of effective permission sets for the Warden RBAC engine.
//!
//! ## Features
//!
//! - **Versioned invalidation**: per-user generations plus a global epoch, so a
//!   read issued after `invalidate_user` returns never sees the old set
//! - **Single-flight loading**: concurrent misses for one user share one load
//! - **Pluggable storage**: in-process by default, any shared store via [`CacheStorage`]
//! - **Graceful degradation**: storage failures fall back to direct evaluation
//! - **Metrics**: hit/miss/coalescing counters

pub mod cache;
pub mod error;
pub mod metrics;
pub mod storage;

pub use cache::{CacheConfig, PermissionCache, PermissionLoader};
pub use error::{CacheError, Result};
pub use metrics::{CacheMetrics, CacheStats};
pub use storage::{CacheEntry, CacheStorage, CacheVersion, MemoryStorage};
