//! Fixed-window rate limiting keyed by caller and route

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Limit applied to one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteLimit {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl RouteLimit {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
    /// Per-route overrides keyed by request path
    pub route_limits: HashMap<String, RouteLimit>,
    /// Tracked windows at which a check first sweeps out expired ones
    pub sweep_threshold: usize,
}

impl RateLimitConfig {
    pub fn limit_for(&self, route: &str) -> RouteLimit {
        self.route_limits.get(route).copied().unwrap_or(RouteLimit {
            max_requests: self.max_requests,
            window_seconds: self.window_seconds,
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 120,
            window_seconds: 60,
            route_limits: HashMap::new(),
            sweep_threshold: 10_000,
        }
    }
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Set when the request was refused
    pub retry_after: Option<Duration>,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitResult {
    /// `Retry-After` value in whole seconds, never zero
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after
            .map(|wait| wait.as_secs() + u64::from(wait.subsec_nanos() > 0))
            .map(|secs| secs.max(1))
    }
}

/// Counter seam so in-memory and shared-store limiters are interchangeable
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request from `caller` against `route`
    async fn check(&self, caller: &str, route: &str) -> Result<RateLimitResult>;
}

/// Current window for one `(caller, route)` pair
#[derive(Debug, Clone, Copy)]
pub struct WindowState {
    count: u32,
    reset_at: Instant,
}

/// Windows keyed by `caller:route`
#[derive(Debug, Default)]
pub struct WindowTable {
    windows: HashMap<String, WindowState>,
    /// Size at which the next check sweeps; grows with the live set
    sweep_at: usize,
}

impl WindowTable {
    fn purge(&mut self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| state.reset_at > now);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Window table shared between limiter instances
pub type WindowStore = Arc<Mutex<WindowTable>>;

/// Fixed-window limiter over an in-process [`WindowStore`]
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    windows: WindowStore,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_store(config, WindowStore::default())
    }

    pub fn with_store(config: RateLimitConfig, windows: WindowStore) -> Self {
        Self { config, windows }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Drop windows that have already reset; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut table = self.windows.lock().await;
        let purged = table.purge(Instant::now());
        if purged > 0 {
            debug!(purged, remaining = table.len(), "Purged expired rate-limit windows");
        }
        purged
    }

    pub async fn tracked_windows(&self) -> usize {
        self.windows.lock().await.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, caller: &str, route: &str) -> Result<RateLimitResult> {
        let limit = self.config.limit_for(route);
        let window = limit.window();
        let key = format!("{caller}:{route}");
        let now = Instant::now();

        let mut table = self.windows.lock().await;
        let threshold = self.config.sweep_threshold.max(1);
        if table.len() >= table.sweep_at.max(threshold) {
            let purged = table.purge(now);
            // Live windows stay; doubling keeps the sweep amortised when most are live.
            table.sweep_at = (table.len() * 2).max(threshold);
            debug!(purged, remaining = table.len(), "Swept expired rate-limit windows");
        }

        let state = table.windows.entry(key).or_insert(WindowState {
            count: 0,
            reset_at: now + window,
        });
        if now >= state.reset_at {
            state.count = 0;
            state.reset_at = now + window;
        }

        let reset_in = state.reset_at - now;
        let reset_time = Utc::now()
            + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());

        if state.count >= limit.max_requests {
            debug!(caller, route, limit = limit.max_requests, "Rate limit exceeded");
            return Ok(RateLimitResult {
                success: false,
                limit: limit.max_requests,
                remaining: 0,
                retry_after: Some(reset_in),
                reset_time,
            });
        }

        state.count += 1;
        Ok(RateLimitResult {
            success: true,
            limit: limit.max_requests,
            remaining: limit.max_requests - state.count,
            retry_after: None,
            reset_time,
        })
    }
}
