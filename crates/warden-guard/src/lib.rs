//! Request guard for the Warden RBAC engine
//!
//! [`Guard`] ties together principal resolution, the permission cache, the
//! audit logger and a runtime-switchable [`EnforcementMode`]. The crate also
//! carries the loosely coupled [`RateLimiter`], configuration loading with
//! hot reload of the enforcement mode, axum middleware for both, and
//! [`WardenStack`] to assemble all of it from configuration.

pub mod config;
pub mod error;
pub mod guard;
pub mod middleware;
pub mod mode;
pub mod principal;
pub mod rate_limit;
pub mod stack;

pub use config::{reload_mode, CacheSettings, ModeWatcher, WardenConfig};
pub use error::{GuardError, Result};
pub use guard::{Guard, GuardOutcome};
pub use middleware::rate_limit::rate_limit;
pub use middleware::{require_permission, RateLimitLayerState, RequiredPermission};
pub use mode::{EnforcementMode, EnforcementModeHandle};
pub use principal::{HeaderPrincipalResolver, Principal, PrincipalResolver, RequestContext};
pub use rate_limit::{
    InMemoryRateLimiter, RateLimitConfig, RateLimitResult, RateLimiter, RouteLimit, WindowStore,
    WindowTable,
};
pub use stack::WardenStack;
