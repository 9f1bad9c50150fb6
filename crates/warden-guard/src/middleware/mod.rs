//! axum middleware for the guard and the rate limiter

pub mod permission;
pub mod rate_limit;

pub use permission::{require_permission, RequiredPermission};
pub use rate_limit::{rate_limit, RateLimitLayerState};
