//! Permission values and decisions

pub mod checker;
pub mod models;

pub use checker::{Decision, DecisionReason, Grant, PermissionSet};
pub use models::{Permission, Scope, Segment};
