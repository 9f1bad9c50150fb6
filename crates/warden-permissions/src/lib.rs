//! Permissions core for Warden
//!
//! Provides the validated `resource:action:scope` permission type, role
//! definitions and bindings, the role-binding store seam, and the
//! fail-closed permission evaluator that every other Warden crate builds on.

pub mod error;
pub mod evaluator;
pub mod permission;
pub mod role;
pub mod storage;

pub use error::{PermissionError, Result};
pub use evaluator::PermissionEvaluator;
pub use permission::{Decision, DecisionReason, Grant, Permission, PermissionSet, Scope, Segment};
pub use role::{Role, RoleBinding};
pub use storage::{FileRoleStore, InMemoryRoleStore, RoleBindingStore, RoleDocument};
