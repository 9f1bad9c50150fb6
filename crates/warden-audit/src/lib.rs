//! Audit trail for the Warden RBAC engine
//!
//! Producers enqueue records without waiting; a background worker drains the
//! bounded queue into an [`AuditSink`]. When the queue is full the oldest
//! queued record is discarded and counted, so auditing never blocks or fails
//! a guarded request.

pub mod error;
pub mod logger;
pub mod models;
pub mod query;
pub mod sink;

pub use error::{AuditError, Result};
pub use logger::{AuditConfig, AuditLogger, AuditStats};
pub use models::{
    AuditDecision, AuditEntry, PermissionUsageRecord, SecurityEvent, SecurityEventType, Severity,
};
pub use query::{AuditPage, Pagination, SecurityEventFilter, UsageFilter};
pub use sink::{AuditSink, JsonLinesAuditSink, MemoryAuditSink};
