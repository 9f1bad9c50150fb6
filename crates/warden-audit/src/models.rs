//! Audit record data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome recorded for a permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDecision {
    Allowed,
    Denied,
    /// Evaluation could not complete
    Error,
}

impl std::fmt::Display for AuditDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditDecision::Allowed => write!(f, "allowed"),
            AuditDecision::Denied => write!(f, "denied"),
            AuditDecision::Error => write!(f, "error"),
        }
    }
}

/// Record of one permission check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionUsageRecord {
    pub request_id: String,
    pub user_id: String,
    pub permission: String,
    pub decision: AuditDecision,
    /// Operator-facing detail; never shown to the end user
    pub reason: String,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    /// Enforcement mode the check ran under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement_mode: Option<String>,
}

impl PermissionUsageRecord {
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        permission: impl Into<String>,
        decision: AuditDecision,
        reason: impl Into<String>,
        latency_ms: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            permission: permission.into(),
            decision,
            reason: reason.into(),
            latency_ms,
            timestamp: Utc::now(),
            enforcement_mode: None,
        }
    }

    pub fn with_enforcement_mode(mut self, mode: impl Into<String>) -> Self {
        self.enforcement_mode = Some(mode.into());
        self
    }
}

/// Security event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// No principal could be resolved for a guarded request
    UnauthorizedAccessAttempt,
    /// An authenticated principal was refused a permission
    InsufficientPermissions,
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityEventType::UnauthorizedAccessAttempt => {
                write!(f, "unauthorized_access_attempt")
            }
            SecurityEventType::InsufficientPermissions => write!(f, "insufficient_permissions"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl SecurityEventType {
    /// Severity assigned when the guard raises this event
    pub fn default_severity(self) -> Severity {
        match self {
            SecurityEventType::UnauthorizedAccessAttempt => Severity::Medium,
            SecurityEventType::InsufficientPermissions => Severity::High,
        }
    }
}

/// Security-relevant event raised by the guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: SecurityEventType,
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub path: Option<String>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Request id, permission, reason and similar operator context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            user_id: None,
            ip: None,
            user_agent: None,
            path: None,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach request metadata
    pub fn with_request(
        mut self,
        ip: Option<String>,
        user_agent: Option<String>,
        path: Option<String>,
    ) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self.path = path;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Anything that travels through the audit queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    PermissionUsage(PermissionUsageRecord),
    SecurityEvent(SecurityEvent),
}

impl AuditEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::PermissionUsage(record) => record.timestamp,
            AuditEntry::SecurityEvent(event) => event.timestamp,
        }
    }
}
