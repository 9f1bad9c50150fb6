//! Filters and pagination for reading the audit trail back

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AuditDecision, PermissionUsageRecord, SecurityEvent, SecurityEventType, Severity,
};

/// Filter over permission usage records; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageFilter {
    pub user_id: Option<String>,
    pub permission: Option<String>,
    pub decision: Option<AuditDecision>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl UsageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn with_decision(mut self, decision: AuditDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Restrict to `[since, until)`
    pub fn with_time_range(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, record: &PermissionUsageRecord) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &record.user_id != user_id {
                return false;
            }
        }
        if let Some(ref permission) = self.permission {
            if &record.permission != permission {
                return false;
            }
        }
        if let Some(decision) = self.decision {
            if record.decision != decision {
                return false;
            }
        }
        in_range(record.timestamp, self.since, self.until)
    }
}

/// Filter over security events; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityEventFilter {
    pub event_type: Option<SecurityEventType>,
    pub user_id: Option<String>,
    /// Events at or above this severity
    pub min_severity: Option<Severity>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SecurityEventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn with_time_range(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if event.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        in_range(event.timestamp, self.since, self.until)
    }
}

fn in_range(at: DateTime<Utc>, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> bool {
    since.map_or(true, |since| at >= since) && until.map_or(true, |until| at < until)
}

/// Offset/limit paging over newest-first results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of results plus the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

impl<T> AuditPage<T> {
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}

/// Sort newest first and cut out the requested page.
///
/// Ties keep their insertion order reversed, so the most recently written
/// record wins.
pub fn paginate<T>(
    mut matches: Vec<T>,
    page: &Pagination,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) -> AuditPage<T> {
    matches.reverse();
    matches.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
    let total = matches.len();
    let items = matches
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();

    AuditPage {
        items,
        total,
        offset: page.offset,
        limit: page.limit,
    }
}
