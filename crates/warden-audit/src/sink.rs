//! Durable destinations for audit entries

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::{
    error::Result,
    models::{AuditEntry, PermissionUsageRecord, SecurityEvent},
    query::{paginate, AuditPage, Pagination, SecurityEventFilter, UsageFilter},
};

/// Storage backend the audit worker drains into
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a batch in queue order
    async fn write_batch(&self, entries: &[AuditEntry]) -> Result<()>;

    async fn query_permission_usage(
        &self,
        filter: &UsageFilter,
        page: &Pagination,
    ) -> Result<AuditPage<PermissionUsageRecord>>;

    async fn query_security_events(
        &self,
        filter: &SecurityEventFilter,
        page: &Pagination,
    ) -> Result<AuditPage<SecurityEvent>>;
}

fn split_usage(entries: &[AuditEntry], filter: &UsageFilter) -> Vec<PermissionUsageRecord> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            AuditEntry::PermissionUsage(record) if filter.matches(record) => Some(record.clone()),
            _ => None,
        })
        .collect()
}

fn split_events(entries: &[AuditEntry], filter: &SecurityEventFilter) -> Vec<SecurityEvent> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            AuditEntry::SecurityEvent(event) if filter.matches(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

/// In-memory sink for tests and development
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries written so far, in write order
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write_batch(&self, entries: &[AuditEntry]) -> Result<()> {
        self.entries.write().extend_from_slice(entries);
        Ok(())
    }

    async fn query_permission_usage(
        &self,
        filter: &UsageFilter,
        page: &Pagination,
    ) -> Result<AuditPage<PermissionUsageRecord>> {
        let matches = split_usage(&self.entries.read(), filter);
        Ok(paginate(matches, page, |r| r.timestamp))
    }

    async fn query_security_events(
        &self,
        filter: &SecurityEventFilter,
        page: &Pagination,
    ) -> Result<AuditPage<SecurityEvent>> {
        let matches = split_events(&self.entries.read(), filter);
        Ok(paginate(matches, page, |e| e.timestamp))
    }
}

/// Append-only JSON Lines file, one entry per line
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Vec<AuditEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable audit line"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn write_batch(&self, entries: &[AuditEntry]) -> Result<()> {
        let mut buffer = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buffer, entry)?;
            buffer.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        debug!(path = %self.path.display(), count = entries.len(), "Appended audit entries");
        Ok(())
    }

    async fn query_permission_usage(
        &self,
        filter: &UsageFilter,
        page: &Pagination,
    ) -> Result<AuditPage<PermissionUsageRecord>> {
        let entries = self.read_entries().await?;
        Ok(paginate(split_usage(&entries, filter), page, |r| r.timestamp))
    }

    async fn query_security_events(
        &self,
        filter: &SecurityEventFilter,
        page: &Pagination,
    ) -> Result<AuditPage<SecurityEvent>> {
        let entries = self.read_entries().await?;
        Ok(paginate(split_events(&entries, filter), page, |e| e.timestamp))
    }
}
