//! Bounded, non-blocking audit logger

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{debug, error, warn};

use crate::{
    error::Result,
    models::{AuditEntry, PermissionUsageRecord, SecurityEvent},
    query::{AuditPage, Pagination, SecurityEventFilter, UsageFilter},
    sink::AuditSink,
};

/// Queue sizing for the audit logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries held in memory before the oldest is dropped
    pub queue_capacity: usize,
    /// Maximum entries handed to the sink per write
    pub batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
        }
    }
}

/// Counters describing what happened to enqueued entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    /// Entries accepted into the queue
    pub enqueued: u64,
    /// Entries discarded because the queue was full or the logger shut down
    pub dropped: u64,
    /// Entries the sink accepted
    pub written: u64,
    /// Entries lost in failed sink writes
    pub failed: u64,
    /// Failed sink writes
    pub sink_errors: u64,
    /// Entries waiting in the queue right now
    pub queued: usize,
}

/// Queue contents plus the bookkeeping `flush` needs.
///
/// Every accepted entry gets the next sequence number. An entry is settled
/// once it has been written, dropped, or lost to a sink error; everything
/// below [`QueueState::low_watermark`] is settled.
#[derive(Default)]
struct QueueState {
    entries: VecDeque<(u64, AuditEntry)>,
    next_seq: u64,
    /// First sequence number of the batch currently inside the sink
    in_flight: Option<u64>,
}

impl QueueState {
    /// Lowest sequence number that has not been settled yet
    fn low_watermark(&self) -> u64 {
        self.in_flight
            .or_else(|| self.entries.front().map(|(seq, _)| *seq))
            .unwrap_or(self.next_seq)
    }
}

struct Shared {
    state: Mutex<QueueState>,
    config: AuditConfig,
    sink: Arc<dyn AuditSink>,
    /// Wakes the worker when work arrives or shutdown starts
    wake: Notify,
    /// Wakes `flush` callers when the low watermark may have moved
    progress: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    sink_errors: AtomicU64,
}

impl Shared {
    fn next_batch(&self) -> Vec<AuditEntry> {
        let mut state = self.state.lock();
        let n = self.config.batch_size.min(state.entries.len());
        let batch: Vec<_> = state.entries.drain(..n).collect();
        state.in_flight = batch.first().map(|(seq, _)| *seq);
        batch.into_iter().map(|(_, entry)| entry).collect()
    }

    fn finish_batch(&self) {
        self.state.lock().in_flight = None;
        self.progress.notify_waiters();
    }

    async fn run(self: Arc<Self>) {
        debug!("Audit worker started");
        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                if self.closed.load(Ordering::SeqCst) {
                    break;
                }
                self.wake.notified().await;
                continue;
            }

            let count = batch.len() as u64;
            match self.sink.write_batch(&batch).await {
                Ok(()) => {
                    self.written.fetch_add(count, Ordering::SeqCst);
                }
                Err(e) => {
                    self.sink_errors.fetch_add(1, Ordering::SeqCst);
                    self.failed.fetch_add(count, Ordering::SeqCst);
                    error!(error = %e, entries = count, "Audit sink write failed");
                }
            }
            self.finish_batch();
        }
        self.progress.notify_waiters();
        debug!("Audit worker stopped");
    }
}

/// Closes the queue when the last logger handle goes away
struct WorkerGuard {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerGuard {
    fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Asynchronous audit logger.
///
/// `log_*` calls never wait on I/O: they push onto a bounded in-memory queue
/// and return. A background task drains the queue into the configured
/// [`AuditSink`] in batches. When the queue is full the **oldest** queued
/// entry is discarded and counted in [`AuditStats::dropped`].
///
/// Handles are cheap to clone. The worker drains what is left and stops once
/// [`shutdown`](Self::shutdown) is called or the last handle is dropped.
#[derive(Clone)]
pub struct AuditLogger {
    shared: Arc<Shared>,
    worker: Arc<WorkerGuard>,
}

impl AuditLogger {
    /// Start a logger with default sizing. Must be called within a Tokio runtime.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_config(sink, AuditConfig::default())
    }

    /// Start a logger with explicit sizing. Must be called within a Tokio runtime.
    pub fn with_config(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        let config = AuditConfig {
            queue_capacity: config.queue_capacity.max(1),
            batch_size: config.batch_size.max(1),
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(config.queue_capacity.min(1024)),
                ..QueueState::default()
            }),
            config,
            sink,
            wake: Notify::new(),
            progress: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
        });

        let handle = tokio::spawn(shared.clone().run());
        Self {
            worker: Arc::new(WorkerGuard {
                shared: shared.clone(),
                handle: Mutex::new(Some(handle)),
            }),
            shared,
        }
    }

    pub fn config(&self) -> AuditConfig {
        self.shared.config
    }

    /// Record a permission check. Never blocks.
    pub fn log_permission_usage(&self, record: PermissionUsageRecord) {
        self.enqueue(AuditEntry::PermissionUsage(record));
    }

    /// Record a security event. Never blocks.
    pub fn log_security_event(&self, event: SecurityEvent) {
        self.enqueue(AuditEntry::SecurityEvent(event));
    }

    pub fn enqueue(&self, entry: AuditEntry) {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            shared.dropped.fetch_add(1, Ordering::SeqCst);
            warn!("Audit logger is shut down, dropping entry");
            return;
        }

        let evicted = {
            let mut state = shared.state.lock();
            let evicted = if state.entries.len() >= shared.config.queue_capacity {
                state.entries.pop_front()
            } else {
                None
            };
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push_back((seq, entry));
            evicted
        };

        if evicted.is_some() {
            let dropped = shared.dropped.fetch_add(1, Ordering::SeqCst) + 1;
            // One line per power of two keeps a sustained overflow from flooding the log.
            if dropped.is_power_of_two() {
                warn!(dropped, "Audit queue full, dropped oldest entry");
            }
            shared.progress.notify_waiters();
        }
        shared.wake.notify_one();
    }

    pub fn stats(&self) -> AuditStats {
        let shared = &self.shared;
        let (enqueued, queued) = {
            let state = shared.state.lock();
            (state.next_seq, state.entries.len())
        };
        AuditStats {
            enqueued,
            dropped: shared.dropped.load(Ordering::SeqCst),
            written: shared.written.load(Ordering::SeqCst),
            failed: shared.failed.load(Ordering::SeqCst),
            sink_errors: shared.sink_errors.load(Ordering::SeqCst),
            queued,
        }
    }

    /// Wait until every entry enqueued before this call has been written,
    /// dropped, or lost to a sink error.
    ///
    /// Entries still inside the sink hold the call back even if later
    /// entries are evicted in the meantime.
    pub async fn flush(&self) {
        let shared = &self.shared;
        let target = shared.state.lock().next_seq;
        loop {
            let notified = shared.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shared.state.lock().low_watermark() >= target {
                return;
            }
            if self.worker_finished() {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting entries, drain the queue, and wait for the worker to exit.
    pub async fn shutdown(&self) {
        self.worker.close();
        let handle = self.worker.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Audit worker terminated abnormally");
            }
        }
    }

    fn worker_finished(&self) -> bool {
        self.worker
            .handle
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Query recorded permission checks, newest first
    pub async fn get_audit_trail(
        &self,
        filter: &UsageFilter,
        page: &Pagination,
    ) -> Result<AuditPage<PermissionUsageRecord>> {
        self.shared.sink.query_permission_usage(filter, page).await
    }

    /// Query recorded security events, newest first
    pub async fn get_security_events(
        &self,
        filter: &SecurityEventFilter,
        page: &Pagination,
    ) -> Result<AuditPage<SecurityEvent>> {
        self.shared.sink.query_security_events(filter, page).await
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditDecision, SecurityEventType};
    use crate::sink::MemoryAuditSink;

    fn record(n: usize) -> PermissionUsageRecord {
        PermissionUsageRecord::new(
            format!("req-{n}"),
            "u1",
            "user:view:own",
            AuditDecision::Allowed,
            "",
            0.1,
        )
    }

    #[tokio::test]
    async fn test_entries_reach_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new(sink.clone());

        logger.log_permission_usage(record(1));
        logger.log_security_event(SecurityEvent::new(SecurityEventType::UnauthorizedAccessAttempt));
        logger.flush().await;

        assert_eq!(sink.len(), 2);
        let stats = logger.stats();
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn test_flush_on_idle_logger_returns() {
        let logger = AuditLogger::new(Arc::new(MemoryAuditSink::new()));
        logger.flush().await;
        assert_eq!(logger.stats(), AuditStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new(sink.clone());

        for n in 0..10 {
            logger.log_permission_usage(record(n));
        }
        logger.shutdown().await;
        assert_eq!(sink.len(), 10);

        logger.log_permission_usage(record(99));
        logger.flush().await;
        assert_eq!(sink.len(), 10);
        assert_eq!(logger.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_config_clamps_zero_sizes() {
        let logger = AuditLogger::with_config(
            Arc::new(MemoryAuditSink::new()),
            AuditConfig {
                queue_capacity: 0,
                batch_size: 0,
            },
        );
        assert_eq!(logger.config().queue_capacity, 1);
        assert_eq!(logger.config().batch_size, 1);
    }

    #[tokio::test]
    async fn test_read_side_queries_go_to_sink() {
        let sink = Arc::new(MemoryAuditSink::new());
        let logger = AuditLogger::new(sink);

        logger.log_permission_usage(record(1));
        logger.log_permission_usage(
            PermissionUsageRecord::new(
                "req-2",
                "u2",
                "user:edit:all",
                AuditDecision::Denied,
                "",
                0.3,
            )
            .with_enforcement_mode("enforce"),
        );
        logger.flush().await;

        let trail = logger
            .get_audit_trail(&UsageFilter::new().with_user("u2"), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(trail.total, 1);
        assert_eq!(trail.items[0].enforcement_mode.as_deref(), Some("enforce"));
    }
}
