//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Records enqueued but not yet taken by the worker
    queue_len: AtomicUsize,
    /// Total successful persists
    persisted_count: AtomicU64,
    /// Total persist failures
    failure_count: AtomicU64,
    /// Total records dropped due to a full queue
    dropped_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Record an enqueue, returning the new queue length
    pub fn inc_queue_len(&self) -> usize {
        self.queue_len.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a dequeue, returning the new queue length
    pub fn dec_queue_len(&self) -> usize {
        let prev = self
            .queue_len
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    /// Get total persisted count
    pub fn persisted_count(&self) -> u64 {
        self.persisted_count.load(Ordering::Relaxed)
    }

    /// Increment persisted count
    pub fn inc_persisted_count(&self) {
        self.persisted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get failure count
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get dropped count
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Increment dropped count
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            persisted_count: self.persisted_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub persisted_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}
