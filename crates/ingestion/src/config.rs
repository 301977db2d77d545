//! Receiver metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total bytes read from the source
    pub bytes_received: AtomicU64,

    /// Frames decoded into records
    pub frames_decoded: AtomicU64,

    /// Frames rejected by structural validation
    pub frames_malformed: AtomicU64,

    /// Bytes consumed outside of any frame (noise, oversized frames)
    pub bytes_discarded: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes read
    pub fn record_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        observability::record_bytes_received(bytes);
    }

    /// Record decoded frame
    pub fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        observability::record_frame_decoded();
    }

    /// Record malformed frame
    pub fn record_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
        observability::record_frame_malformed();
    }

    /// Record discarded bytes
    pub fn record_discarded(&self, bytes: usize) {
        if bytes > 0 {
            self.bytes_discarded.fetch_add(bytes as u64, Ordering::Relaxed);
            observability::record_bytes_discarded(bytes);
        }
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total bytes read from the source
    pub bytes_received: u64,

    /// Frames decoded into records
    pub frames_decoded: u64,

    /// Frames rejected by structural validation
    pub frames_malformed: u64,

    /// Bytes consumed outside of any frame
    pub bytes_discarded: u64,
}
