//! Server metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared between the event loop and its handle
#[derive(Debug, Default)]
pub struct ServerMetrics {
    clients_connected: AtomicUsize,
    clients_accepted: AtomicU64,
    messages_queued: AtomicU64,
    messages_sent: AtomicU64,
    messages_discarded: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients_connected(&self) -> usize {
        self.clients_connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_clients_connected(&self, count: usize) {
        self.clients_connected.store(count, Ordering::Relaxed);
        observability::set_clients_connected(count);
    }

    pub(crate) fn record_accepted(&self) {
        self.clients_accepted.fetch_add(1, Ordering::Relaxed);
        observability::record_client_accepted();
    }

    pub(crate) fn record_queued(&self, clients: usize) {
        self.messages_queued
            .fetch_add(clients as u64, Ordering::Relaxed);
        observability::record_messages_queued(clients);
    }

    pub(crate) fn record_discarded(&self) {
        self.messages_discarded.fetch_add(1, Ordering::Relaxed);
        observability::record_message_discarded();
    }

    pub(crate) fn record_written(&self, bytes: usize, completed: bool) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        observability::record_bytes_sent(bytes);
        if completed {
            self.messages_sent.fetch_add(1, Ordering::Relaxed);
            observability::record_message_sent();
        }
    }

    /// Get snapshot
    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            clients_connected: self.clients_connected(),
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_discarded: self.messages_discarded.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerMetricsSnapshot {
    /// Clients currently registered
    pub clients_connected: usize,
    /// Clients accepted since start
    pub clients_accepted: u64,
    /// Messages placed on client queues (one per target client)
    pub messages_queued: u64,
    /// Messages fully written to a client socket
    pub messages_sent: u64,
    /// Messages addressed to a client that was already gone
    pub messages_discarded: u64,
    /// Bytes written to client sockets
    pub bytes_sent: u64,
}
