//! SinkHandle - manages a sink with isolated queue and worker thread

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    spawn_runtime_thread, Record, RecordSink, StopListener, StopSignal, WorkerThread,
};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;
use crate::sinks::LatestValues;

enum QueueSender {
    Bounded(mpsc::Sender<Record>),
    Unbounded(mpsc::UnboundedSender<Record>),
}

enum QueueReceiver {
    Bounded(mpsc::Receiver<Record>),
    Unbounded(mpsc::UnboundedReceiver<Record>),
}

impl QueueReceiver {
    async fn recv(&mut self) -> Option<Record> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Why a record was not queued
#[derive(Debug, Clone, Copy)]
enum QueueRejected {
    Full,
    Closed,
}

fn queue(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

/// Handle to a running sink worker
///
/// The worker owns the sink and is the only consumer of the queue; the
/// handle only ever enqueues.
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send records to worker
    tx: QueueSender,
    /// Stop request for the worker loop
    stop: StopSignal,
    /// Worker thread
    worker: WorkerThread<()>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Read view for latest-value sinks
    latest: Option<LatestValues>,
}

impl SinkHandle {
    /// Spawn the worker thread for `sink`
    ///
    /// `queue_capacity = None` gives an unbounded queue: a slow sink grows
    /// memory instead of losing records. A bounded queue drops (and counts)
    /// records once full.
    #[instrument(name = "sink_handle_spawn", skip(sink), fields(sink = %sink.name()))]
    pub fn spawn<S: RecordSink + 'static>(
        sink: S,
        queue_capacity: Option<usize>,
    ) -> Result<Self, DispatcherError> {
        let name = sink.name().to_string();
        if queue_capacity == Some(0) {
            return Err(DispatcherError::sink_creation(
                &name,
                "queue_capacity must be greater than 0",
            ));
        }

        let (tx, rx) = queue(queue_capacity);
        let (stop, listener) = StopSignal::new();
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();
        let thread_name = format!("sink-{name}");
        let handle = spawn_runtime_thread(thread_name.clone(), move || async move {
            sink_worker(sink, rx, listener, worker_metrics, worker_name).await;
        })?;

        info!(sink = %name, capacity = ?queue_capacity, "Sink worker spawned");

        Ok(Self {
            name,
            tx,
            stop,
            worker: WorkerThread::new(thread_name, handle),
            metrics,
            latest: None,
        })
    }

    /// Attach the read view of a latest-value sink
    pub fn with_latest_view(mut self, view: LatestValues) -> Self {
        self.latest = Some(view);
        self
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Latest-value view, if this handle wraps a latest-value sink
    pub fn latest_values(&self) -> Option<&LatestValues> {
        self.latest.as_ref()
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Send a record to the sink (non-blocking)
    ///
    /// Returns true if queued, false if the queue is full (record dropped)
    /// or the worker is gone.
    pub fn try_send(&self, record: Record) -> bool {
        let address = record.address();
        // Counted before the send so the worker's decrement can never run first.
        self.metrics.inc_queue_len();
        let sent = match &self.tx {
            QueueSender::Bounded(tx) => tx.try_send(record).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueRejected::Full,
                mpsc::error::TrySendError::Closed(_) => QueueRejected::Closed,
            }),
            QueueSender::Unbounded(tx) => tx.send(record).map_err(|_| QueueRejected::Closed),
        };

        let len = match sent {
            Ok(()) => self.metrics.queue_len(),
            Err(_) => self.metrics.dec_queue_len(),
        };
        observability::set_sink_queue_len(&self.name, len);

        match sent {
            Ok(()) => true,
            Err(QueueRejected::Full) => {
                self.metrics.inc_dropped_count();
                observability::record_dropped(&self.name);
                warn!(sink = %self.name, address, "Queue full, record dropped");
                false
            }
            Err(QueueRejected::Closed) => {
                debug!(sink = %self.name, address, "Sink worker stopped, record not queued");
                false
            }
        }
    }

    /// Ask the worker to exit after its current record
    ///
    /// Records still queued are not persisted. Returns false if already stopped.
    #[instrument(name = "sink_handle_stop", skip(self), fields(sink = %self.name))]
    pub fn stop(&self) -> bool {
        let first = self.stop.stop();
        if first {
            debug!(sink = %self.name, "Stop requested");
        }
        first
    }

    /// Wait for the worker thread to exit
    pub fn join(&self) -> Result<(), DispatcherError> {
        self.worker.join().ok_or_else(|| DispatcherError::WorkerLost {
            name: self.name.clone(),
        })
    }

    /// Close the queue, let the worker persist everything already queued, then join
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub fn shutdown(self) -> Result<(), DispatcherError> {
        let Self {
            name,
            tx,
            stop,
            worker,
            ..
        } = self;
        // Dropping the stop signal would end the loop early; keep it until joined.
        drop(tx);
        let joined = worker.join();
        drop(stop);
        joined.ok_or(DispatcherError::WorkerLost { name: name.clone() })?;
        debug!(sink = %name, "SinkHandle shutdown complete");
        Ok(())
    }
}

/// Worker loop that drains the queue into the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, stop, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: RecordSink>(
    mut sink: S,
    mut rx: QueueReceiver,
    mut stop: StopListener,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    if let Err(e) = sink.open().await {
        error!(sink = %name, error = %e, "Open failed, worker not started");
        return;
    }
    debug!(sink = %name, "Sink worker started");

    loop {
        let record = tokio::select! {
            biased;
            _ = stop.stopped() => break,
            next = rx.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };

        let len = metrics.dec_queue_len();
        observability::set_sink_queue_len(&name, len);

        match sink.persist(&record).await {
            Ok(()) => {
                metrics.inc_persisted_count();
                observability::record_persisted(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_persisted(&name, false);
                error!(
                    sink = %name,
                    address = record.address(),
                    error = %e,
                    "Persist failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
