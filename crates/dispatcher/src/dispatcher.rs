//! IngestionDispatcher - fan-out of decoded records to sinks

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, info, instrument, warn};

use contracts::{Record, RecordDispatch, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LatestValueSink, LatestValues, LogSink};

/// Builder for creating an IngestionDispatcher from configuration
pub struct DispatcherBuilder {
    sinks: Vec<SinkConfig>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(sinks: Vec<SinkConfig>) -> Self {
        Self { sinks }
    }

    /// Build the dispatcher, spawning one worker per sink
    ///
    /// On error, workers already spawned are stopped and joined.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.sinks.len())
    )]
    pub fn build(self) -> Result<IngestionDispatcher, DispatcherError> {
        let dispatcher = IngestionDispatcher::new();
        for sink_config in &self.sinks {
            let registered =
                create_sink_handle(sink_config).and_then(|handle| dispatcher.register(handle));
            if let Err(e) = registered {
                dispatcher.stop_all();
                let _ = dispatcher.join_all();
                return Err(e);
            }
        }
        Ok(dispatcher)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::LatestValue => {
            let sink = LatestValueSink::from_params(&config.name, &config.params);
            let view = sink.values();
            Ok(SinkHandle::spawn(sink, config.queue_capacity)?.with_latest_view(view))
        }
    }
}

/// Fans every dispatched record out to all registered sinks
///
/// Enqueueing never blocks: each sink has its own queue and worker, so a slow
/// or failing sink cannot hold up the caller or the other sinks.
#[derive(Default)]
pub struct IngestionDispatcher {
    handles: RwLock<Vec<SinkHandle>>,
}

impl IngestionDispatcher {
    /// Create a dispatcher with no sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with custom sink handles
    pub fn with_handles(handles: Vec<SinkHandle>) -> Result<Self, DispatcherError> {
        let dispatcher = Self::new();
        for handle in handles {
            dispatcher.register(handle)?;
        }
        Ok(dispatcher)
    }

    /// Register a running sink under its name
    ///
    /// # Errors
    /// `DuplicateSink` if a sink with the same name is already registered; the
    /// rejected handle is stopped.
    #[instrument(name = "dispatcher_register", skip(self, handle), fields(sink = %handle.name()))]
    pub fn register(&self, handle: SinkHandle) -> Result<(), DispatcherError> {
        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        if handles.iter().any(|h| h.name() == handle.name()) {
            let name = handle.name().to_string();
            handle.stop();
            return Err(DispatcherError::DuplicateSink { name });
        }
        info!(sink = %handle.name(), "Sink registered");
        handles.push(handle);
        Ok(())
    }

    /// Enqueue a copy of `record` on every registered sink
    ///
    /// Returns how many sinks accepted it.
    pub fn dispatch(&self, record: &Record) -> usize {
        let handles = self.read();
        let accepted = handles
            .iter()
            .filter(|handle| handle.try_send(record.clone()))
            .count();
        debug!(
            address = record.address(),
            accepted,
            sinks = handles.len(),
            "Record dispatched"
        );
        accepted
    }

    /// Ask every sink worker to stop after its current record
    #[instrument(name = "dispatcher_stop_all", skip(self))]
    pub fn stop_all(&self) {
        let handles = self.read();
        let stopped = handles.iter().filter(|h| h.stop()).count();
        info!(stopped, sinks = handles.len(), "Sinks stop requested");
    }

    /// Wait for every sink worker to exit
    ///
    /// All workers are joined even if one fails; the first failure is returned.
    #[instrument(name = "dispatcher_join_all", skip(self))]
    pub fn join_all(&self) -> Result<(), DispatcherError> {
        let mut first_error = None;
        for handle in self.read().iter() {
            if let Err(e) = handle.join() {
                warn!(sink = %handle.name(), error = %e, "Sink join failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Close every queue, let workers persist what is already queued, and join
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub fn shutdown(self) -> Result<(), DispatcherError> {
        let handles = self
            .handles
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.shutdown() {
                first_error.get_or_insert(e);
            }
        }
        info!("Dispatcher shutdown complete");
        first_error.map_or(Ok(()), Err)
    }

    /// Names of registered sinks, in registration order
    pub fn sink_names(&self) -> Vec<String> {
        self.read().iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.read()
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Read view of the named latest-value sink
    pub fn latest_values(&self, name: &str) -> Option<LatestValues> {
        self.read()
            .iter()
            .find(|h| h.name() == name)
            .and_then(|h| h.latest_values().cloned())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<SinkHandle>> {
        self.handles.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordDispatch for IngestionDispatcher {
    fn dispatch(&self, record: &Record) {
        IngestionDispatcher::dispatch(self, record);
    }

    fn stop_sinks(&self) {
        self.stop_all();
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs))]
pub fn create_dispatcher(sink_configs: &[SinkConfig]) -> Result<IngestionDispatcher, DispatcherError> {
    DispatcherBuilder::new(sink_configs.to_vec()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::{record, wait_until, MockSink};
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    #[test]
    fn test_fanout_isolates_failing_sink() {
        let mut seen = Vec::new();
        let mut handles = Vec::new();
        for i in 1..=4 {
            let (mut sink, records) = MockSink::new(&format!("sink{i}"));
            sink.should_fail = i == 2;
            seen.push(records);
            handles.push(SinkHandle::spawn(sink, None).unwrap());
        }
        let dispatcher = IngestionDispatcher::with_handles(handles).unwrap();

        let expected: Vec<Record> = (0..50).map(record).collect();
        for r in &expected {
            assert_eq!(dispatcher.dispatch(r), 4);
        }

        assert!(wait_until(Duration::from_secs(2), || {
            let metrics: HashMap<_, _> = dispatcher.metrics().into_iter().collect();
            metrics["sink2"].failure_count == 50
        }));
        dispatcher.shutdown().unwrap();

        for (i, records) in seen.iter().enumerate() {
            let records = records.lock().unwrap();
            if i == 1 {
                assert!(records.is_empty());
            } else {
                assert_eq!(*records, expected, "sink{}", i + 1);
            }
        }
    }

    #[test]
    fn test_slow_sink_does_not_delay_others() {
        let (mut slow, seen_a) = MockSink::new("A");
        slow.delay_ms = 300;
        let (fast, seen_b) = MockSink::new("B");

        let dispatcher = IngestionDispatcher::new();
        dispatcher.register(SinkHandle::spawn(slow, None).unwrap()).unwrap();
        dispatcher.register(SinkHandle::spawn(fast, None).unwrap()).unwrap();

        // Keep A busy so the probe record queues behind a slow persist.
        dispatcher.dispatch(&record(1));
        let probe = Record::new(7, "42.5", 1000).unwrap();
        let enqueued = Instant::now();
        assert_eq!(dispatcher.dispatch(&probe), 2);

        assert!(wait_until(Duration::from_millis(200), || {
            seen_b.lock().unwrap().contains(&probe)
        }));
        assert!(enqueued.elapsed() < Duration::from_millis(300));

        assert!(wait_until(Duration::from_secs(3), || {
            seen_a.lock().unwrap().len() == 2
        }));
        dispatcher.stop_all();
        dispatcher.join_all().unwrap();

        let count = |seen: &std::sync::Mutex<Vec<Record>>| {
            seen.lock().unwrap().iter().filter(|r| **r == probe).count()
        };
        assert_eq!(count(&seen_a), 1);
        assert_eq!(count(&seen_b), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dispatcher = IngestionDispatcher::new();
        let (a, _) = MockSink::new("same");
        let (b, _) = MockSink::new("same");
        dispatcher.register(SinkHandle::spawn(a, None).unwrap()).unwrap();

        let err = dispatcher
            .register(SinkHandle::spawn(b, None).unwrap())
            .unwrap_err();
        assert!(matches!(err, DispatcherError::DuplicateSink { name } if name == "same"));
        assert_eq!(dispatcher.sink_names(), vec!["same".to_string()]);

        dispatcher.stop_all();
        dispatcher.join_all().unwrap();
    }

    #[test]
    fn test_stop_sinks_through_trait() {
        let (sink, _) = MockSink::new("observed");
        let dispatcher = IngestionDispatcher::new();
        dispatcher.register(SinkHandle::spawn(sink, None).unwrap()).unwrap();

        let as_trait: &dyn RecordDispatch = &dispatcher;
        as_trait.stop_sinks();
        dispatcher.join_all().unwrap();

        assert_eq!(dispatcher.dispatch(&record(1)), 0);
    }

    #[test]
    fn test_create_dispatcher_from_config() {
        let configs = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: Some(50),
                params: HashMap::new(),
            },
            SinkConfig {
                name: "kv".to_string(),
                sink_type: SinkType::LatestValue,
                queue_capacity: None,
                params: HashMap::new(),
            },
        ];

        let dispatcher = create_dispatcher(&configs).unwrap();
        assert_eq!(dispatcher.sink_names(), vec!["log", "kv"]);
        dispatcher.dispatch(&Record::new(7, "42.5", 1000).unwrap());
        dispatcher.dispatch(&Record::new(7, "43.0", 1001).unwrap());

        let view = dispatcher.latest_values("kv").unwrap();
        assert!(dispatcher.latest_values("log").is_none());
        dispatcher.shutdown().unwrap();

        assert_eq!(view.get(7).unwrap().value(), "43.0");
    }

    #[test]
    fn test_file_sink_without_path_fails_build() {
        let configs = vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: None,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "table".to_string(),
                sink_type: SinkType::File,
                queue_capacity: None,
                params: HashMap::new(),
            },
        ];

        let err = create_dispatcher(&configs).err().unwrap();
        assert!(matches!(err, DispatcherError::SinkCreation { name, .. } if name == "table"));
    }
}
