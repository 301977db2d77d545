//! LogSink - logs every record via tracing

use contracts::{ContractError, Record, RecordSink};
use tracing::{info, instrument};

/// Sink that logs records for debugging
pub struct LogSink {
    name: String,
    persisted: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persisted: 0,
        }
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(
        name = "log_sink_persist",
        skip(self, record),
        fields(sink = %self.name, address = record.address())
    )]
    async fn persist(&mut self, record: &Record) -> Result<(), ContractError> {
        self.persisted += 1;
        info!(
            sink = %self.name,
            address = record.address(),
            value = record.value(),
            timestamp = record.timestamp(),
            "Record received"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, records = self.persisted, "LogSink closed");
        Ok(())
    }
}
