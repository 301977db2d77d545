//! RecordSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for persistence backends.

use crate::{ContractError, Record};

/// Record persistence trait
///
/// All sink implementations must implement this trait. A sink is driven by
/// exactly one worker: `open` once, `persist` per record, then `flush` and
/// `close` when the worker stops.
#[trait_variant::make(RecordSink: Send)]
pub trait LocalRecordSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Acquire backend resources before the first record
    async fn open(&mut self) -> Result<(), ContractError>;

    /// Durably record one reading
    ///
    /// # Errors
    /// Returns persist error (should include context). The worker reports it
    /// and moves on to the next record; there is no retry.
    async fn persist(&mut self, record: &Record) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Fan-out entry point fed by the stream receiver
///
/// Implemented by the dispatcher; the receiver only ever sees this trait.
pub trait RecordDispatch: Send + Sync {
    /// Enqueue the record onto every registered sink without blocking
    fn dispatch(&self, record: &Record);

    /// Ask every registered sink worker to stop
    fn stop_sinks(&self);
}
