//! Sink implementations
//!
//! In-process stand-ins for the external backends: LogSink, FileSink
//! (append-only table) and LatestValueSink (key-value store).

mod file;
mod latest;
mod log;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::latest::{LatestValueSink, LatestValues};
pub use self::log::LogSink;
