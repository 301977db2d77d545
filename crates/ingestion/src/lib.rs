//! # Ingestion
//!
//! Telemetry stream ingestion module.
//!
//! Responsibilities:
//! - Connect to a telemetry source and read its byte stream
//! - Reconstruct brace-delimited frames into `Record`s (`FrameCodec`)
//! - Forward every decoded record to the dispatcher
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::StreamReceiver;
//!
//! let receiver = StreamReceiver::new(blueprint.receiver.clone(), dispatcher.clone());
//! let handle = receiver.start()?;
//! // ...
//! handle.stop();
//! handle.join()?;
//! ```

mod codec;
mod config;
mod error;
mod receiver;

// Re-exports
pub use codec::{Decoded, FrameCodec, MalformedFrame, FRAME_CLOSE, FRAME_OPEN};
pub use config::{IngestionMetrics, MetricsSnapshot};
pub use contracts::Record;
pub use error::{IngestionError, Result};
pub use receiver::{ReceiverExit, ReceiverHandle, StreamReceiver};
