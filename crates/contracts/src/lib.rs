//! # Contracts
//!
//! Frozen interface contracts shared by every stage of the telemetry bridge.
//! All business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data flow
//! - controller -> `broadcast` (encoded records, one queue per client)
//! - `ingestion` (socket -> `Record`) -> `dispatcher` -> `RecordSink` backends
//!
//! ## Time Model
//! - Record timestamps are integer epoch seconds, stamped by the producer

mod blueprint;
mod error;
mod lifecycle;
mod record;
mod sink;

pub use blueprint::*;
pub use error::*;
pub use lifecycle::{spawn_runtime_thread, StopListener, StopSignal, WorkerThread};
pub use record::{Address, ClientKey, Record};
pub use sink::*;
