//! # Dispatcher
//!
//! 记录分发模块。
//!
//! 负责：
//! - 接收 StreamReceiver 解码出的 `Record`
//! - Fan-out 到多个 sink，每个 sink 独立队列、独立线程
//! - 隔离慢 sink 与失败 sink，不阻塞主链路

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{Record, RecordDispatch, RecordSink};
pub use dispatcher::{create_dispatcher, create_sink_handle, DispatcherBuilder, IngestionDispatcher};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LatestValueSink, LatestValues, LogSink};
