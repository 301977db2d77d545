//! # Observability
//!
//! 遥测桥的日志与指标出口。
//!
//! 日志走 `tracing` 订阅者，格式由 [`LogFormat`] 选择，级别由 `RUST_LOG`
//! 覆盖；指标走 `metrics` 门面，可选地通过 Prometheus HTTP 端点暴露。
//! 广播端、接收端和落盘 worker 只调用 [`metrics`] 中的上报函数，
//! 不关心是否安装了 recorder。
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Compact,
//!     metrics_port: None,
//!     ..Default::default()
//! })?;
//! observability::record_frame_decoded();
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    describe_metrics, record_bytes_discarded, record_bytes_received, record_bytes_sent,
    record_client_accepted, record_dropped, record_frame_decoded, record_frame_malformed,
    record_message_discarded, record_message_sent, record_messages_queued, record_persisted,
    set_clients_connected, set_sink_queue_len,
};

/// Port the Prometheus endpoint listens on unless told otherwise
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// JSON logs at `info` plus the metrics endpoint on [`DEFAULT_METRICS_PORT`]
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 日志与指标的启动参数
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// `None` 时不启动 Prometheus 端点
    pub metrics_port: Option<u16>,
    /// `RUST_LOG` 未设置时使用的过滤指令
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: Some(DEFAULT_METRICS_PORT),
            default_log_level: "info".to_string(),
        }
    }
}

/// Shape of each log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with thread and source location
    #[default]
    Json,
    /// Multi-line, for reading by eye
    Pretty,
    Compact,
}

impl LogFormat {
    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
            LogFormat::Compact => fmt::layer().compact().with_thread_names(true).boxed(),
        }
    }
}

/// Install the global subscriber, then the metrics endpoint if a port is set
///
/// Fails if a global subscriber or recorder is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    tracing_subscriber::registry()
        .with(config.log_format.layer())
        .with(filter)
        .try_init()
        .context("Failed to install the log subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Logging ready"
    );
    Ok(())
}

/// 只安装 Prometheus recorder 并注册指标描述
///
/// 日志订阅者由调用方自行安装时使用。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to serve metrics on port {port}"))?;
    describe_metrics();

    tracing::info!(port, "Metrics endpoint listening");
    Ok(())
}
