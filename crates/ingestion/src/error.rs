//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 无法连接数据源
    #[error("failed to connect to source {addr}: {source}")]
    Connect {
        /// 数据源地址
        addr: String,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 读取数据源失败
    #[error("receive from {peer} failed: {source}")]
    Receive {
        /// 对端地址
        peer: String,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 接收线程异常退出
    #[error("receiver worker '{worker}' exited without a result")]
    WorkerLost {
        /// 线程名称
        worker: String,
    },

    /// 其他 IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
