//! Broadcast 错误类型

use thiserror::Error;

/// Broadcast server errors
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// Listener could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The event loop has exited; commands are no longer accepted
    #[error("broadcast server is stopped")]
    Stopped,

    /// Event loop thread panicked or was already joined
    #[error("server worker '{worker}' exited without a result")]
    WorkerLost { worker: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broadcast Result 类型别名
pub type Result<T> = std::result::Result<T, BroadcastError>;
