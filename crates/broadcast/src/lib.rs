//! # Broadcast
//!
//! 广播服务端：单线程、基于就绪事件的多路复用。
//!
//! - 接受任意数量的客户端连接，客户端以远端地址 (host, port) 为唯一标识
//! - 每个客户端拥有独立的发送队列，慢客户端不会阻塞其他客户端
//! - `stop()` 关闭所有客户端连接与监听套接字

mod error;
mod metrics;
mod registry;
mod server;

pub use contracts::{ClientKey, ServerConfig};
pub use error::{BroadcastError, Result};
pub use metrics::{ServerMetrics, ServerMetricsSnapshot};
pub use server::{BroadcastServer, ServerHandle};
