//! TelemetryBlueprint - Config Loader 输出
//!
//! 描述完整的部署配置：广播服务端、接收端、模拟控制器参数、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的部署配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 广播服务端设置
    #[serde(default)]
    pub server: ServerConfig,

    /// 接收端设置
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// 模拟控制器设置
    #[serde(default)]
    pub source: SourceConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// 广播服务端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 就绪等待超时 (毫秒)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// 单次读取缓冲区大小 (字节)
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl ServerConfig {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            poll_timeout_ms: default_poll_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// 接收端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// 数据源地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 数据源端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 单次读取缓冲区大小 (字节)
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// 未闭合帧的最大长度 (字节)，超出则丢弃
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// 数据源断开时的处理策略
    #[serde(default)]
    pub on_disconnect: DisconnectPolicy,
}

impl ReceiverConfig {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_buffer_size: default_read_buffer_size(),
            max_frame_len: default_max_frame_len(),
            on_disconnect: DisconnectPolicy::default(),
        }
    }
}

/// 数据源断开策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// 停止所有 sink
    #[default]
    StopSinks,
    /// 保留 sink，空闲等待新的数据
    KeepSinks,
}

/// 模拟控制器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 参数刷新周期 (毫秒)
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// 每个周期内单个参数被重新随机化的概率
    #[serde(default = "default_change_probability")]
    pub change_probability: f64,

    /// 参数列表 (为空时使用默认的十个参数)
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

impl SourceConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            change_probability: default_change_probability(),
            parameters: Vec::new(),
        }
    }
}

/// 参数配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// 参数名称 (为空时按类型自动编号)
    #[serde(default)]
    pub name: Option<String>,

    /// 参数类型
    pub kind: ParameterKind,
}

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// 整数 (0..=100)
    Integer,
    /// 浮点数 [0, 100)
    Float,
    /// 布尔值
    Boolean,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量 (缺省为无界队列)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (按行追加，每行一条记录)
    File,
    /// 最新值表 (按地址覆盖)
    LatestValue,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_poll_timeout_ms() -> u64 {
    50
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_max_frame_len() -> usize {
    1024 * 1024
}

fn default_period_ms() -> u64 {
    5000
}

fn default_change_probability() -> f64 {
    0.5
}
