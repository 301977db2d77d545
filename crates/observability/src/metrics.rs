//! 遥测链路指标
//!
//! 各阶段通过这些函数上报指标，指标名称统一以 `telemetry_bridge_` 开头。

use metrics::{counter, describe_counter, describe_gauge, gauge};

// Broadcast server
pub const CLIENTS_CONNECTED: &str = "telemetry_bridge_clients_connected";
pub const CLIENTS_ACCEPTED_TOTAL: &str = "telemetry_bridge_clients_accepted_total";
pub const MESSAGES_QUEUED_TOTAL: &str = "telemetry_bridge_messages_queued_total";
pub const MESSAGES_SENT_TOTAL: &str = "telemetry_bridge_messages_sent_total";
pub const MESSAGES_DISCARDED_TOTAL: &str = "telemetry_bridge_messages_discarded_total";
pub const BYTES_SENT_TOTAL: &str = "telemetry_bridge_bytes_sent_total";

// Stream receiver
pub const BYTES_RECEIVED_TOTAL: &str = "telemetry_bridge_bytes_received_total";
pub const FRAMES_DECODED_TOTAL: &str = "telemetry_bridge_frames_decoded_total";
pub const FRAMES_MALFORMED_TOTAL: &str = "telemetry_bridge_frames_malformed_total";
pub const BYTES_DISCARDED_TOTAL: &str = "telemetry_bridge_bytes_discarded_total";

// Sinks
pub const RECORDS_PERSISTED_TOTAL: &str = "telemetry_bridge_records_persisted_total";
pub const RECORDS_DROPPED_TOTAL: &str = "telemetry_bridge_records_dropped_total";
pub const SINK_QUEUE_LEN: &str = "telemetry_bridge_sink_queue_len";

/// 注册指标描述 (Prometheus HELP)
pub fn describe_metrics() {
    describe_gauge!(CLIENTS_CONNECTED, "Broadcast clients currently connected");
    describe_counter!(CLIENTS_ACCEPTED_TOTAL, "Broadcast clients accepted");
    describe_counter!(MESSAGES_QUEUED_TOTAL, "Messages queued to client outboxes");
    describe_counter!(MESSAGES_SENT_TOTAL, "Messages fully written to clients");
    describe_counter!(
        MESSAGES_DISCARDED_TOTAL,
        "Messages addressed to clients that were already gone"
    );
    describe_counter!(BYTES_SENT_TOTAL, "Bytes written to broadcast clients");
    describe_counter!(BYTES_RECEIVED_TOTAL, "Bytes read from the telemetry source");
    describe_counter!(FRAMES_DECODED_TOTAL, "Frames decoded into records");
    describe_counter!(FRAMES_MALFORMED_TOTAL, "Frames rejected by validation");
    describe_counter!(BYTES_DISCARDED_TOTAL, "Bytes consumed outside of any frame");
    describe_counter!(RECORDS_PERSISTED_TOTAL, "Persist attempts per sink and status");
    describe_counter!(RECORDS_DROPPED_TOTAL, "Records dropped on a full sink queue");
    describe_gauge!(SINK_QUEUE_LEN, "Records waiting in a sink queue");
}

/// 设置当前连接的客户端数量
pub fn set_clients_connected(count: usize) {
    gauge!(CLIENTS_CONNECTED).set(count as f64);
}

/// 记录新接入的客户端
pub fn record_client_accepted() {
    counter!(CLIENTS_ACCEPTED_TOTAL).increment(1);
}

/// 记录入队的消息 (每个目标客户端计一次)
pub fn record_messages_queued(count: usize) {
    counter!(MESSAGES_QUEUED_TOTAL).increment(count as u64);
}

/// 记录完整发送的消息
pub fn record_message_sent() {
    counter!(MESSAGES_SENT_TOTAL).increment(1);
}

/// 记录因客户端已断开而丢弃的消息
pub fn record_message_discarded() {
    counter!(MESSAGES_DISCARDED_TOTAL).increment(1);
}

/// 记录发送字节数
pub fn record_bytes_sent(bytes: usize) {
    counter!(BYTES_SENT_TOTAL).increment(bytes as u64);
}

/// 记录接收字节数
pub fn record_bytes_received(bytes: usize) {
    counter!(BYTES_RECEIVED_TOTAL).increment(bytes as u64);
}

/// 记录解码成功的帧
pub fn record_frame_decoded() {
    counter!(FRAMES_DECODED_TOTAL).increment(1);
}

/// 记录格式错误的帧
pub fn record_frame_malformed() {
    counter!(FRAMES_MALFORMED_TOTAL).increment(1);
}

/// 记录帧外丢弃的字节
pub fn record_bytes_discarded(bytes: usize) {
    counter!(BYTES_DISCARDED_TOTAL).increment(bytes as u64);
}

/// 记录一次持久化结果
pub fn record_persisted(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        RECORDS_PERSISTED_TOTAL,
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录队列已满导致的丢弃
pub fn record_dropped(sink_name: &str) {
    counter!(RECORDS_DROPPED_TOTAL, "sink" => sink_name.to_string()).increment(1);
}

/// 设置 sink 队列长度
pub fn set_sink_queue_len(sink_name: &str, len: usize) {
    gauge!(SINK_QUEUE_LEN, "sink" => sink_name.to_string()).set(len as f64);
}
