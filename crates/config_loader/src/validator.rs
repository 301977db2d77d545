//! 配置校验模块
//!
//! 校验规则：
//! - 缓冲区大小、就绪等待超时 > 0
//! - max_frame_len >= read_buffer_size
//! - 参数名唯一，change_probability 位于 [0, 1]
//! - sink 名称非空且唯一，显式队列容量 > 0
//! - file sink 必须提供 path 参数

use std::collections::HashSet;

use contracts::{ContractError, SinkType, TelemetryBlueprint};

/// 校验 TelemetryBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    validate_server(blueprint)?;
    validate_receiver(blueprint)?;
    validate_source(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验广播服务端配置
fn validate_server(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let server = &blueprint.server;
    if server.poll_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "server.poll_timeout_ms",
            "poll_timeout_ms must be > 0",
        ));
    }
    if server.read_buffer_size == 0 {
        return Err(ContractError::config_validation(
            "server.read_buffer_size",
            "read_buffer_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验接收端配置
fn validate_receiver(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let receiver = &blueprint.receiver;
    if receiver.read_buffer_size == 0 {
        return Err(ContractError::config_validation(
            "receiver.read_buffer_size",
            "read_buffer_size must be > 0",
        ));
    }
    if receiver.max_frame_len < receiver.read_buffer_size {
        return Err(ContractError::config_validation(
            "receiver.max_frame_len",
            format!(
                "max_frame_len ({}) must be >= read_buffer_size ({})",
                receiver.max_frame_len, receiver.read_buffer_size
            ),
        ));
    }
    Ok(())
}

/// 校验模拟控制器配置
fn validate_source(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;
    if source.period_ms == 0 {
        return Err(ContractError::config_validation(
            "source.period_ms",
            "period_ms must be > 0",
        ));
    }
    if !(0.0..=1.0).contains(&source.change_probability) {
        return Err(ContractError::config_validation(
            "source.change_probability",
            format!(
                "change_probability must be within [0, 1], got {}",
                source.change_probability
            ),
        ));
    }

    let mut seen = HashSet::new();
    for (idx, parameter) in source.parameters.iter().enumerate() {
        let Some(name) = &parameter.name else {
            continue;
        };
        if name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("source.parameters[{idx}].name"),
                "parameter name cannot be empty",
            ));
        }
        if !seen.insert(name) {
            return Err(ContractError::config_validation(
                format!("source.parameters[name={name}]"),
                "duplicate parameter name",
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &TelemetryBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(&sink.name) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == Some(0) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0 (omit it for an unbounded queue)",
            ));
        }
        if sink.sink_type == SinkType::File
            && sink.params.get("path").is_none_or(|p| p.trim().is_empty())
        {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "file sink requires a path",
            ));
        }
    }
    Ok(())
}
