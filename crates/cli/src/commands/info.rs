//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::TelemetryBlueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;
use crate::pipeline::PseudoController;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    server: EndpointInfo,
    receiver: ReceiverInfo,
    source: SourceInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct EndpointInfo {
    addr: String,
    poll_timeout_ms: u64,
    read_buffer_size: usize,
}

#[derive(Serialize)]
struct ReceiverInfo {
    source: String,
    read_buffer_size: usize,
    max_frame_len: usize,
    on_disconnect: String,
}

#[derive(Serialize)]
struct SourceInfo {
    period_ms: u64,
    change_probability: f64,
    parameter_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<ParameterInfo>,
}

#[derive(Serialize)]
struct ParameterInfo {
    address: u32,
    name: String,
    kind: String,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(Some(args.config.as_path()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

/// Parameter table exactly as `serve` would build it
fn parameter_table(blueprint: &TelemetryBlueprint) -> Vec<ParameterInfo> {
    PseudoController::from_config(&blueprint.source, Some(0))
        .parameters()
        .iter()
        .map(|p| ParameterInfo {
            address: p.address(),
            name: p.name().to_string(),
            kind: format!("{:?}", p.kind()),
        })
        .collect()
}

fn build_config_info(blueprint: &TelemetryBlueprint, args: &InfoArgs) -> ConfigInfo {
    let table = parameter_table(blueprint);
    let parameter_count = table.len();

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        server: EndpointInfo {
            addr: blueprint.server.addr(),
            poll_timeout_ms: blueprint.server.poll_timeout_ms,
            read_buffer_size: blueprint.server.read_buffer_size,
        },
        receiver: ReceiverInfo {
            source: blueprint.receiver.addr(),
            read_buffer_size: blueprint.receiver.read_buffer_size,
            max_frame_len: blueprint.receiver.max_frame_len,
            on_disconnect: format!("{:?}", blueprint.receiver.on_disconnect),
        },
        source: SourceInfo {
            period_ms: blueprint.source.period_ms,
            change_probability: blueprint.source.change_probability,
            parameter_count,
            parameters: if args.parameters { table } else { Vec::new() },
        },
        sinks,
    }
}

fn print_config_info(blueprint: &TelemetryBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Telemetry Bridge Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let server = &blueprint.server;
    println!("📡 Broadcast Server");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Listen: {}", server.addr());
    println!("   ├─ Poll timeout: {} ms", server.poll_timeout_ms);
    println!("   └─ Read buffer: {} bytes", server.read_buffer_size);

    let receiver = &blueprint.receiver;
    println!("\n📥 Receiver");
    println!("   ├─ Source: {}", receiver.addr());
    println!("   ├─ Read buffer: {} bytes", receiver.read_buffer_size);
    println!("   ├─ Max frame: {} bytes", receiver.max_frame_len);
    println!("   └─ On disconnect: {:?}", receiver.on_disconnect);

    let table = parameter_table(blueprint);
    let source = &blueprint.source;
    println!("\n⚙️  Controller");
    println!("   ├─ Period: {} ms", source.period_ms);
    println!("   ├─ Change probability: {}", source.change_probability);
    if args.parameters && !table.is_empty() {
        println!("   └─ Parameters ({}):", table.len());
        for (i, parameter) in table.iter().enumerate() {
            let prefix = if i == table.len() - 1 { "└─" } else { "├─" };
            println!(
                "        {} [{}] {} ({})",
                prefix, parameter.address, parameter.name, parameter.kind
            );
        }
    } else {
        println!("   └─ Parameters: {}", table.len());
    }

    if !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let capacity = sink
                .queue_capacity
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string());
            println!("   {} {} ({:?}, queue {})", prefix, sink.name, sink.sink_type, capacity);
            if args.sinks {
                let child_prefix = if is_last { "   " } else { "│  " };
                let mut params: Vec<_> = sink.params.iter().collect();
                params.sort();
                for (key, value) in params {
                    println!("   {}  • {} = {}", child_prefix, key, value);
                }
            }
        }
    }

    println!();
}
