//! Run statistics printed when a command exits.

use std::time::Duration;

use broadcast::ServerMetricsSnapshot;
use contracts::Record;
use ingestion::ReceiverExit;

/// Statistics from a `serve` run
#[derive(Debug, Clone, Default)]
pub struct ServeStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Controller refresh periods executed
    pub ticks: u64,

    /// Value-change records handed to the server
    pub records_broadcast: u64,

    /// Server counters at shutdown
    pub server: ServerMetricsSnapshot,
}

impl ServeStats {
    /// Records broadcast per second
    pub fn records_per_sec(&self) -> f64 {
        per_sec(self.records_broadcast, self.duration)
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Broadcast Statistics                     ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Controller ticks: {}", self.ticks);
        println!("   ├─ Records broadcast: {}", self.records_broadcast);
        println!("   └─ Records/s: {:.2}", self.records_per_sec());

        println!("\n📡 Server");
        println!("   ├─ Clients accepted: {}", self.server.clients_accepted);
        println!("   ├─ Messages queued: {}", self.server.messages_queued);
        println!("   ├─ Messages sent: {}", self.server.messages_sent);
        println!("   ├─ Messages discarded: {}", self.server.messages_discarded);
        println!("   └─ Bytes sent: {}", self.server.bytes_sent);

        println!();
    }
}

/// Final state of one sink
#[derive(Debug, Clone)]
pub struct SinkSummary {
    pub name: String,
    pub metrics: dispatcher::MetricsSnapshot,
    /// Latest record per address, for key-value sinks
    pub latest: Option<Vec<Record>>,
}

/// Statistics from a `receive` run
#[derive(Debug, Clone, Default)]
pub struct ReceiveStats {
    /// Total duration of the run
    pub duration: Duration,

    /// How the receive loop ended (`None` if it failed)
    pub exit: Option<ReceiverExit>,

    /// Receiver counters at shutdown
    pub receiver: ingestion::MetricsSnapshot,

    pub sinks: Vec<SinkSummary>,
}

impl ReceiveStats {
    /// Records decoded per second
    pub fn records_per_sec(&self) -> f64 {
        per_sec(self.receiver.frames_decoded, self.duration)
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Ingestion Statistics                     ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        let exit = match self.exit {
            Some(ReceiverExit::Stopped) => "stopped",
            Some(ReceiverExit::PeerClosed) => "source closed",
            None => "failed",
        };

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Exit: {exit}");
        println!("   ├─ Bytes received: {}", self.receiver.bytes_received);
        println!("   ├─ Records decoded: {}", self.receiver.frames_decoded);
        println!("   ├─ Malformed frames: {}", self.receiver.frames_malformed);
        println!("   ├─ Bytes discarded: {}", self.receiver.bytes_discarded);
        println!("   └─ Records/s: {:.2}", self.records_per_sec());

        if !self.sinks.is_empty() {
            println!("\n📦 Sinks");
            for sink in &self.sinks {
                println!(
                    "   ├─ {}: persisted={} failed={} dropped={} queued={}",
                    sink.name,
                    sink.metrics.persisted_count,
                    sink.metrics.failure_count,
                    sink.metrics.dropped_count,
                    sink.metrics.queue_len
                );
                if let Some(latest) = &sink.latest {
                    for record in latest {
                        println!("   │    └─ {record}");
                    }
                }
            }
        }

        println!();
    }
}

fn per_sec(count: u64, duration: Duration) -> f64 {
    if duration.as_secs_f64() > 0.0 {
        count as f64 / duration.as_secs_f64()
    } else {
        0.0
    }
}
