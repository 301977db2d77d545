//! `serve` command implementation.

use std::time::Instant;

use anyhow::{Context, Result};
use broadcast::BroadcastServer;
use ingestion::FrameCodec;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{init_metrics, load_blueprint, optional_secs, revalidate};
use crate::cli::ServeArgs;
use crate::error::CliError;
use crate::pipeline::{shutdown_signal, PseudoController, ServeStats};

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding listen host from CLI");
        blueprint.server.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port = %port, "Overriding listen port from CLI");
        blueprint.server.port = port;
    }
    if let Some(period_ms) = args.period_ms {
        info!(period_ms, "Overriding controller period from CLI");
        blueprint.source.period_ms = period_ms;
    }
    revalidate(&blueprint)?;
    init_metrics(args.metrics_port)?;

    let mut controller = PseudoController::from_config(&blueprint.source, args.seed);
    for parameter in controller.parameters() {
        debug!(
            address = parameter.address(),
            name = %parameter.name(),
            kind = ?parameter.kind(),
            value = %parameter.value().render(),
            "Controller parameter"
        );
    }

    let server = BroadcastServer::new(blueprint.server.clone())
        .start()
        .context("Failed to start broadcast server")?;

    info!(
        addr = %server.local_addr(),
        parameters = controller.parameters().len(),
        period_ms = blueprint.source.period_ms,
        "Broadcasting controller telemetry"
    );

    let started = Instant::now();
    let mut stats = ServeStats::default();

    let mut ticker = interval(blueprint.source.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let timeout = optional_secs(args.timeout);
    let deadline = async {
        match timeout {
            Some(after) => sleep(after).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping server...");
                break;
            }
            _ = &mut deadline => {
                info!("Timeout reached, stopping server");
                break;
            }
            _ = ticker.tick() => {
                stats.ticks += 1;
                let timestamp = chrono::Utc::now().timestamp();
                for record in controller.tick(timestamp) {
                    server
                        .broadcast(FrameCodec::encode(&record))
                        .context("Broadcast server stopped unexpectedly")?;
                    stats.records_broadcast += 1;
                }
            }
        }
    }

    server.stop();
    stats.server = server.metrics();
    tokio::task::spawn_blocking(move || server.join())
        .await
        .map_err(|e| CliError::worker_join(e.to_string()))?
        .context("Broadcast server exited with an error")?;

    stats.duration = started.elapsed();
    info!(
        records = stats.records_broadcast,
        clients = stats.server.clients_accepted,
        duration_secs = stats.duration.as_secs_f64(),
        "Server stopped"
    );
    stats.print_summary();

    Ok(())
}
