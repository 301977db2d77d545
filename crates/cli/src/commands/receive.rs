//! `receive` command implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dispatcher::IngestionDispatcher;
use ingestion::StreamReceiver;
use tokio::time::{interval, sleep};
use tracing::{info, warn};

use super::{init_metrics, load_blueprint, optional_secs, revalidate};
use crate::cli::ReceiveArgs;
use crate::error::CliError;
use crate::pipeline::{shutdown_signal, ReceiveStats, SinkSummary};

/// How often the command checks whether the receive loop is still alive
const LIVENESS_INTERVAL: Duration = Duration::from_millis(200);

/// Execute the `receive` command
pub async fn run_receive(args: &ReceiveArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding source host from CLI");
        blueprint.receiver.host = host.clone();
    }
    if let Some(port) = args.port {
        info!(port = %port, "Overriding source port from CLI");
        blueprint.receiver.port = port;
    }
    revalidate(&blueprint)?;
    init_metrics(args.metrics_port)?;

    if blueprint.sinks.is_empty() {
        warn!("No sinks configured - decoded records will be dropped");
    }

    let dispatcher = Arc::new(
        dispatcher::create_dispatcher(&blueprint.sinks).context("Failed to create sinks")?,
    );
    info!(sinks = ?dispatcher.sink_names(), "Sinks started");

    let receiver = match StreamReceiver::new(blueprint.receiver.clone(), dispatcher.clone()).start()
    {
        Ok(receiver) => receiver,
        Err(e) => {
            stop_sinks(&dispatcher).await?;
            return Err(e).context("Failed to connect to telemetry source");
        }
    };

    let started = Instant::now();

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

    let mut liveness = interval(LIVENESS_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping receiver...");
                break;
            }
            _ = &mut deadline => {
                info!("Timeout reached, stopping receiver");
                break;
            }
            _ = liveness.tick() => {
                if !receiver.is_running() {
                    break;
                }
            }
        }
    }

    receiver.stop();
    let receiver_metrics = receiver.metrics();
    let exit = tokio::task::spawn_blocking(move || receiver.join())
        .await
        .map_err(|e| CliError::worker_join(e.to_string()))?;
    let exit = match exit {
        Ok(exit) => {
            info!(exit = ?exit, "Receiver finished");
            Some(exit)
        }
        Err(e) => {
            warn!(error = %e, "Receiver failed");
            None
        }
    };

    stop_sinks(&dispatcher).await?;

    let stats = ReceiveStats {
        duration: started.elapsed(),
        exit,
        receiver: receiver_metrics,
        sinks: dispatcher
            .metrics()
            .into_iter()
            .map(|(name, metrics)| SinkSummary {
                latest: dispatcher.latest_values(&name).map(|view| view.snapshot()),
                name,
                metrics,
            })
            .collect(),
    };
    stats.print_summary();

    Ok(())
}

/// Stop every sink worker and wait for them off the async runtime
async fn stop_sinks(dispatcher: &Arc<IngestionDispatcher>) -> Result<()> {
    dispatcher.stop_all();
    let dispatcher = Arc::clone(dispatcher);
    tokio::task::spawn_blocking(move || dispatcher.join_all())
        .await
        .map_err(|e| CliError::worker_join(e.to_string()))?
        .context("Sink worker failed")
}
