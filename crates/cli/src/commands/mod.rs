//! Command implementations.

mod info;
mod receive;
mod serve;
mod validate;

pub use info::run_info;
pub use receive::run_receive;
pub use serve::run_serve;
pub use validate::run_validate;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use contracts::TelemetryBlueprint;
use tracing::info;

use crate::error::CliError;

/// Load the blueprint from `path`, or fall back to defaults when no path is given
fn load_blueprint(path: Option<&Path>) -> Result<TelemetryBlueprint> {
    let Some(path) = path else {
        info!("No configuration file given, using defaults");
        return Ok(TelemetryBlueprint::default());
    };

    info!(config = %path.display(), "Loading configuration");
    if !path.exists() {
        return Err(CliError::config_not_found(path).into());
    }

    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Re-check the blueprint once CLI overrides are in place
fn revalidate(blueprint: &TelemetryBlueprint) -> Result<()> {
    config_loader::ConfigLoader::validate(blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()).into())
}

/// `0` means "no timeout"
fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Install the Prometheus exporter when a port is requested
fn init_metrics(port: u16) -> Result<()> {
    if port > 0 {
        observability::init_metrics_only(port)?;
    }
    Ok(())
}
