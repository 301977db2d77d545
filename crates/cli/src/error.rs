//! Failures the `telemetry-bridge` binary reports on its own.
//!
//! Everything else (loader, server, receiver, sinks) arrives wrapped in
//! `anyhow::Error` with context attached by the command.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// `--config` points at nothing
    #[error("no telemetry configuration at {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// The file was valid, but a command-line override made it invalid
    #[error("telemetry configuration rejected after overrides: {message}")]
    ConfigValidation { message: String },

    /// A worker thread could not be joined from the async side
    #[error("worker did not wind down: {message}")]
    WorkerJoin { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    pub fn worker_join(message: impl Into<String>) -> Self {
        Self::WorkerJoin {
            message: message.into(),
        }
    }
}
