//! FileSink - appends records to a JSON-lines table

use std::collections::HashMap;
use std::path::PathBuf;

use contracts::{ContractError, Record, RecordSink};
use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file, created if missing and appended to otherwise
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// # Errors
    /// The `path` param is required.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ContractError> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                ContractError::config_validation("params.path", "file sink requires a path")
            })?;

        Ok(Self { path })
    }
}

/// One row of the table: integer / string / integer columns
#[derive(Serialize)]
struct Row<'a> {
    iec: u32,
    value: &'a str,
    timestamp: i64,
}

/// Sink that appends one JSON line per record
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink; the file is opened by `open()`
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            writer: None,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let config = FileSinkConfig::from_params(params)?;
        Ok(Self::new(name, config))
    }

    fn write_error(&self, e: impl std::fmt::Display) -> ContractError {
        ContractError::sink_write(&self.name, e.to_string())
    }
}

impl RecordSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_open", skip(self), fields(sink = %self.name))]
    async fn open(&mut self) -> Result<(), ContractError> {
        if let Some(parent) = self.config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await
            .map_err(|e| ContractError::sink_connection(&self.name, e.to_string()))?;
        self.writer = Some(BufWriter::new(file));

        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink opened");
        Ok(())
    }

    #[instrument(
        name = "file_sink_persist",
        skip(self, record),
        fields(sink = %self.name, address = record.address())
    )]
    async fn persist(&mut self, record: &Record) -> Result<(), ContractError> {
        let row = Row {
            iec: record.address(),
            value: record.value(),
            timestamp: record.timestamp(),
        };
        let mut line = serde_json::to_vec(&row).map_err(|e| self.write_error(e))?;
        line.push(b'\n');

        let Some(writer) = self.writer.as_mut() else {
            return Err(self.write_error("sink is not open"));
        };
        if let Err(e) = writer.write_all(&line).await {
            return Err(self.write_error(e));
        }
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush().await {
                return Err(self.write_error(e));
            }
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.map_err(|e| self.write_error(e))?;
        }
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
