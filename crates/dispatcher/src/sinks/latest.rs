//! LatestValueSink - keeps the most recent record per address

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use contracts::{Address, ContractError, Record, RecordSink};
use tracing::{debug, instrument};

/// Shared, cloneable read view of a [`LatestValueSink`]
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    inner: Arc<RwLock<HashMap<Address, Record>>>,
}

impl LatestValues {
    /// Latest record seen for `address`
    pub fn get(&self, address: Address) -> Option<Record> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All latest records, ordered by address
    pub fn snapshot(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by_key(Record::address);
        records
    }

    fn insert(&self, record: Record) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.address(), record);
    }
}

/// Key-value sink: each persist overwrites the entry for the record's address
pub struct LatestValueSink {
    name: String,
    values: LatestValues,
    /// Optional JSON dump of the table, written on flush
    snapshot_path: Option<PathBuf>,
}

impl LatestValueSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: LatestValues::default(),
            snapshot_path: None,
        }
    }

    /// Create from params map (`snapshot_path` is optional)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let mut sink = Self::new(name);
        sink.snapshot_path = params.get("snapshot_path").map(PathBuf::from);
        sink
    }

    /// Read view that stays valid after the sink moves into its worker
    pub fn values(&self) -> LatestValues {
        self.values.clone()
    }
}

impl RecordSink for LatestValueSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(
        name = "latest_sink_persist",
        skip(self, record),
        fields(sink = %self.name, address = record.address())
    )]
    async fn persist(&mut self, record: &Record) -> Result<(), ContractError> {
        self.values.insert(record.clone());
        Ok(())
    }

    #[instrument(name = "latest_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.values.snapshot())
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, path = %path.display(), "Snapshot written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, entries = self.values.len(), "LatestValueSink closed");
        Ok(())
    }
}
