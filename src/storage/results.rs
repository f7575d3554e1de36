//! Result history persisted as one JSON blob
//!
//! Every operation reads the whole list, changes it and writes it back.
//! There is no locking: concurrent writers race and the last write wins.

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use super::settings::KeyValueStore;
use crate::classifier::ResultRecord;

/// Errors raised by the result store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored result history is malformed: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("failed to serialize result history: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("stored result {id} is invalid: {reason}")]
    InvalidStoredRecord { id: String, reason: String },
    #[error("refusing to save result {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
    #[error("settings storage failed: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Ordered, newest-first list of result records
pub struct ResultStore<S> {
    settings: S,
    key: String,
}

impl<S: KeyValueStore> ResultStore<S> {
    /// Create a store under the default history key
    pub fn new(settings: S) -> Self {
        Self::with_key(settings, super::DEFAULT_HISTORY_KEY)
    }

    /// Create a store under a custom history key
    pub fn with_key(settings: S, key: impl Into<String>) -> Self {
        Self {
            settings,
            key: key.into(),
        }
    }

    /// Prepend `record` to the history.
    ///
    /// A stored record with the same id is replaced, keeping ids unique.
    /// Records that could not be read back (non-finite or out-of-range
    /// values, empty score vector) are refused before anything is written.
    pub fn save(&self, record: ResultRecord) -> Result<(), StoreError> {
        record
            .validate()
            .map_err(|reason| StoreError::InvalidRecord {
                id: record.id.clone(),
                reason,
            })?;

        let mut records = self.list()?;
        records.retain(|r| r.id != record.id);

        info!("Saving result {} ({})", record.id, record.prediction);
        records.insert(0, record);
        self.write(&records)
    }

    /// All records, newest first. Empty when nothing was saved yet
    pub fn list(&self) -> Result<Vec<ResultRecord>, StoreError> {
        let records: Vec<ResultRecord> = match self.settings.get_string(&self.key)? {
            Some(blob) => serde_json::from_str(&blob).map_err(StoreError::Deserialization)?,
            None => return Ok(Vec::new()),
        };

        check_stored(&records)?;

        Ok(records)
    }

    /// Find a record by id
    pub fn get(&self, id: &str) -> Result<Option<ResultRecord>, StoreError> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Number of stored records
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove the record with `id`. Unknown ids are ignored
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            debug!("No stored result with id {}", id);
            return Ok(());
        }

        info!("Deleted result {}", id);
        self.write(&records)
    }

    /// Remove the whole history
    pub fn clear(&self) -> Result<(), StoreError> {
        info!("Clearing result history");
        self.settings.remove(&self.key)?;
        Ok(())
    }

    fn write(&self, records: &[ResultRecord]) -> Result<(), StoreError> {
        let blob = serde_json::to_string(records).map_err(StoreError::Serialization)?;
        self.settings.set_string(&self.key, &blob)?;
        Ok(())
    }
}

fn check_stored(records: &[ResultRecord]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        record
            .validate()
            .map_err(|reason| StoreError::InvalidStoredRecord {
                id: record.id.clone(),
                reason,
            })?;
        if !seen.insert(record.id.as_str()) {
            return Err(StoreError::InvalidStoredRecord {
                id: record.id.clone(),
                reason: "duplicate id".to_string(),
            });
        }
    }
    Ok(())
}
