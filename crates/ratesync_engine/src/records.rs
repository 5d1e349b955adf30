//! JSON values kept under `result-<batchId>-<index>` keys.

use ratesync_core::{OutcomeTag, RecordLookup, ResultRecord};
use ratesync_logging::sync_warn;
use serde::{Deserialize, Serialize};

use crate::store::{ResultStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    Processing,
}

/// Written by the detail page before it hands off to the remote site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMarker {
    pub status: MarkerStatus,
    pub movie_id: String,
    pub imdb_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub success: bool,
    pub result: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Processing(ProcessingMarker),
    Outcome(OutcomeRecord),
}

impl StoredRecord {
    pub fn outcome(tag: &OutcomeTag, now_ms: u64) -> Self {
        StoredRecord::Outcome(OutcomeRecord {
            success: tag.is_success(),
            result: tag.as_str().to_string(),
            timestamp: now_ms,
        })
    }

    pub fn processing(movie_id: &str, imdb_id: &str, now_ms: u64) -> Self {
        StoredRecord::Processing(ProcessingMarker {
            status: MarkerStatus::Processing,
            movie_id: movie_id.to_string(),
            imdb_id: imdb_id.to_string(),
            timestamp: now_ms,
        })
    }
}

pub fn write_record(
    store: &dyn ResultStore,
    key: &str,
    record: &StoredRecord,
) -> Result<(), StoreError> {
    let value = serde_json::to_string(record)?;
    store.put(key, &value)
}

/// Reads the value under `key` for the orchestrator.
///
/// A store that cannot be read counts as "no record yet"; a value that cannot be decoded is
/// reported so the item fails instead of waiting for the timeout.
pub fn lookup(store: &dyn ResultStore, key: &str) -> RecordLookup {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return RecordLookup::Missing,
        Err(err) => {
            sync_warn!("result store read failed for {key}: {err}");
            return RecordLookup::Missing;
        }
    };
    match serde_json::from_str::<StoredRecord>(&raw) {
        Ok(StoredRecord::Processing(_)) => RecordLookup::Processing,
        Ok(StoredRecord::Outcome(record)) => RecordLookup::Found(ResultRecord {
            success: record.success,
            result: OutcomeTag::from(record.result.as_str()),
            timestamp_ms: record.timestamp,
        }),
        Err(err) => {
            sync_warn!("unreadable result under {key}: {err}");
            RecordLookup::Unreadable(err.to_string())
        }
    }
}
