// 🗂️ Record Store - "Already processed" ledger for applied price changes
//
// The real store lives outside this crate (remote record service). The
// engines only need a keyed read and a keyed write, and treat both as
// best-effort: a store failure is logged, never fatal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordStoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Idempotency key for one (identifier, price) change
///
/// Same identifier at the same normalized price always hashes the same, so
/// "12.5" and "12.50" are one change.
pub fn processed_key(external_id: &str, price: Decimal) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", external_id.trim(), price.normalize()));
    format!("{:x}", hasher.finalize())
}

/// One applied change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub record_id: String,
    pub key: String,
    pub external_id: String,
    pub price: Decimal,
    pub updated_count: usize,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedRecord {
    pub fn new(external_id: &str, price: Decimal, updated_count: usize) -> Self {
        Self {
            record_id: uuid::Uuid::new_v4().to_string(),
            key: processed_key(external_id, price),
            external_id: external_id.to_string(),
            price,
            updated_count,
            processed_at: Utc::now(),
        }
    }
}

pub trait RecordStore: Send + Sync {
    fn is_processed(&self, key: &str) -> Result<bool, RecordStoreError>;

    fn record_processed(&self, record: ProcessedRecord) -> Result<(), RecordStoreError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, ProcessedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<ProcessedRecord> {
        self.records.lock().ok()?.get(key).cloned()
    }
}

impl RecordStore for MemoryRecordStore {
    fn is_processed(&self, key: &str) -> Result<bool, RecordStoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| RecordStoreError::Unavailable(e.to_string()))?;
        Ok(records.contains_key(key))
    }

    fn record_processed(&self, record: ProcessedRecord) -> Result<(), RecordStoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| RecordStoreError::Unavailable(e.to_string()))?;
        records.insert(record.key.clone(), record);
        Ok(())
    }
}
