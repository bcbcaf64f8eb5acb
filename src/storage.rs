//! The ordered range-scan contract the engine needs from a backing store.
//!
//! Any document store that can order a collection by a string field and return a
//! slice of it between two keys can back the engine. Implementations only need
//! [`RangeStore::scan`]; everything else (fan-out, decoding, filtering) happens above.
//!
//! Scans are resumable: each page reports the last record it returned as a
//! [`StoreCursor`], and passing that cursor back as `start_after` continues strictly
//! after it in (key, id) order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod backends;

pub use backends::MemoryStore;

/// Failure reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),
}

/// Field equality (one value) or membership (several) the store evaluates natively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualityFilter {
    /// Dotted document path, e.g. `user.id`.
    pub field: String,
    pub values: Vec<serde_json::Value>,
}

impl EqualityFilter {
    pub fn new(field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(field, vec![value.into()])
    }
}

/// Position of the last record consumed from a scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreCursor {
    pub key: String,
    pub id: String,
}

/// One range scan over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub collection: String,
    /// Dotted path of the geohash field the collection is ordered by.
    pub order_by: String,
    /// Inclusive.
    pub start_key: String,
    /// Inclusive.
    pub end_key: String,
    pub equality: Vec<EqualityFilter>,
    /// Maximum records to return; zero means no limit.
    pub limit: usize,
    pub start_after: Option<StoreCursor>,
}

/// A record as stored, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    /// Value of the ordering field.
    pub key: String,
    pub document: serde_json::Value,
}

impl RawRecord {
    pub fn cursor(&self) -> StoreCursor {
        StoreCursor {
            key: self.key.clone(),
            id: self.id.clone(),
        }
    }
}

/// Records returned by one scan, in (key, id) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub records: Vec<RawRecord>,
    pub last: Option<StoreCursor>,
}

impl ScanPage {
    pub fn new(records: Vec<RawRecord>) -> Self {
        let last = records.last().map(RawRecord::cursor);
        Self { records, last }
    }
}

#[async_trait]
pub trait RangeStore: Send + Sync {
    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError>;
}

/// Look up a dotted path such as `restaurant.geoHash` in a JSON document.
pub fn lookup_path<'a>(document: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

/// JSON equality that treats `5`, `5.0` and `5u64` as the same number.
pub fn json_values_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
