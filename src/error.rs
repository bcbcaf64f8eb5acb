//! Error types for mapquery.
//!
//! Only [`MapQueryError`] ever reaches a caller. [`BoundQueryError`] and
//! [`DecodeError`] are absorbed where they happen (one bound, one record) and
//! show up as counters on the fetch result instead.

use crate::query::EntityKind;
use crate::storage::StoreError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MapQueryError>;

#[derive(Debug, Error)]
pub enum MapQueryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid geohash: {0}")]
    InvalidGeohash(String),

    #[error("All {bounds} range scans failed; last error: {last_error}")]
    AllBoundsFailed {
        bounds: usize,
        last_error: BoundQueryError,
    },

    #[error("Strict decoding rejected a record: {0}")]
    Decode(#[from] DecodeError),

    #[error("Fetch generation {generation} superseded by {latest}; results discarded")]
    Superseded { generation: u64, latest: u64 },

    #[error("No viewport has been fetched yet for {0}")]
    NoActiveQuery(EntityKind),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MapQueryError {
    fn from(err: serde_json::Error) -> Self {
        MapQueryError::Serialization(err.to_string())
    }
}

/// Failure of a single bound's range scan.
#[derive(Debug, Clone, Error)]
pub enum BoundQueryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("scan timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("scan task aborted: {0}")]
    Join(String),
}

/// A stored record that could not be turned into an entity.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("record {record_id} in {collection}: {reason}")]
pub struct DecodeError {
    pub collection: String,
    pub record_id: String,
    pub reason: String,
}
