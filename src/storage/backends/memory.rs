//! In-memory document store with ordered range scans.

use crate::storage::{
    RangeStore, RawRecord, ScanPage, ScanRequest, StoreError, json_values_equal, lookup_path,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON documents grouped by collection path.
///
/// Documents without a string value at the scan's `order_by` path are invisible to
/// that scan, matching how ordered queries skip records missing the ordering field.
///
/// ```rust
/// use mapquery::storage::{MemoryStore, RangeStore, ScanRequest};
/// use serde_json::json;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// store.insert("restaurants", "r1", json!({"geoHash": "9q5ctr", "name": "A"}));
/// store.insert("restaurants", "r2", json!({"geoHash": "dr5reg", "name": "B"}));
///
/// let page = store
///     .scan(&ScanRequest {
///         collection: "restaurants".into(),
///         order_by: "geoHash".into(),
///         start_key: "9q5c".into(),
///         end_key: "9q5d".into(),
///         equality: Vec::new(),
///         limit: 0,
///         start_after: None,
///     })
///     .await
///     .unwrap();
/// assert_eq!(page.records.len(), 1);
/// assert_eq!(page.records[0].id, "r1");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<FxHashMap<String, BTreeMap<String, serde_json::Value>>>,
    scans: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub fn insert(&self, collection: &str, id: &str, document: serde_json::Value) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    /// Serialize and insert a typed document.
    pub fn insert_document<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        document: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(document)?;
        self.insert(collection, id, value);
        Ok(())
    }

    pub fn remove(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.collections.read().values().all(BTreeMap::is_empty)
    }

    /// Scans served so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    fn matches_equality(document: &serde_json::Value, request: &ScanRequest) -> bool {
        request.equality.iter().all(|filter| {
            lookup_path(document, &filter.field).is_some_and(|value| {
                filter
                    .values
                    .iter()
                    .any(|accepted| json_values_equal(value, accepted))
            })
        })
    }
}

#[async_trait]
impl RangeStore for MemoryStore {
    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError> {
        if request.start_key > request.end_key {
            return Err(StoreError::InvalidRequest(format!(
                "start key {} sorts after end key {}",
                request.start_key, request.end_key
            )));
        }
        self.scans.fetch_add(1, Ordering::Relaxed);

        let collections = self.collections.read();
        let Some(documents) = collections.get(&request.collection) else {
            return Ok(ScanPage::default());
        };

        let mut records: Vec<RawRecord> = documents
            .iter()
            .filter_map(|(id, document)| {
                let key = lookup_path(document, &request.order_by)?.as_str()?;
                let in_range =
                    request.start_key.as_str() <= key && key <= request.end_key.as_str();
                let after_cursor = request
                    .start_after
                    .as_ref()
                    .is_none_or(|c| (key, id.as_str()) > (c.key.as_str(), c.id.as_str()));
                (in_range && after_cursor && Self::matches_equality(document, request)).then(
                    || RawRecord {
                        id: id.clone(),
                        key: key.to_string(),
                        document: document.clone(),
                    },
                )
            })
            .collect();

        records.sort_by(|a, b| (&a.key, &a.id).cmp(&(&b.key, &b.id)));
        if request.limit > 0 {
            records.truncate(request.limit);
        }

        Ok(ScanPage::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EqualityFilter, StoreCursor};
    use serde_json::json;

    fn request(start: &str, end: &str) -> ScanRequest {
        ScanRequest {
            collection: "clusters".into(),
            order_by: "geoHash".into(),
            start_key: start.into(),
            end_key: end.into(),
            equality: Vec::new(),
            limit: 0,
            start_after: None,
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("clusters", "c3", json!({"geoHash": "9q5c3", "zoomLevel": "city"}));
        store.insert("clusters", "c1", json!({"geoHash": "9q5c1", "zoomLevel": "city"}));
        store.insert("clusters", "c2", json!({"geoHash": "9q5c2", "zoomLevel": "region"}));
        store.insert("clusters", "c4", json!({"geoHash": "9q5d0", "zoomLevel": "city"}));
        store.insert("clusters", "c5", json!({"zoomLevel": "city"}));
        store
    }

    fn ids(page: &ScanPage) -> Vec<&str> {
        page.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_scan_is_ordered_and_inclusive() {
        let store = seeded();
        let page = store.scan(&request("9q5c1", "9q5c3")).await.unwrap();
        assert_eq!(ids(&page), vec!["c1", "c2", "c3"]);
        assert_eq!(page.last.unwrap().id, "c3");
    }

    #[tokio::test]
    async fn test_scan_applies_equality() {
        let store = seeded();
        let mut req = request("9q5c", "9q5d~");
        req.equality.push(EqualityFilter::equals("zoomLevel", "city"));
        let page = store.scan(&req).await.unwrap();
        assert_eq!(ids(&page), vec!["c1", "c3", "c4"]);
    }

    #[tokio::test]
    async fn test_scan_resumes_after_cursor() {
        let store = seeded();
        let mut req = request("9q5c", "9q5d~");
        req.limit = 2;
        let first = store.scan(&req).await.unwrap();
        assert_eq!(ids(&first), vec!["c1", "c2"]);

        req.start_after = first.last.clone();
        let second = store.scan(&req).await.unwrap();
        assert_eq!(ids(&second), vec!["c3", "c4"]);

        req.start_after = Some(StoreCursor {
            key: "9q5d0".into(),
            id: "c4".into(),
        });
        assert!(store.scan(&req).await.unwrap().records.is_empty());
        assert_eq!(store.scan_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = MemoryStore::new();
        let page = store.scan(&request("0", "~")).await.unwrap();
        assert!(page.records.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let store = seeded();
        assert!(matches!(
            store.scan(&request("9q5d", "9q5c")).await,
            Err(StoreError::InvalidRequest(_))
        ));
    }
}
