//! Concurrent fan-out of range scans.
//!
//! Every bound of a fetch becomes one task on a [`JoinSet`]. A shared semaphore caps
//! how many scans hit the store at once and each scan runs under its own timeout, so
//! one slow range cannot hold up the rest indefinitely. Tasks return their pages as
//! values; nothing is shared between them. The caller gets every outcome back, in
//! request order, once all tasks have finished.

use crate::codec::{self, RecordClass};
use crate::config::{DecodeMode, EngineConfig};
use crate::error::BoundQueryError;
use crate::storage::{RangeStore, ScanRequest, StoreCursor};
use mapquery_types::Entity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One scan to run, and how to decode what it returns.
#[derive(Debug, Clone)]
pub struct BoundRequest {
    pub class: RecordClass,
    pub scan: ScanRequest,
}

/// What a successful scan produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundPage {
    pub entities: Vec<Entity>,
    /// Last raw record returned, decodable or not.
    pub last: Option<StoreCursor>,
    pub examined: usize,
    pub skipped: usize,
    /// A full page came back, so the range may hold more.
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct BoundOutcome {
    pub index: usize,
    pub result: Result<BoundPage, BoundQueryError>,
}

impl BoundOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Issues one scan per bound against a shared store.
#[derive(Clone)]
pub struct RangeQueryExecutor {
    store: Arc<dyn RangeStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    decode_mode: DecodeMode,
}

impl RangeQueryExecutor {
    pub fn new(store: Arc<dyn RangeStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(config.max_concurrent_scans)),
            timeout: config.bound_timeout(),
            decode_mode: config.decode_mode,
        }
    }

    pub fn decode_mode(&self) -> DecodeMode {
        self.decode_mode
    }

    /// Run all requests concurrently and wait for every one of them.
    ///
    /// Outcomes are returned in request order. A failed scan shows up as an `Err`
    /// outcome; it never cancels the others.
    pub async fn execute(&self, requests: Vec<BoundRequest>) -> Vec<BoundOutcome> {
        let total = requests.len();
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let permits = Arc::clone(&self.permits);
            let timeout = self.timeout;
            let mode = self.decode_mode;

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => scan_bound(store.as_ref(), &request, timeout, mode).await,
                    Err(e) => Err(BoundQueryError::Join(e.to_string())),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<BoundPage, BoundQueryError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(join_err) => log::error!("range scan task failed to complete: {}", join_err),
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| BoundOutcome {
                index,
                result: result.unwrap_or_else(|| {
                    Err(BoundQueryError::Join("scan task did not complete".to_string()))
                }),
            })
            .collect()
    }
}

async fn scan_bound(
    store: &dyn RangeStore,
    request: &BoundRequest,
    timeout: Duration,
    mode: DecodeMode,
) -> Result<BoundPage, BoundQueryError> {
    let scan = &request.scan;
    let page = match tokio::time::timeout(timeout, store.scan(scan)).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            log::warn!(
                "scan of {} [{}, {}] failed: {}",
                scan.collection,
                scan.start_key,
                scan.end_key,
                e
            );
            return Err(e.into());
        }
        Err(_) => {
            log::warn!(
                "scan of {} [{}, {}] timed out after {:?}",
                scan.collection,
                scan.start_key,
                scan.end_key,
                timeout
            );
            return Err(BoundQueryError::Timeout(timeout));
        }
    };

    let examined = page.records.len();
    let mut entities = Vec::with_capacity(examined);
    let mut skipped = 0;
    for record in &page.records {
        match codec::decode(request.class, &scan.collection, record) {
            Ok(entity) => entities.push(entity),
            Err(e) if mode == DecodeMode::Strict => return Err(e.into()),
            Err(e) => {
                log::warn!("skipping undecodable {}", e);
                skipped += 1;
            }
        }
    }

    log::debug!(
        "scan of {} [{}, {}]: {} examined, {} decoded, {} skipped",
        scan.collection,
        scan.start_key,
        scan.end_key,
        examined,
        entities.len(),
        skipped
    );

    Ok(BoundPage {
        entities,
        last: page.last,
        examined,
        skipped,
        has_more: scan.limit > 0 && examined >= scan.limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ScanPage, StoreError};
    use async_trait::async_trait;
    use serde_json::json;

    fn restaurant(id: &str, hash: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": id,
            "geoHash": hash,
            "geoPoint": {"latitude": 34.05, "longitude": -118.24}
        })
    }

    fn request(start: &str, end: &str, limit: usize) -> BoundRequest {
        BoundRequest {
            class: RecordClass::Restaurant,
            scan: ScanRequest {
                collection: "restaurants".into(),
                order_by: "geoHash".into(),
                start_key: start.into(),
                end_key: end.into(),
                equality: Vec::new(),
                limit,
                start_after: None,
            },
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert("restaurants", "a", restaurant("a", "9q5c1"));
        store.insert("restaurants", "b", restaurant("b", "9q5c2"));
        store.insert("restaurants", "bad", json!({"id": "bad", "geoHash": "9q5c3"}));
        store.insert("restaurants", "c", restaurant("c", "9q5d1"));
        Arc::new(store)
    }

    struct FailingStore;

    #[async_trait]
    impl RangeStore for FailingStore {
        async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError> {
            Err(StoreError::Unavailable(request.start_key.clone()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl RangeStore for SlowStore {
        async fn scan(&self, _request: &ScanRequest) -> Result<ScanPage, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ScanPage::default())
        }
    }

    #[tokio::test]
    async fn test_lenient_mode_skips_bad_records() {
        let executor = RangeQueryExecutor::new(store(), &EngineConfig::default());
        let outcomes = executor
            .execute(vec![request("9q5c", "9q5d", 0), request("9q5d", "9q5e", 0)])
            .await;
        assert_eq!(outcomes.len(), 2);

        let first = outcomes[0].result.as_ref().unwrap();
        assert_eq!(first.examined, 3);
        assert_eq!(first.skipped, 1);
        assert_eq!(first.entities.len(), 2);
        assert_eq!(first.last.as_ref().unwrap().id, "bad");

        let second = outcomes[1].result.as_ref().unwrap();
        assert_eq!(second.entities[0].id(), "c");
    }

    #[tokio::test]
    async fn test_strict_mode_fails_the_bound() {
        let config = EngineConfig::default().with_decode_mode(DecodeMode::Strict);
        let executor = RangeQueryExecutor::new(store(), &config);
        let outcomes = executor.execute(vec![request("9q5c", "9q5d", 0)]).await;
        assert!(matches!(
            outcomes[0].result,
            Err(BoundQueryError::Decode(ref e)) if e.record_id == "bad"
        ));
    }

    #[tokio::test]
    async fn test_full_page_reports_more() {
        let executor = RangeQueryExecutor::new(store(), &EngineConfig::default());
        let outcomes = executor
            .execute(vec![request("9q5c", "9q5d", 2), request("9q5d", "9q5e", 2)])
            .await;
        assert!(outcomes[0].result.as_ref().unwrap().has_more);
        assert!(!outcomes[1].result.as_ref().unwrap().has_more);
    }

    #[tokio::test]
    async fn test_store_failure_is_per_bound() {
        let executor = RangeQueryExecutor::new(Arc::new(FailingStore), &EngineConfig::default());
        let outcomes = executor
            .execute(vec![request("9q5c", "9q5d", 0), request("9q5d", "9q5e", 0)])
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_ok()));
        assert_eq!(outcomes[1].index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_scan_times_out() {
        let config = EngineConfig::default().with_bound_timeout(Duration::from_millis(100));
        let executor = RangeQueryExecutor::new(Arc::new(SlowStore), &config);
        let outcomes = executor.execute(vec![request("0", "~", 0)]).await;
        assert!(matches!(outcomes[0].result, Err(BoundQueryError::Timeout(_))));
    }
}
