//! The viewport query engine.
//!
//! [`MapQueryEngine`] holds what every map surface shares: the store, the session,
//! the configuration and the stateless pipeline stages. [`MapSurface`] holds one
//! map's viewport state (anchor, fetch generations, cursors) and runs fetches:
//!
//! 1. pick what to fetch for the zoom level (nothing, clusters, points, or points
//!    plus neighborhood clusters)
//! 2. compile the query circle into geohash bounds
//! 3. scan every bound of every lane concurrently
//! 4. merge by id, filter, optionally cut to the exact circle
//! 5. commit cursors, unless a newer fetch for the same kind started meanwhile
//!
//! Surface state is only locked before the fan-out and after the fan-in, never
//! across an await.
//!
//! ```rust
//! use mapquery::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.insert("restaurants", "r1", json!({
//!     "id": "r1",
//!     "name": "Sushi Gen",
//!     "categoryName": "Japanese",
//!     "geoHash": "9q5ctmvrb",
//!     "geoPoint": {"latitude": 34.0466, "longitude": -118.2386}
//! }));
//!
//! let engine = MapQueryEngine::builder().store(store).build().unwrap();
//! let surface = engine.mount_surface();
//!
//! let query = ViewportQuery::new(EntityKind::Restaurant, Point::new(-118.24, 34.05), 800.0)
//!     .zoom(ZoomLevel::Neighborhood)
//!     .filter("cuisine", ["Japanese"]);
//! let result = surface.fetch_viewport(query).await.unwrap();
//! assert_eq!(result.points.len(), 1);
//! # });
//! ```

use crate::builder::EngineBuilder;
use crate::codec::RecordClass;
use crate::compute::filter::{FilterPlan, FilterSignature, apply_filters, retain_within_radius};
use crate::compute::geohash_range::GeohashRangeCompiler;
use crate::compute::merge::ResultMerger;
use crate::compute::throttle::{
    MapSize, ViewportAnchor, ViewportChangeThrottler, radius_for_span,
};
use crate::compute::validation::{validate_geographic_point, validate_radius, validate_span};
use crate::compute::zoom::{ClusterAggregationSelector, ZoomState, zoom_for_span};
use crate::config::EngineConfig;
use crate::cursor::{CursorSet, Lane, LaneCursor, PaginationCursorManager};
use crate::error::{BoundQueryError, MapQueryError, Result};
use crate::executor::{BoundOutcome, BoundRequest, RangeQueryExecutor};
use crate::query::{EntityKind, FetchDecision, FetchResult, FetchStats, ViewportQuery};
use crate::session::SessionProvider;
use crate::storage::{EqualityFilter, RangeStore, ScanRequest};
use geo::Point;
use mapquery_types::{ClusterRecord, Entity, PointOfInterest, ViewportSpan};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared services behind every map surface. Cheap to clone.
#[derive(Clone)]
pub struct MapQueryEngine {
    pub(crate) inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub config: EngineConfig,
    pub session: Arc<dyn SessionProvider>,
    pub executor: RangeQueryExecutor,
    pub compiler: GeohashRangeCompiler,
    pub selector: ClusterAggregationSelector,
    pub throttler: ViewportChangeThrottler,
}

impl EngineInner {
    pub(crate) fn new(
        store: Arc<dyn RangeStore>,
        session: Arc<dyn SessionProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor: RangeQueryExecutor::new(store, &config),
            compiler: GeohashRangeCompiler::new(config.max_bounds),
            selector: ClusterAggregationSelector::new(config.hybrid.clone()),
            throttler: ViewportChangeThrottler::new(config.metric),
            session,
            config,
        }
    }
}

impl MapQueryEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start tracking a new map view. Its state is dropped with the last clone.
    pub fn mount_surface(&self) -> MapSurface {
        MapSurface {
            engine: self.clone(),
            state: Arc::new(Mutex::new(ViewportState::default())),
        }
    }
}

#[derive(Debug, Default)]
struct ViewportState {
    anchor: Option<ViewportAnchor>,
    map_size: MapSize,
    /// Latest fetch generation handed out per kind.
    generations: FxHashMap<EntityKind, u64>,
    /// Generation of the fetch currently running per kind.
    in_flight: FxHashMap<EntityKind, u64>,
    /// Last query committed per kind, for "load more". Follows the anchor.
    last_queries: FxHashMap<EntityKind, ViewportQuery>,
    cursors: PaginationCursorManager,
}

impl ViewportState {
    fn bump(&mut self, kind: EntityKind) -> u64 {
        let generation = self.generations.entry(kind).or_insert(0);
        *generation += 1;
        *generation
    }

    fn latest(&self, kind: EntityKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or(0)
    }

    fn ensure_current(&self, kind: EntityKind, generation: u64) -> Result<()> {
        let latest = self.latest(kind);
        if generation == latest {
            return Ok(());
        }
        log::warn!(
            "discarding {} fetch generation {}: generation {} started since",
            kind,
            generation,
            latest
        );
        Err(MapQueryError::Superseded { generation, latest })
    }
}

/// Clears the in-flight marker when a fetch finishes, fails or is dropped.
struct InFlight<'a> {
    state: &'a Mutex<ViewportState>,
    kind: EntityKind,
    generation: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.in_flight.get(&self.kind) == Some(&self.generation) {
            state.in_flight.remove(&self.kind);
        }
    }
}

/// Where one lane's scans go.
#[derive(Debug, Clone)]
struct LanePlan {
    lane: Lane,
    class: RecordClass,
    collection: String,
    order_by: String,
    equality: Vec<EqualityFilter>,
}

#[derive(Debug, Clone)]
struct FetchPlan {
    query: ViewportQuery,
    signature: FilterSignature,
    zoom_state: ZoomState,
    filters: FilterPlan,
    lanes: Vec<LanePlan>,
    page_size: usize,
    strict_radius: bool,
}

impl FetchPlan {
    fn lane(&self, lane: Lane) -> Option<&LanePlan> {
        self.lanes.iter().find(|l| l.lane == lane)
    }
}

enum Prepared {
    /// Nothing to scan; hand this back as is.
    Skip(FetchResult),
    Ready(Box<FetchPlan>),
}

/// Fan-in output, before it is committed.
struct Assembled {
    points: Vec<PointOfInterest>,
    clusters: Vec<ClusterRecord>,
    lanes: Vec<LaneCursor>,
    /// Members of the hybrid clusters in this page.
    absorbed: BTreeSet<String>,
    stats: FetchStats,
}

fn record_class(kind: EntityKind, lane: Lane) -> RecordClass {
    match (kind, lane) {
        (EntityKind::Restaurant, Lane::Points) => RecordClass::Restaurant,
        (EntityKind::Restaurant, Lane::Clusters) => RecordClass::RestaurantCluster,
        (_, Lane::Points) => RecordClass::Post,
        (_, Lane::Clusters) => RecordClass::PostCluster,
    }
}

/// One map view's fetch state. Clones share the same state.
#[derive(Clone)]
pub struct MapSurface {
    engine: MapQueryEngine,
    state: Arc<Mutex<ViewportState>>,
}

impl MapSurface {
    /// Set the on-screen map size used to turn spans into query radii.
    pub fn set_map_size(&self, map_size: MapSize) {
        self.state.lock().map_size = map_size;
    }

    /// The last viewport accepted by [`MapSurface::on_viewport_changed`].
    pub fn anchor(&self) -> Option<ViewportAnchor> {
        self.state.lock().anchor
    }

    pub fn is_fetching(&self, kind: EntityKind) -> bool {
        self.state.lock().in_flight.contains_key(&kind)
    }

    pub fn generation(&self, kind: EntityKind) -> u64 {
        self.state.lock().latest(kind)
    }

    /// Stored cursors for `kind`, if they match `signature`.
    pub fn cursors(&self, kind: EntityKind, signature: FilterSignature) -> Option<CursorSet> {
        self.state.lock().cursors.get(kind, signature).cloned()
    }

    /// Fetch page 1 for a viewport.
    ///
    /// Replaces any cursors stored for the query's kind. Fails with
    /// [`MapQueryError::Superseded`] if another fetch for the same kind, or an
    /// accepted viewport change, started while this one was scanning.
    pub async fn fetch_viewport(&self, query: ViewportQuery) -> Result<FetchResult> {
        let inner = &self.engine.inner;
        let plan = match self.prepare(query)? {
            Prepared::Skip(result) => return Ok(result),
            Prepared::Ready(plan) => plan,
        };
        let kind = plan.query.kind;

        let bounds = inner.compiler.compile(&plan.query.center, plan.query.radius_m)?;
        log::debug!(
            "{} fetch at ({}, {}) r={}m compiled to {} bounds across {} lanes",
            kind,
            plan.query.center.y(),
            plan.query.center.x(),
            plan.query.radius_m,
            bounds.len(),
            plan.lanes.len()
        );

        let lanes: Vec<LaneCursor> = plan
            .lanes
            .iter()
            .flat_map(|lane| bounds.iter().map(|b| LaneCursor::new(lane.lane, b.clone())))
            .collect();

        let guard = self.begin(kind);
        let assembled = self
            .scan(&plan, lanes, &BTreeSet::new(), guard.generation)
            .await?;

        let cursors = {
            let mut state = self.state.lock();
            state.ensure_current(kind, guard.generation)?;
            let cursors = CursorSet::new(kind, plan.signature, assembled.lanes)
                .with_absorbed(assembled.absorbed);
            state.cursors.replace(cursors.clone());
            state.last_queries.insert(kind, plan.query.clone());
            cursors
        };

        Ok(FetchResult {
            kind,
            zoom_state: plan.zoom_state,
            points: assembled.points,
            clusters: assembled.clusters,
            has_more: cursors.has_more(),
            signature: plan.signature,
            cursors,
            stats: assembled.stats,
        })
    }

    /// Fetch the next page of the last query for `kind`.
    ///
    /// If `signature` no longer matches the stored cursors (the filters changed, or
    /// a viewport change reset them) this is a fresh page-1 fetch of the last query.
    /// An accepted viewport change moves that query to the new anchor, so the
    /// fresh fetch covers the viewport now on screen.
    pub async fn fetch_more(
        &self,
        kind: EntityKind,
        signature: FilterSignature,
    ) -> Result<FetchResult> {
        let (query, cursors) = {
            let state = self.state.lock();
            let query = state
                .last_queries
                .get(&kind)
                .cloned()
                .ok_or(MapQueryError::NoActiveQuery(kind))?;
            let cursors = state.cursors.get(kind, signature).cloned();
            (query, cursors)
        };

        let cursors = match cursors {
            Some(cursors) if query.signature() == signature => cursors,
            _ => {
                log::info!(
                    "{} cursors for signature {} are gone; fetching page 1 again",
                    kind,
                    signature
                );
                return self.fetch_viewport(query).await;
            }
        };

        let plan = match self.prepare(query)? {
            Prepared::Skip(result) => return Ok(result),
            Prepared::Ready(plan) => plan,
        };

        if !cursors.has_more() {
            let mut result = FetchResult::empty(kind, plan.zoom_state, signature);
            result.stats.generation = self.generation(kind);
            result.cursors = cursors;
            return Ok(result);
        }

        let (indices, pending): (Vec<usize>, Vec<LaneCursor>) = cursors
            .pending()
            .map(|(index, lane)| (index, lane.clone()))
            .unzip();

        let guard = self.begin(kind);
        let assembled = self
            .scan(&plan, pending, &cursors.absorbed, guard.generation)
            .await?;

        let cursors = {
            let mut state = self.state.lock();
            state.ensure_current(kind, guard.generation)?;
            let updates = indices
                .into_iter()
                .zip(assembled.lanes)
                .map(|(index, lane)| (index, lane.after, lane.has_more));
            if !state.cursors.advance(kind, signature, updates, assembled.absorbed) {
                return Err(MapQueryError::Superseded {
                    generation: guard.generation,
                    latest: state.latest(kind),
                });
            }
            state
                .cursors
                .get(kind, signature)
                .cloned()
                .unwrap_or_else(|| CursorSet::empty(kind, signature))
        };

        Ok(FetchResult {
            kind,
            zoom_state: plan.zoom_state,
            points: assembled.points,
            clusters: assembled.clusters,
            has_more: cursors.has_more(),
            signature,
            cursors,
            stats: assembled.stats,
        })
    }

    /// Decide whether a map movement warrants a refetch.
    ///
    /// An accepted change becomes the new anchor, drops every stored cursor and
    /// supersedes any fetch still in flight on this surface.
    pub fn on_viewport_changed(&self, center: Point, span: ViewportSpan) -> Result<FetchDecision> {
        validate_geographic_point(&center)?;
        validate_span(&span)?;

        let inner = &self.engine.inner;
        let zoom = zoom_for_span(span.longitude_delta, &inner.config.zoom);
        let zoom_state = inner.selector.select(zoom);
        let next = ViewportAnchor { center, span, zoom };

        let mut state = self.state.lock();
        let radius_m = radius_for_span(&inner.config.radius, &span, state.map_size);
        let decision = inner.throttler.evaluate(state.anchor.as_ref(), &next);

        if decision.refetch {
            log::info!(
                "viewport change accepted ({:?}): zoom {}, radius {:.0}m",
                decision.reason,
                zoom,
                radius_m
            );
            state.anchor = Some(next);
            state.cursors.invalidate_all();
            for query in state.last_queries.values_mut() {
                query.center = center;
                query.zoom = zoom;
                query.radius_m = radius_m;
            }
            for kind in EntityKind::ALL {
                if state.in_flight.contains_key(&kind) {
                    log::debug!("superseding in-flight {} fetch", kind);
                }
                state.bump(kind);
            }
        } else {
            log::debug!(
                "viewport change ignored ({:?}): moved {:?}m, threshold {:.0}m",
                decision.reason,
                decision.moved_m,
                decision.threshold_m
            );
        }

        Ok(FetchDecision {
            refetch: decision.refetch,
            reason: decision.reason,
            zoom,
            zoom_state,
            radius_m,
            moved_m: decision.moved_m,
            threshold_m: decision.threshold_m,
        })
    }

    fn begin(&self, kind: EntityKind) -> InFlight<'_> {
        let mut state = self.state.lock();
        if let Some(previous) = state.in_flight.get(&kind) {
            log::debug!("{} fetch generation {} will be superseded", kind, previous);
        }
        let generation = state.bump(kind);
        state.in_flight.insert(kind, generation);
        InFlight {
            state: &self.state,
            kind,
            generation,
        }
    }

    fn prepare(&self, query: ViewportQuery) -> Result<Prepared> {
        validate_geographic_point(&query.center)?;
        validate_radius(query.radius_m)?;

        let inner = &self.engine.inner;
        let config = &inner.config;
        let kind = query.kind;
        let signature = query.signature();
        let zoom_state = inner.selector.select(query.zoom);

        if !zoom_state.fetches_anything() {
            log::debug!("{} query is zoomed out too far; nothing to fetch", kind);
            return Ok(Prepared::Skip(FetchResult::empty(kind, zoom_state, signature)));
        }

        let user = inner.session.current_user_id();
        if kind.requires_identity() && user.is_none() {
            log::warn!("{} query needs a signed-in user; returning nothing", kind);
            return Ok(Prepared::Skip(FetchResult::empty(kind, zoom_state, signature)));
        }

        let filters = query
            .filters
            .plan(&config.native_filter_fields, &config.cluster_filter_paths)?;

        let mut lanes = Vec::with_capacity(2);
        if let ZoomState::Detailed { .. } = zoom_state {
            let source = kind.point_collection(&config.collections);
            if let Some(collection) = source.resolve(user.as_deref()) {
                lanes.push(LanePlan {
                    lane: Lane::Points,
                    class: record_class(kind, Lane::Points),
                    collection,
                    order_by: source.order_by.clone(),
                    equality: filters.store_side.clone(),
                });
            }
        }
        if let Some(level) = inner.selector.cluster_level(zoom_state) {
            let source = kind.cluster_collection(&config.collections);
            if let Some(collection) = source.resolve(user.as_deref()) {
                let mut equality = vec![EqualityFilter::equals(
                    config.collections.zoom_field.clone(),
                    level.as_tag(),
                )];
                equality.extend(filters.cluster_side.iter().cloned());
                lanes.push(LanePlan {
                    lane: Lane::Clusters,
                    class: record_class(kind, Lane::Clusters),
                    collection,
                    order_by: source.order_by.clone(),
                    equality,
                });
            }
        }

        if lanes.is_empty() {
            log::warn!("{} query resolved to no readable collections", kind);
            return Ok(Prepared::Skip(FetchResult::empty(kind, zoom_state, signature)));
        }

        let page_size = query.page_size.unwrap_or(config.default_page_size);
        let strict_radius = query.strict_radius.unwrap_or(config.strict_radius);

        Ok(Prepared::Ready(Box::new(FetchPlan {
            query,
            signature,
            zoom_state,
            filters,
            lanes,
            page_size,
            strict_radius,
        })))
    }

    /// Scan `lanes`, then merge, filter and shape the results.
    ///
    /// Returns the lanes with their cursors advanced. Points in `absorbed` were
    /// shown inside a cluster on an earlier page. Nothing is committed here.
    async fn scan(
        &self,
        plan: &FetchPlan,
        mut lanes: Vec<LaneCursor>,
        absorbed: &BTreeSet<String>,
        generation: u64,
    ) -> Result<Assembled> {
        let inner = &self.engine.inner;
        let query = &plan.query;

        let mut requests = Vec::with_capacity(lanes.len());
        for cursor in &lanes {
            let Some(lane) = plan.lane(cursor.lane) else {
                return Err(MapQueryError::InvalidInput(format!(
                    "stored cursor for a {:?} lane the {} query no longer scans",
                    cursor.lane, query.kind
                )));
            };
            requests.push(BoundRequest {
                class: lane.class,
                scan: ScanRequest {
                    collection: lane.collection.clone(),
                    order_by: lane.order_by.clone(),
                    start_key: cursor.bound.start_key.clone(),
                    end_key: cursor.bound.end_key.clone(),
                    equality: lane.equality.clone(),
                    limit: plan.page_size,
                    start_after: cursor.after.clone(),
                },
            });
        }

        let outcomes = inner.executor.execute(requests).await;

        let mut stats = FetchStats {
            generation,
            bounds_total: outcomes.len(),
            ..Default::default()
        };
        let mut points = ResultMerger::new();
        let mut clusters = ResultMerger::new();
        let mut last_error = None;

        for BoundOutcome { index, result } in outcomes {
            let cursor = &mut lanes[index];
            match result {
                Ok(page) => {
                    stats.records_examined += page.examined;
                    stats.records_skipped += page.skipped;
                    cursor.advance(page.last, page.has_more);
                    match cursor.lane {
                        Lane::Points => points.extend(page.entities),
                        Lane::Clusters => clusters.extend(page.entities),
                    }
                }
                Err(e) => {
                    stats.bounds_failed += 1;
                    cursor.advance(None, false);
                    if let BoundQueryError::Decode(decode) = &e {
                        return Err(MapQueryError::Decode(decode.clone()));
                    }
                    last_error = Some(e);
                }
            }
        }

        if let Some(last_error) = last_error {
            if stats.bounds_failed == stats.bounds_total {
                log::warn!(
                    "{} fetch failed: all {} bounds failed",
                    query.kind,
                    stats.bounds_total
                );
                return Err(MapQueryError::AllBoundsFailed {
                    bounds: stats.bounds_total,
                    last_error,
                });
            }
            log::warn!(
                "{} fetch continuing with {} of {} bounds",
                query.kind,
                stats.bounds_total - stats.bounds_failed,
                stats.bounds_total
            );
        }

        let points = points.finish();
        let clusters = clusters.finish();
        stats.duplicates_removed = points.duplicates_removed + clusters.duplicates_removed;

        let merged: Vec<Entity> = points.entities.into_iter().chain(clusters.entities).collect();
        let filtered = apply_filters(merged, &plan.filters.post_fetch);
        stats.filtered_out = filtered.points_rejected;
        stats.clusters_dropped = filtered.clusters_dropped;

        let entities = if plan.strict_radius {
            let (kept, dropped) = retain_within_radius(
                filtered.entities,
                &query.center,
                query.radius_m,
                inner.config.metric,
            );
            stats.outside_radius = dropped;
            kept
        } else {
            filtered.entities
        };

        let mut points = Vec::new();
        let mut clusters = Vec::new();
        for entity in entities {
            match entity {
                Entity::Point(poi) => points.push(poi),
                Entity::Cluster(cluster) => clusters.push(cluster),
            }
        }

        let (points, clusters) = match plan.zoom_state {
            ZoomState::Detailed { hybrid: true } => {
                inner.selector.resolve_hybrid(points, clusters, absorbed)
            }
            _ => (points, clusters),
        };
        let absorbed = match plan.zoom_state {
            ZoomState::Detailed { hybrid: true } => clusters
                .iter()
                .flat_map(|c| c.members().iter().map(|m| m.id.clone()))
                .collect(),
            _ => BTreeSet::new(),
        };

        log::debug!(
            "{} fetch generation {}: {} points, {} clusters ({} duplicates, {} filtered, {} skipped)",
            query.kind,
            generation,
            points.len(),
            clusters.len(),
            stats.duplicates_removed,
            stats.filtered_out,
            stats.records_skipped
        );

        Ok(Assembled {
            points,
            clusters,
            lanes,
            absorbed,
            stats,
        })
    }
}

impl std::fmt::Debug for MapSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSurface")
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticSession;
    use crate::storage::MemoryStore;
    use mapquery_types::ZoomLevel;
    use serde_json::json;

    fn restaurant(id: &str, lat: f64, lon: f64, cuisine: &str) -> serde_json::Value {
        let hash = geohash::encode(geohash::Coord { x: lon, y: lat }, 9).unwrap();
        json!({
            "id": id,
            "name": id,
            "categoryName": cuisine,
            "geoHash": hash,
            "geoPoint": {"latitude": lat, "longitude": lon}
        })
    }

    fn engine(store: Arc<MemoryStore>) -> MapQueryEngine {
        MapQueryEngine::builder().store(store).build().unwrap()
    }

    fn downtown() -> Point {
        Point::new(-118.24, 34.05)
    }

    #[tokio::test]
    async fn test_max_zoom_out_fetches_nothing() {
        let store = Arc::new(MemoryStore::new());
        let surface = engine(store.clone()).mount_surface();
        let query = ViewportQuery::new(EntityKind::Restaurant, downtown(), 500.0)
            .zoom(ZoomLevel::MaxZoomOut);
        let result = surface.fetch_viewport(query).await.unwrap();
        assert_eq!(result.zoom_state, ZoomState::MaxZoomedOut);
        assert!(result.is_empty());
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_identity_scoped_query_without_session_is_empty() {
        let store = Arc::new(MemoryStore::new());
        let surface = engine(store.clone()).mount_surface();
        let query = ViewportQuery::new(EntityKind::FollowingPost, downtown(), 500.0);
        let result = surface.fetch_viewport(query).await.unwrap();
        assert!(result.is_empty());
        assert!(!result.has_more);
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_identity_scoped_query_reads_user_collection() {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "userFollowingPosts/u1/posts",
            "p1",
            json!({
                "id": "p1",
                "restaurant": {
                    "id": "r1", "name": "Sushi Gen", "geoHash": "9q5ctmvrb",
                    "geoPoint": {"latitude": 34.0466, "longitude": -118.2386}
                },
                "user": {"id": "u2"}
            }),
        );
        let engine = MapQueryEngine::builder()
            .store(store)
            .session(Arc::new(StaticSession::signed_in("u1")))
            .build()
            .unwrap();
        let surface = engine.mount_surface();
        let query = ViewportQuery::new(EntityKind::FollowingPost, downtown(), 800.0);
        let result = surface.fetch_viewport(query).await.unwrap();
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.points[0].id, "p1");
    }

    #[tokio::test]
    async fn test_strict_radius_drops_points_outside_circle() {
        let store = Arc::new(MemoryStore::new());
        store.insert("restaurants", "near", restaurant("near", 34.0501, -118.2401, "Thai"));
        // About 1.1 km north.
        store.insert("restaurants", "far", restaurant("far", 34.06, -118.24, "Thai"));
        let surface = engine(store).mount_surface();

        let loose = ViewportQuery::new(EntityKind::Restaurant, downtown(), 500.0);
        let strict = loose.clone().strict_radius(true);

        let all = surface.fetch_viewport(loose).await.unwrap();
        let cut = surface.fetch_viewport(strict).await.unwrap();
        assert!(cut.points.iter().all(|p| p.id == "near"));
        assert_eq!(cut.points.len(), 1);
        assert_eq!(cut.stats.outside_radius, all.points.len() - 1);
    }

    #[tokio::test]
    async fn test_unsupported_filter_is_rejected_before_scanning() {
        let store = Arc::new(MemoryStore::new());
        let surface = engine(store.clone()).mount_surface();
        let query = ViewportQuery::new(EntityKind::Restaurant, downtown(), 500.0)
            .filter("ambience", ["cozy"]);
        assert!(matches!(
            surface.fetch_viewport(query).await,
            Err(MapQueryError::InvalidInput(_))
        ));
        assert_eq!(store.scan_count(), 0);
        assert_eq!(surface.generation(EntityKind::Restaurant), 0);
    }

    #[tokio::test]
    async fn test_fetch_more_without_fetch() {
        let surface = engine(Arc::new(MemoryStore::new())).mount_surface();
        assert!(matches!(
            surface.fetch_more(EntityKind::Post, FilterSignature(0)).await,
            Err(MapQueryError::NoActiveQuery(EntityKind::Post))
        ));
    }

    #[test]
    fn test_on_viewport_changed_gates_refetch() {
        let surface = engine(Arc::new(MemoryStore::new())).mount_surface();
        let span = ViewportSpan::square(0.005);

        let first = surface.on_viewport_changed(downtown(), span).unwrap();
        assert!(first.refetch);
        assert_eq!(first.zoom, ZoomLevel::Neighborhood);
        assert_eq!(first.radius_m, 500.0 * 0.9);

        let nudged = Point::new(-118.2401, 34.0501);
        let second = surface.on_viewport_changed(nudged, span).unwrap();
        assert!(!second.refetch);
        assert_eq!(surface.anchor().unwrap().center, downtown());

        let zoomed_out = surface
            .on_viewport_changed(downtown(), ViewportSpan::square(1.0))
            .unwrap();
        assert!(!zoomed_out.refetch);
        assert_eq!(zoomed_out.zoom_state, ZoomState::MaxZoomedOut);
    }

    #[test]
    fn test_accepted_change_bumps_every_generation() {
        let surface = engine(Arc::new(MemoryStore::new())).mount_surface();
        surface
            .on_viewport_changed(downtown(), ViewportSpan::square(0.02))
            .unwrap();
        for kind in EntityKind::ALL {
            assert_eq!(surface.generation(kind), 1);
        }
        assert!(
            surface
                .on_viewport_changed(Point::new(200.0, 0.0), ViewportSpan::square(0.02))
                .is_err()
        );
    }
}
