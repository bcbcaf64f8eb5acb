//! Query and result types exchanged with callers.

use crate::compute::filter::{FilterSignature, FilterValue, Filters};
use crate::compute::zoom::ZoomState;
use crate::config::{CollectionLayout, CollectionSpec};
use crate::cursor::CursorSet;
use geo::Point;
use mapquery_types::{ClusterRecord, PointOfInterest, ZoomLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which map surface a query feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Restaurant,
    Post,
    /// Posts by people the signed-in user follows.
    FollowingPost,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Restaurant,
        EntityKind::Post,
        EntityKind::FollowingPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Restaurant => "restaurant",
            EntityKind::Post => "post",
            EntityKind::FollowingPost => "following_post",
        }
    }

    /// Queries for this kind need a signed-in identity and fail closed without one.
    pub fn requires_identity(&self) -> bool {
        matches!(self, EntityKind::FollowingPost)
    }

    pub(crate) fn point_collection<'a>(&self, layout: &'a CollectionLayout) -> &'a CollectionSpec {
        match self {
            EntityKind::Restaurant => &layout.restaurants,
            EntityKind::Post => &layout.posts,
            EntityKind::FollowingPost => &layout.following_posts,
        }
    }

    pub(crate) fn cluster_collection<'a>(
        &self,
        layout: &'a CollectionLayout,
    ) -> &'a CollectionSpec {
        match self {
            EntityKind::Restaurant => &layout.restaurant_clusters,
            EntityKind::Post => &layout.post_clusters,
            EntityKind::FollowingPost => &layout.following_clusters,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One viewport fetch request.
///
/// ```rust
/// use mapquery::{EntityKind, ViewportQuery};
/// use mapquery_types::ZoomLevel;
/// use geo::Point;
///
/// let query = ViewportQuery::new(EntityKind::Restaurant, Point::new(-118.24, 34.05), 500.0)
///     .zoom(ZoomLevel::Neighborhood)
///     .filter("cuisine", ["Japanese"])
///     .page_size(20);
/// assert_eq!(query.page_size, Some(20));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportQuery {
    pub kind: EntityKind,
    pub center: Point,
    pub radius_m: f64,
    pub zoom: ZoomLevel,
    pub filters: Filters,
    /// Per-bound page size; `None` uses the configured default, `Some(0)` is unlimited.
    pub page_size: Option<usize>,
    /// Overrides the configured strict-radius setting.
    pub strict_radius: Option<bool>,
}

impl ViewportQuery {
    pub fn new(kind: EntityKind, center: Point, radius_m: f64) -> Self {
        Self {
            kind,
            center,
            radius_m,
            zoom: ZoomLevel::default(),
            filters: Filters::new(),
            page_size: None,
            strict_radius: None,
        }
    }

    pub fn zoom(mut self, zoom: ZoomLevel) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn filter<V, I>(mut self, field: &str, values: I) -> Self
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        self.filters.insert(field, values);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn strict_radius(mut self, strict: bool) -> Self {
        self.strict_radius = Some(strict);
        self
    }

    pub fn signature(&self) -> FilterSignature {
        self.filters.signature()
    }
}

/// Diagnostics for one fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    pub generation: u64,
    pub bounds_total: usize,
    pub bounds_failed: usize,
    /// Raw records returned by the store.
    pub records_examined: usize,
    /// Records dropped because they failed to decode.
    pub records_skipped: usize,
    pub duplicates_removed: usize,
    /// Points rejected by post-fetch filters, standalone or as cluster members.
    pub filtered_out: usize,
    pub clusters_dropped: usize,
    /// Entities inside the geohash cover but outside the query circle.
    pub outside_radius: usize,
}

/// What a viewport fetch hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub kind: EntityKind,
    pub zoom_state: ZoomState,
    pub points: Vec<PointOfInterest>,
    pub clusters: Vec<ClusterRecord>,
    /// True while any bound still has records past its cursor.
    pub has_more: bool,
    pub signature: FilterSignature,
    /// Cursor state after this page; empty when nothing was fetched.
    pub cursors: CursorSet,
    pub stats: FetchStats,
}

impl FetchResult {
    /// A result for which nothing was fetched.
    pub(crate) fn empty(kind: EntityKind, zoom_state: ZoomState, signature: FilterSignature) -> Self {
        Self {
            kind,
            zoom_state,
            points: Vec::new(),
            clusters: Vec::new(),
            has_more: false,
            signature,
            cursors: CursorSet::empty(kind, signature),
            stats: FetchStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.clusters.is_empty()
    }

    /// Markers to draw: clusters plus standalone points.
    pub fn len(&self) -> usize {
        self.points.len() + self.clusters.len()
    }
}

/// Why a viewport change did or did not lead to a refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefetchReason {
    FirstFetch,
    ZoomChanged,
    MovedPastThreshold,
    WithinThreshold,
    MaxZoomedOut,
}

/// Outcome of [`MapSurface::on_viewport_changed`](crate::engine::MapSurface::on_viewport_changed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchDecision {
    pub refetch: bool,
    pub reason: RefetchReason,
    pub zoom: ZoomLevel,
    pub zoom_state: ZoomState,
    /// Radius to query with if refetching.
    pub radius_m: f64,
    /// Distance the center moved since the last accepted viewport, if there was one.
    pub moved_m: Option<f64>,
    pub threshold_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_following_posts_require_identity() {
        assert!(EntityKind::FollowingPost.requires_identity());
        assert!(!EntityKind::Restaurant.requires_identity());
        assert!(!EntityKind::Post.requires_identity());
    }

    #[test]
    fn test_kind_collections() {
        let layout = CollectionLayout::default();
        assert_eq!(EntityKind::Post.point_collection(&layout).order_by, "restaurant.geoHash");
        assert_eq!(EntityKind::Restaurant.cluster_collection(&layout).name, "clusters");
        assert!(EntityKind::FollowingPost.cluster_collection(&layout).requires_identity());
    }

    #[test]
    fn test_query_signature_follows_filters() {
        let center = Point::new(-118.24, 34.05);
        let a = ViewportQuery::new(EntityKind::Restaurant, center, 500.0).filter("price", ["$$"]);
        let b = ViewportQuery::new(EntityKind::Restaurant, center, 900.0)
            .filter("restaurant.price", ["$$"]);
        assert_eq!(a.signature(), b.signature());
        let c = a.clone().filter("price", ["$"]);
        assert_ne!(a.signature(), c.signature());
    }
}
