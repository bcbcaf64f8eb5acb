//! Viewport queries over geohash-ordered document stores.
//!
//! A map view asks for the points of interest around its center. mapquery turns
//! that circle into a handful of geohash key ranges, scans them concurrently,
//! merges and filters what comes back, and chooses between individual points and
//! pre-aggregated clusters depending on zoom. Per-surface state tracks fetch
//! generations, so a stale fetch never overwrites a newer one, and pagination
//! cursors for "load more".
//!
//! ```rust
//! use mapquery::prelude::*;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = MapQueryEngine::builder().build()?;
//! let surface = engine.mount_surface();
//!
//! let decision = surface.on_viewport_changed(Point::new(-118.24, 34.05), ViewportSpan::square(0.01))?;
//! assert!(decision.refetch);
//!
//! let query = ViewportQuery::new(EntityKind::Restaurant, Point::new(-118.24, 34.05), decision.radius_m)
//!     .zoom(decision.zoom);
//! let result = surface.fetch_viewport(query).await?;
//! assert!(result.is_empty());
//! # Ok::<(), mapquery::MapQueryError>(())
//! # }).unwrap();
//! ```

pub mod builder;
pub mod codec;
pub mod compute;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod query;
pub mod session;
pub mod spatial;
pub mod storage;

pub use builder::EngineBuilder;
pub use config::{
    CollectionLayout, CollectionSpec, DecodeMode, EngineConfig, HybridConfig, RadiusPolicy,
    ZoomThresholds,
};
pub use engine::{MapQueryEngine, MapSurface};
pub use error::{BoundQueryError, DecodeError, MapQueryError, Result};

pub use geo::Point;

pub use compute::filter::{FilterSignature, FilterValue, Filters};
pub use compute::geohash_range::{GeohashBound, GeohashRangeCompiler};
pub use compute::merge::ResultMerger;
pub use compute::throttle::{MapSize, ViewportAnchor, ViewportChangeThrottler};
pub use compute::zoom::{ClusterAggregationSelector, ZoomState};
pub use cursor::{CursorSet, PaginationCursorManager};
pub use executor::RangeQueryExecutor;
pub use query::{
    EntityKind, FetchDecision, FetchResult, FetchStats, RefetchReason, ViewportQuery,
};
pub use session::{AnonymousSession, SessionProvider, StaticSession};
pub use spatial::{DistanceMetric, distance_between};
pub use storage::{MemoryStore, RangeStore};

#[cfg(feature = "geojson")]
pub use compute::geojson::{to_feature_collection, to_geojson_string};

pub use mapquery_types::{
    ClusterRecord, Entity, GeoPoint, PoiAttributes, PoiKind, PointOfInterest, ViewportSpan,
    ZoomLevel,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{EngineBuilder, MapQueryEngine, MapQueryError, MapSurface, Result};

    pub use geo::Point;

    pub use crate::{EntityKind, FetchResult, Filters, ViewportQuery, ZoomState};

    pub use crate::{ViewportSpan, ZoomLevel};

    pub use crate::{DecodeMode, EngineConfig};

    pub use crate::{MemoryStore, RangeStore};

    pub use crate::{AnonymousSession, SessionProvider, StaticSession};

    pub use std::sync::Arc;
}
