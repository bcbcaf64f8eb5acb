//! # mapquery-types
//!
//! Value types shared by the mapquery viewport engine and its callers:
//!
//! - **Coordinates**: `GeoPoint` (the stored `{latitude, longitude}` shape) and `ViewportSpan`
//! - **Entities**: `PointOfInterest`, `ClusterRecord` and the `Entity` union
//! - **Documents**: serde shapes of records as they sit in the backing document store
//! - **Zoom**: the ordered `ZoomLevel` tag used to select pre-aggregated clusters
//!
//! Entities are plain values rebuilt on every fetch; nothing here holds identity or caches.
//!
//! ```rust
//! use mapquery_types::coord::GeoPoint;
//! use mapquery_types::zoom::ZoomLevel;
//!
//! let downtown = GeoPoint::new(34.05, -118.24);
//! assert_eq!(downtown.to_point().x(), -118.24);
//! assert!(ZoomLevel::City < ZoomLevel::MaxZoomOut);
//! ```

pub mod coord;
pub mod document;
pub mod entity;
pub mod zoom;

pub use coord::{GeoPoint, ViewportSpan};
pub use document::DocumentError;
pub use entity::{ClusterRecord, Entity, PoiAttributes, PoiKind, PointOfInterest};
pub use zoom::ZoomLevel;
