//! Pure query-processing stages: range compilation, deduplication, filtering,
//! zoom selection and refetch gating, plus GeoJSON export.
//!
//! Nothing here does I/O or holds state between calls.

#[cfg(feature = "geojson")]
pub mod geojson;
pub mod filter;
pub mod geohash_range;
pub mod merge;
pub mod throttle;
pub mod validation;
pub mod zoom;
