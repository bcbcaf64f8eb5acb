//! Distance helpers built on the geo crate.
//!
//! Everything here takes `geo::Point` values in (longitude, latitude) order and
//! returns meters.

use geo::{Distance, Euclidean, Geodesic, Haversine, Point, Rhumb};
use mapquery_types::ViewportSpan;
use serde::{Deserialize, Serialize};

/// Distance metrics for spatial calculations.
///
/// Different metrics are appropriate for different use cases:
/// - **Haversine**: Fast spherical distance, good for most lon/lat calculations
/// - **Geodesic**: More accurate ellipsoidal distance (Karney 2013), slower
/// - **Rhumb**: Constant bearing distance, useful for navigation
/// - **Euclidean**: Planar distance, only for projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Haversine formula - assumes spherical Earth, fast and accurate enough for most uses
    #[default]
    Haversine,
    /// Geodesic distance using Karney (2013) - more accurate, accounts for Earth's ellipsoid
    Geodesic,
    /// Rhumb line (loxodrome) - maintains constant bearing
    Rhumb,
    /// Euclidean distance - for planar/projected coordinates only
    Euclidean,
}

/// Calculate the distance between two points using the specified metric.
///
/// # Examples
///
/// ```rust
/// use mapquery::spatial::{distance_between, DistanceMetric};
/// use geo::Point;
///
/// let downtown = Point::new(-118.2437, 34.0522);
/// let santa_monica = Point::new(-118.4912, 34.0195);
///
/// let dist = distance_between(&downtown, &santa_monica, DistanceMetric::Haversine);
/// assert!(dist > 22_000.0 && dist < 24_000.0);
/// ```
pub fn distance_between(point1: &Point, point2: &Point, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Haversine => Haversine.distance(*point1, *point2),
        DistanceMetric::Geodesic => Geodesic.distance(*point1, *point2),
        DistanceMetric::Rhumb => Rhumb.distance(*point1, *point2),
        DistanceMetric::Euclidean => Euclidean.distance(*point1, *point2),
    }
}

/// Great-circle length of the viewport diagonal, from its south-west to its north-east corner.
pub fn viewport_diagonal_meters(center: &Point, span: &ViewportSpan, metric: DistanceMetric) -> f64 {
    let (ne, sw) = span.corners(*center);
    distance_between(&sw, &ne, metric)
}

/// Whether `point` lies within `radius_m` of `center`. The boundary counts as inside.
pub fn within_radius(center: &Point, point: &Point, radius_m: f64, metric: DistanceMetric) -> bool {
    distance_between(center, point, metric) <= radius_m
}
