use geo::Point;
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in the shape the document store persists it.
///
/// `geo::Point` is x = longitude, y = latitude; use [`GeoPoint::to_point`] when
/// handing coordinates to distance code.
///
/// ```
/// use mapquery_types::coord::GeoPoint;
///
/// let la = GeoPoint::new(34.0522, -118.2437);
/// let p = la.to_point();
/// assert_eq!(p.y(), 34.0522);
/// assert_eq!(GeoPoint::from(p), la);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(value: GeoPoint) -> Self {
        value.to_point()
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(value: Point<f64>) -> Self {
        Self::new(value.y(), value.x())
    }
}

/// Visible extent of a map viewport, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSpan {
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl ViewportSpan {
    pub fn new(latitude_delta: f64, longitude_delta: f64) -> Self {
        Self {
            latitude_delta,
            longitude_delta,
        }
    }

    /// A span with equal latitude and longitude deltas.
    pub fn square(delta: f64) -> Self {
        Self::new(delta, delta)
    }

    /// Diagonal of the span in degrees, treating both axes as planar.
    pub fn diagonal_degrees(&self) -> f64 {
        self.latitude_delta.hypot(self.longitude_delta)
    }

    /// North-east and south-west corners of a viewport centered on `center`.
    ///
    /// Latitudes are clamped to the poles; longitudes are left unwrapped.
    pub fn corners(&self, center: Point<f64>) -> (Point<f64>, Point<f64>) {
        let half_lat = self.latitude_delta / 2.0;
        let half_lon = self.longitude_delta / 2.0;
        let north_east = Point::new(
            center.x() + half_lon,
            (center.y() + half_lat).clamp(-90.0, 90.0),
        );
        let south_west = Point::new(
            center.x() - half_lon,
            (center.y() - half_lat).clamp(-90.0, 90.0),
        );
        (north_east, south_west)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_round_trips_through_point() {
        let gp = GeoPoint::new(40.7128, -74.0060);
        let point: Point<f64> = gp.into();
        assert_eq!(point.x(), -74.0060);
        assert_eq!(point.y(), 40.7128);
        assert_eq!(GeoPoint::from(point), gp);
    }

    #[test]
    fn test_geo_point_wire_shape() {
        let json = r#"{"latitude": 34.05, "longitude": -118.24}"#;
        let gp: GeoPoint = serde_json::from_str(json).unwrap();
        assert_eq!(gp, GeoPoint::new(34.05, -118.24));
    }

    #[test]
    fn test_span_corners_clamp_at_poles() {
        let span = ViewportSpan::square(10.0);
        let (ne, sw) = span.corners(Point::new(0.0, 88.0));
        assert_eq!(ne.y(), 90.0);
        assert_eq!(sw.y(), 83.0);
        assert_eq!(ne.x(), 5.0);
        assert_eq!(sw.x(), -5.0);
    }

    #[test]
    fn test_span_diagonal() {
        let span = ViewportSpan::new(3.0, 4.0);
        assert!((span.diagonal_degrees() - 5.0).abs() < 1e-12);
    }
}
