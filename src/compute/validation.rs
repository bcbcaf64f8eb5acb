//! Validation for viewport inputs.

use crate::error::{MapQueryError, Result};
use geo::Point;
use mapquery_types::ViewportSpan;

/// Validates a 2D point has valid longitude and latitude.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
///
/// # Examples
///
/// ```
/// use mapquery::compute::validation::validate_geographic_point;
/// use geo::Point;
///
/// let downtown = Point::new(-118.24, 34.05);
/// assert!(validate_geographic_point(&downtown).is_ok());
///
/// // Invalid longitude
/// let invalid = Point::new(200.0, 40.0);
/// assert!(validate_geographic_point(&invalid).is_err());
///
/// // Invalid latitude
/// let invalid = Point::new(-74.0, 95.0);
/// assert!(validate_geographic_point(&invalid).is_err());
/// ```
pub fn validate_geographic_point(point: &Point) -> Result<()> {
    let (x, y) = (point.x(), point.y());

    if !x.is_finite() {
        return Err(MapQueryError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            x
        )));
    }

    if !y.is_finite() {
        return Err(MapQueryError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            y
        )));
    }

    if !(-180.0..=180.0).contains(&x) {
        return Err(MapQueryError::InvalidInput(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            x
        )));
    }

    if !(-90.0..=90.0).contains(&y) {
        return Err(MapQueryError::InvalidInput(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            y
        )));
    }

    Ok(())
}

/// Validates a query radius in meters. Zero is allowed and means "this exact spot".
pub fn validate_radius(radius_m: f64) -> Result<()> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(MapQueryError::InvalidInput(format!(
            "Radius must be a finite, non-negative number of meters, got: {}",
            radius_m
        )));
    }
    Ok(())
}

/// Validates a viewport span.
///
/// Both deltas must be finite and positive; latitude at most 180 and longitude at most 360.
pub fn validate_span(span: &ViewportSpan) -> Result<()> {
    let (lat, lon) = (span.latitude_delta, span.longitude_delta);

    if !(lat.is_finite() && lat > 0.0 && lat <= 180.0) {
        return Err(MapQueryError::InvalidInput(format!(
            "Latitude delta out of range (0.0, 180.0]: {}",
            lat
        )));
    }

    if !(lon.is_finite() && lon > 0.0 && lon <= 360.0) {
        return Err(MapQueryError::InvalidInput(format!(
            "Longitude delta out of range (0.0, 360.0]: {}",
            lon
        )));
    }

    Ok(())
}
