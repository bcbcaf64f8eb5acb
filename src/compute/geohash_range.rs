//! Compile a query circle into key ranges over a geohash-ordered index.
//!
//! The circle's bounding box is sampled at nine points (center, edges and corners).
//! Each sample's geohash is truncated to a bit depth whose cells are at least as
//! large as the radius, so the cells containing the samples cover the whole box.
//! Each cell becomes one `[start_key, end_key]` range; duplicate and overlapping
//! ranges are folded together.
//!
//! The result is an over-cover: it always contains the circle and usually more.

use crate::compute::validation::{validate_geographic_point, validate_radius};
use crate::error::{MapQueryError, Result};
use geo::Point;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
const BITS_PER_CHAR: u32 = 5;

/// Longest geohash the encoder produces.
pub const MAX_PRECISION: usize = 12;
const MAX_BITS: u32 = MAX_PRECISION as u32 * BITS_PER_CHAR;

// Length of one degree of latitude at the equator (its shortest).
const METERS_PER_DEGREE_LATITUDE: f64 = 110_574.0;
const EARTH_EQ_RADIUS: f64 = 6_378_137.0;
// WGS84 first eccentricity squared.
const E2: f64 = 0.00669447819799;
const EPSILON: f64 = 1e-12;
// Smallest longitude extent we resolve; keeps zero-radius queries at a finite depth.
const MIN_LONGITUDE_DEGREES: f64 = 0.000001;

/// Sorts after every geohash character, so `prefix~` closes a prefix range.
pub const END_SENTINEL: char = '~';

/// Compiled bounds for one query. Nine inline slots match the default maximum.
pub type Bounds = SmallVec<[GeohashBound; 9]>;

/// A contiguous, inclusive range on the geohash-ordered index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeohashBound {
    pub start_key: String,
    pub end_key: String,
}

impl GeohashBound {
    pub fn new(start_key: impl Into<String>, end_key: impl Into<String>) -> Self {
        Self {
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// The range spanning every geohash.
    pub fn whole_world() -> Self {
        Self::new("0", END_SENTINEL.to_string())
    }

    /// Whether a stored key falls inside the range (both ends inclusive).
    pub fn contains(&self, key: &str) -> bool {
        self.start_key.as_str() <= key && key <= self.end_key.as_str()
    }

    fn overlaps_or_touches(&self, next: &GeohashBound) -> bool {
        next.start_key <= self.end_key
    }
}

impl fmt::Display for GeohashBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_key, self.end_key)
    }
}

/// Turns (center, radius) into at most `max_bounds` geohash ranges.
///
/// # Examples
///
/// ```rust
/// use mapquery::compute::geohash_range::GeohashRangeCompiler;
/// use geo::Point;
///
/// let compiler = GeohashRangeCompiler::default();
/// let center = Point::new(-118.24, 34.05);
/// let bounds = compiler.compile(&center, 500.0).unwrap();
///
/// assert!(!bounds.is_empty() && bounds.len() <= 9);
/// let center_hash = geohash::encode(geohash::Coord { x: -118.24, y: 34.05 }, 10).unwrap();
/// assert!(bounds.iter().any(|b| b.contains(&center_hash)));
/// ```
#[derive(Debug, Clone)]
pub struct GeohashRangeCompiler {
    max_bounds: usize,
}

impl GeohashRangeCompiler {
    pub const DEFAULT_MAX_BOUNDS: usize = 9;

    /// # Panics
    ///
    /// Panics if `max_bounds` is zero.
    pub fn new(max_bounds: usize) -> Self {
        assert!(max_bounds > 0, "Max bounds must be greater than zero");
        Self { max_bounds }
    }

    pub fn max_bounds(&self) -> usize {
        self.max_bounds
    }

    /// Compile the circle into ordered, non-overlapping ranges.
    ///
    /// When the natural bit depth yields more ranges than allowed, the depth is
    /// lowered one bit at a time; coarser cells still cover the circle, and a single
    /// bit always folds into one range.
    pub fn compile(&self, center: &Point, radius_m: f64) -> Result<Bounds> {
        validate_geographic_point(center)?;
        validate_radius(radius_m)?;

        let mut bits = query_bits(center, radius_m);
        loop {
            let bounds = bounds_for_bits(center, radius_m, bits)?;
            if bounds.len() <= self.max_bounds || bits == 1 {
                log::trace!(
                    "compiled radius {:.1}m at ({:.5}, {:.5}) into {} bounds at {} bits",
                    radius_m,
                    center.y(),
                    center.x(),
                    bounds.len(),
                    bits
                );
                return Ok(bounds);
            }
            bits -= 1;
        }
    }
}

impl Default for GeohashRangeCompiler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_BOUNDS)
    }
}

/// Bit depth whose cells are no smaller than `radius_m` in either direction.
pub fn query_bits(center: &Point, radius_m: f64) -> u32 {
    bounding_box_bits(center.y(), radius_m).max(1)
}

fn bounding_box_bits(latitude: f64, radius_m: f64) -> u32 {
    let lat_delta = radius_m / METERS_PER_DEGREE_LATITUDE;
    let lat_north = (latitude + lat_delta).min(90.0);
    let lat_south = (latitude - lat_delta).max(-90.0);

    let bits_lat = latitude_bits_for_resolution(radius_m).floor() as i64 * 2;
    let bits_long_north = longitude_bits_for_resolution(radius_m, lat_north).floor() as i64 * 2 - 1;
    let bits_long_south = longitude_bits_for_resolution(radius_m, lat_south).floor() as i64 * 2 - 1;

    bits_lat
        .min(bits_long_north)
        .min(bits_long_south)
        .clamp(0, MAX_BITS as i64) as u32
}

// Sized against the same degrees-per-meter the samples use, so a cell is never
// shorter than the gap between two sample rows.
fn latitude_bits_for_resolution(resolution_m: f64) -> f64 {
    (180.0 * METERS_PER_DEGREE_LATITUDE / resolution_m)
        .log2()
        .min(MAX_BITS as f64)
}

fn longitude_bits_for_resolution(resolution_m: f64, latitude: f64) -> f64 {
    let degrees = meters_to_longitude_degrees(resolution_m, latitude).max(MIN_LONGITUDE_DEGREES);
    (360.0 / degrees).log2().max(1.0)
}

/// Longitude degrees spanned by `distance_m` along the given parallel.
pub fn meters_to_longitude_degrees(distance_m: f64, latitude: f64) -> f64 {
    let radians = latitude.to_radians();
    let num = radians.cos() * EARTH_EQ_RADIUS * std::f64::consts::PI / 180.0;
    let denom = 1.0 / (1.0 - E2 * radians.sin() * radians.sin()).sqrt();
    let delta_deg = num * denom;
    if delta_deg < EPSILON {
        if distance_m > 0.0 { 360.0 } else { 0.0 }
    } else {
        (distance_m / delta_deg).min(360.0)
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    let adjusted = longitude + 180.0;
    if adjusted > 0.0 {
        adjusted % 360.0 - 180.0
    } else {
        180.0 - (-adjusted % 360.0)
    }
}

/// Center, edge midpoints and corners of the circle's bounding box.
fn bounding_box_samples(center: &Point, radius_m: f64) -> [Point; 9] {
    let (lat, lon) = (center.y(), center.x());
    let lat_delta = radius_m / METERS_PER_DEGREE_LATITUDE;
    let lat_north = (lat + lat_delta).min(90.0);
    let lat_south = (lat - lat_delta).max(-90.0);
    // Past 180 degrees the box wraps onto itself; east and west samples must stay apart.
    let lon_delta = meters_to_longitude_degrees(radius_m, lat_north)
        .max(meters_to_longitude_degrees(radius_m, lat_south))
        .min(180.0);
    let west = wrap_longitude(lon - lon_delta);
    let east = wrap_longitude(lon + lon_delta);

    [
        Point::new(lon, lat),
        Point::new(west, lat),
        Point::new(east, lat),
        Point::new(lon, lat_north),
        Point::new(west, lat_north),
        Point::new(east, lat_north),
        Point::new(lon, lat_south),
        Point::new(west, lat_south),
        Point::new(east, lat_south),
    ]
}

fn bounds_for_bits(center: &Point, radius_m: f64, bits: u32) -> Result<Bounds> {
    let precision = bits.div_ceil(BITS_PER_CHAR) as usize;
    let mut bounds = Bounds::new();

    for sample in bounding_box_samples(center, radius_m) {
        let coord = geohash::Coord {
            x: sample.x(),
            y: sample.y(),
        };
        let hash = geohash::encode(coord, precision)
            .map_err(|e| MapQueryError::InvalidGeohash(e.to_string()))?;
        let bound = range_for_hash(&hash, bits)?;
        if !bounds.contains(&bound) {
            bounds.push(bound);
        }
    }

    Ok(join_overlapping(bounds))
}

/// The range of all geohashes sharing `hash`'s first `bits` bits.
fn range_for_hash(hash: &str, bits: u32) -> Result<GeohashBound> {
    let precision = bits.div_ceil(BITS_PER_CHAR) as usize;
    if hash.len() < precision {
        return Ok(GeohashBound::new(hash, format!("{hash}{END_SENTINEL}")));
    }

    let (base, last) = hash[..precision].split_at(precision - 1);
    let last_value = last
        .bytes()
        .next()
        .and_then(|c| BASE32.iter().position(|&b| b == c))
        .ok_or_else(|| MapQueryError::InvalidGeohash(hash.to_string()))?;

    let significant_bits = bits - base.len() as u32 * BITS_PER_CHAR;
    let unused_bits = BITS_PER_CHAR - significant_bits;
    let start = (last_value >> unused_bits) << unused_bits;
    let end = start + (1 << unused_bits);

    let start_key = format!("{base}{}", BASE32[start] as char);
    let end_key = match BASE32.get(end) {
        Some(&c) => format!("{base}{}", c as char),
        None => format!("{base}{END_SENTINEL}"),
    };
    Ok(GeohashBound::new(start_key, end_key))
}

fn join_overlapping(mut bounds: Bounds) -> Bounds {
    bounds.sort();
    let mut joined = Bounds::new();
    for bound in bounds {
        match joined.last_mut() {
            Some(prev) if prev.overlaps_or_touches(&bound) => {
                if bound.end_key > prev.end_key {
                    prev.end_key = bound.end_key;
                }
            }
            _ => joined.push(bound),
        }
    }
    joined
}
