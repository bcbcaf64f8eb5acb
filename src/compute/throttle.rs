//! Refetch gating for viewport changes.
//!
//! Small pans don't justify a new fan-out. The tolerated pan grows with the
//! viewport: a few hundred meters when looking at a neighborhood, hundreds of
//! kilometers when looking at a continent.

use crate::config::RadiusPolicy;
use crate::query::RefetchReason;
use crate::spatial::{DistanceMetric, distance_between, viewport_diagonal_meters};
use geo::Point;
use mapquery_types::{ViewportSpan, ZoomLevel};

// Map extent, in screen points, at which the radius is not rescaled.
const REFERENCE_EXTENT_PX: f64 = 1000.0;

/// On-screen size of the map view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapSize {
    pub width: f64,
    pub height: f64,
}

impl MapSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn extent(&self) -> f64 {
        self.width.max(self.height)
    }
}

impl Default for MapSize {
    fn default() -> Self {
        Self::new(REFERENCE_EXTENT_PX, REFERENCE_EXTENT_PX)
    }
}

/// Query radius covering a viewport: half its diagonal, scaled by the map's
/// on-screen size, clamped, then shrunk by the policy's scale.
pub fn radius_for_span(policy: &RadiusPolicy, span: &ViewportSpan, map_size: MapSize) -> f64 {
    let half_diagonal = span.diagonal_degrees() * policy.meters_per_degree / 2.0;
    let adjusted = half_diagonal * map_size.extent() / REFERENCE_EXTENT_PX;
    adjusted.clamp(policy.min_meters, policy.max_meters) * policy.scale
}

/// Pan distance, in meters, that justifies a refetch for a viewport of this size.
pub fn distance_threshold_meters(center: &Point, span: &ViewportSpan, metric: DistanceMetric) -> f64 {
    let diagonal_km = viewport_diagonal_meters(center, span, metric) / 1000.0;
    let threshold_km = if diagonal_km > 1000.0 {
        500.0
    } else if diagonal_km > 500.0 {
        200.0
    } else if diagonal_km > 100.0 {
        50.0
    } else if diagonal_km > 50.0 {
        10.0
    } else {
        (diagonal_km * 0.15).max(0.5)
    };
    threshold_km * 1000.0
}

/// The viewport a surface last accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportAnchor {
    pub center: Point,
    pub span: ViewportSpan,
    pub zoom: ZoomLevel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleDecision {
    pub refetch: bool,
    pub reason: RefetchReason,
    pub moved_m: Option<f64>,
    pub threshold_m: f64,
}

/// Decides whether a viewport change warrants a new fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportChangeThrottler {
    metric: DistanceMetric,
}

impl ViewportChangeThrottler {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    /// Rules, in order: nothing is fetched past max zoom out, the first viewport
    /// always fetches, a zoom change always fetches, otherwise the center must move
    /// at least the span's threshold.
    pub fn evaluate(&self, last: Option<&ViewportAnchor>, next: &ViewportAnchor) -> ThrottleDecision {
        let threshold_m = distance_threshold_meters(&next.center, &next.span, self.metric);
        let moved_m = last.map(|l| distance_between(&l.center, &next.center, self.metric));

        let (refetch, reason) = match last {
            _ if next.zoom.is_max_zoom_out() => (false, RefetchReason::MaxZoomedOut),
            None => (true, RefetchReason::FirstFetch),
            Some(l) if l.zoom != next.zoom => (true, RefetchReason::ZoomChanged),
            Some(_) if moved_m.is_some_and(|d| d >= threshold_m) => {
                (true, RefetchReason::MovedPastThreshold)
            }
            Some(_) => (false, RefetchReason::WithinThreshold),
        };

        ThrottleDecision {
            refetch,
            reason,
            moved_m,
            threshold_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Destination, Haversine};

    fn anchor(center: Point, delta: f64, zoom: ZoomLevel) -> ViewportAnchor {
        ViewportAnchor {
            center,
            span: ViewportSpan::square(delta),
            zoom,
        }
    }

    #[test]
    fn test_threshold_tiers() {
        let center = Point::new(-118.24, 34.05);
        let metric = DistanceMetric::Haversine;
        // ~1.4 km diagonal
        assert_eq!(distance_threshold_meters(&center, &ViewportSpan::square(0.01), metric), 500.0);
        // ~14 km diagonal
        let t = distance_threshold_meters(&center, &ViewportSpan::square(0.1), metric);
        assert!(t > 2_000.0 && t < 2_300.0, "threshold = {t}");
        // ~140 km diagonal
        assert_eq!(distance_threshold_meters(&center, &ViewportSpan::square(1.0), metric), 50_000.0);
        // continent
        assert_eq!(
            distance_threshold_meters(&center, &ViewportSpan::square(20.0), metric),
            500_000.0
        );
    }

    #[test]
    fn test_radius_for_span() {
        let policy = RadiusPolicy::default();
        // Tiny spans clamp to the minimum before scaling.
        let r = radius_for_span(&policy, &ViewportSpan::square(0.001), MapSize::default());
        assert!((r - 450.0).abs() < 1e-9);
        // Huge spans clamp to the maximum.
        let r = radius_for_span(&policy, &ViewportSpan::square(10.0), MapSize::default());
        assert!((r - 45_000.0).abs() < 1e-9);
        // A wider map asks for proportionally more.
        let small = radius_for_span(&policy, &ViewportSpan::square(0.05), MapSize::new(500.0, 400.0));
        let large = radius_for_span(&policy, &ViewportSpan::square(0.05), MapSize::new(1000.0, 800.0));
        assert!((large - 2.0 * small).abs() < 1e-6);
    }

    #[test]
    fn test_first_fetch_always_proceeds() {
        let throttler = ViewportChangeThrottler::default();
        let next = anchor(Point::new(-118.24, 34.05), 0.01, ZoomLevel::Neighborhood);
        let decision = throttler.evaluate(None, &next);
        assert!(decision.refetch);
        assert_eq!(decision.reason, RefetchReason::FirstFetch);
    }

    #[test]
    fn test_max_zoom_out_never_fetches() {
        let throttler = ViewportChangeThrottler::default();
        let next = anchor(Point::new(-118.24, 34.05), 1.0, ZoomLevel::MaxZoomOut);
        assert!(!throttler.evaluate(None, &next).refetch);
    }

    #[test]
    fn test_zoom_change_fetches_without_moving() {
        let throttler = ViewportChangeThrottler::default();
        let center = Point::new(-118.24, 34.05);
        let last = anchor(center, 0.01, ZoomLevel::Neighborhood);
        let next = anchor(center, 0.02, ZoomLevel::City);
        let decision = throttler.evaluate(Some(&last), &next);
        assert!(decision.refetch);
        assert_eq!(decision.reason, RefetchReason::ZoomChanged);
    }

    #[test]
    fn test_threshold_boundary() {
        let throttler = ViewportChangeThrottler::default();
        let center = Point::new(-118.24, 34.05);
        let last = anchor(center, 0.01, ZoomLevel::Neighborhood);
        let threshold = distance_threshold_meters(&center, &last.span, DistanceMetric::Haversine);

        let short = Haversine.destination(center, 90.0, threshold * 0.98);
        let decision = throttler.evaluate(Some(&last), &anchor(short, 0.01, ZoomLevel::Neighborhood));
        assert!(!decision.refetch);
        assert_eq!(decision.reason, RefetchReason::WithinThreshold);

        let far = Haversine.destination(center, 90.0, threshold * 1.02);
        let decision = throttler.evaluate(Some(&last), &anchor(far, 0.01, ZoomLevel::Neighborhood));
        assert!(decision.refetch);
        assert_eq!(decision.reason, RefetchReason::MovedPastThreshold);
    }

    #[test]
    fn test_move_of_exactly_threshold_fetches() {
        // Planar units keep the distance exact; small spans sit on the 500 m floor.
        let throttler = ViewportChangeThrottler::new(DistanceMetric::Euclidean);
        let last = anchor(Point::new(0.0, 0.0), 0.01, ZoomLevel::Neighborhood);

        let at = anchor(Point::new(500.0, 0.0), 0.01, ZoomLevel::Neighborhood);
        let decision = throttler.evaluate(Some(&last), &at);
        assert_eq!(decision.threshold_m, 500.0);
        assert_eq!(decision.moved_m, Some(decision.threshold_m));
        assert!(decision.refetch);
        assert_eq!(decision.reason, RefetchReason::MovedPastThreshold);

        let short = anchor(Point::new(499.5, 0.0), 0.01, ZoomLevel::Neighborhood);
        assert!(!throttler.evaluate(Some(&last), &short).refetch);
    }
}
