//! Zoom classification and the points-versus-clusters decision.

use crate::config::{HybridConfig, ZoomThresholds};
use mapquery_types::{ClusterRecord, PointOfInterest, ZoomLevel};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};

/// What a fetch at a given zoom returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ZoomState {
    /// Too far out; nothing is fetched and the caller prompts the user to zoom in.
    MaxZoomedOut,
    /// Pre-aggregated clusters tagged with this level.
    Clustered { level: ZoomLevel },
    /// Individual points, optionally alongside small neighborhood clusters for dense spots.
    Detailed { hybrid: bool },
}

impl ZoomState {
    pub fn fetches_anything(&self) -> bool {
        !matches!(self, ZoomState::MaxZoomedOut)
    }
}

/// Classify a viewport by its longitude span in degrees.
///
/// Each threshold is exclusive: a span exactly at `city_span` is still neighborhood.
pub fn zoom_for_span(longitude_delta: f64, thresholds: &ZoomThresholds) -> ZoomLevel {
    if longitude_delta > thresholds.max_zoom_out_span {
        ZoomLevel::MaxZoomOut
    } else if longitude_delta > thresholds.region_span {
        ZoomLevel::Region
    } else if longitude_delta > thresholds.city_span {
        ZoomLevel::City
    } else {
        ZoomLevel::Neighborhood
    }
}

/// Chooses between clusters and individual points. Stateless.
#[derive(Debug, Clone, Default)]
pub struct ClusterAggregationSelector {
    hybrid: HybridConfig,
}

impl ClusterAggregationSelector {
    pub fn new(hybrid: HybridConfig) -> Self {
        Self { hybrid }
    }

    pub fn select(&self, zoom: ZoomLevel) -> ZoomState {
        match zoom {
            ZoomLevel::MaxZoomOut => ZoomState::MaxZoomedOut,
            ZoomLevel::Region | ZoomLevel::City => ZoomState::Clustered { level: zoom },
            ZoomLevel::Neighborhood => ZoomState::Detailed {
                hybrid: self.hybrid.enabled,
            },
        }
    }

    /// Zoom tag of the clusters fetched in this state, if any.
    pub fn cluster_level(&self, state: ZoomState) -> Option<ZoomLevel> {
        match state {
            ZoomState::MaxZoomedOut => None,
            ZoomState::Clustered { level } => Some(level),
            ZoomState::Detailed { hybrid } => hybrid.then_some(ZoomLevel::Neighborhood),
        }
    }

    /// Fold the hybrid tier into the point list.
    ///
    /// Clusters with at least `min_cluster_size` members are kept and their members
    /// are removed from `points`; smaller clusters are discarded since their members
    /// already appear as points. `absorbed` holds members of clusters returned on
    /// earlier pages, which are removed from `points` as well.
    pub fn resolve_hybrid(
        &self,
        points: Vec<PointOfInterest>,
        clusters: Vec<ClusterRecord>,
        absorbed: &BTreeSet<String>,
    ) -> (Vec<PointOfInterest>, Vec<ClusterRecord>) {
        let clusters: Vec<ClusterRecord> = clusters
            .into_iter()
            .filter(|c| c.count() >= self.hybrid.min_cluster_size)
            .collect();

        let clustered: FxHashSet<&str> = clusters
            .iter()
            .flat_map(|c| c.members().iter().map(|m| m.id.as_str()))
            .collect();
        let points: Vec<PointOfInterest> = points
            .into_iter()
            .filter(|p| !clustered.contains(p.id.as_str()) && !absorbed.contains(&p.id))
            .collect();

        (points, clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use mapquery_types::PoiKind;

    fn poi(id: &str) -> PointOfInterest {
        PointOfInterest::new(id, PoiKind::Restaurant, Point::new(-118.24, 34.05), "9q5ctr")
    }

    #[test]
    fn test_zoom_for_span_thresholds() {
        let t = ZoomThresholds::default();
        assert_eq!(zoom_for_span(0.5, &t), ZoomLevel::MaxZoomOut);
        assert_eq!(zoom_for_span(0.2, &t), ZoomLevel::Region);
        assert_eq!(zoom_for_span(0.05, &t), ZoomLevel::Region);
        assert_eq!(zoom_for_span(0.03, &t), ZoomLevel::City);
        assert_eq!(zoom_for_span(0.01, &t), ZoomLevel::City);
        assert_eq!(zoom_for_span(0.007, &t), ZoomLevel::Neighborhood);
        assert_eq!(zoom_for_span(0.001, &t), ZoomLevel::Neighborhood);
    }

    #[test]
    fn test_select_is_pure_function_of_zoom() {
        let selector = ClusterAggregationSelector::default();
        assert_eq!(selector.select(ZoomLevel::MaxZoomOut), ZoomState::MaxZoomedOut);
        assert_eq!(
            selector.select(ZoomLevel::City),
            ZoomState::Clustered {
                level: ZoomLevel::City
            }
        );
        assert_eq!(
            selector.select(ZoomLevel::Neighborhood),
            ZoomState::Detailed { hybrid: true }
        );
        assert!(!selector.select(ZoomLevel::MaxZoomOut).fetches_anything());
    }

    #[test]
    fn test_hybrid_disabled() {
        let selector = ClusterAggregationSelector::new(HybridConfig {
            enabled: false,
            min_cluster_size: 3,
        });
        let state = selector.select(ZoomLevel::Neighborhood);
        assert_eq!(state, ZoomState::Detailed { hybrid: false });
        assert_eq!(selector.cluster_level(state), None);
    }

    #[test]
    fn test_resolve_hybrid_absorbs_members_of_large_clusters() {
        let selector = ClusterAggregationSelector::default();
        let big = ClusterRecord::new("big", Point::new(0.0, 0.0), vec![poi("a"), poi("b"), poi("c")]);
        let small = ClusterRecord::new("small", Point::new(0.0, 0.0), vec![poi("d"), poi("e")]);
        let points = vec![poi("a"), poi("b"), poi("c"), poi("d"), poi("e"), poi("f")];

        let (points, clusters) =
            selector.resolve_hybrid(points, vec![big, small], &BTreeSet::new());

        let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "e", "f"]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, "big");
    }

    #[test]
    fn test_resolve_hybrid_drops_members_absorbed_on_earlier_pages() {
        let selector = ClusterAggregationSelector::default();
        let absorbed = BTreeSet::from(["a".to_string(), "b".to_string()]);
        let points = vec![poi("a"), poi("b"), poi("g")];

        let (points, clusters) = selector.resolve_hybrid(points, Vec::new(), &absorbed);

        let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["g"]);
        assert!(clusters.is_empty());
    }
}
