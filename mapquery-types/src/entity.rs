//! Decoded map entities.
//!
//! Everything a viewport fetch hands back is either an individual [`PointOfInterest`]
//! or a pre-aggregated [`ClusterRecord`] wrapping a list of them.

use crate::zoom::ZoomLevel;
use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an individual point of interest represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiKind {
    Restaurant,
    Post,
}

/// Filterable attributes of a point of interest.
///
/// Posts inherit `cuisine` and `price` from the restaurant they were made at and
/// carry their own rating; restaurants carry an aggregate rating when one exists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoiAttributes {
    pub name: Option<String>,
    pub cuisine: Option<String>,
    pub price: Option<String>,
    pub rating: Option<f64>,
    /// Boolean occasion tags such as `goodForGroups`.
    pub tags: BTreeMap<String, bool>,
    /// Author of a post.
    pub owner_id: Option<String>,
    /// Restaurant a post belongs to.
    pub restaurant_id: Option<String>,
}

/// A single restaurant or post placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub kind: PoiKind,
    pub coordinate: Point<f64>,
    pub geohash: String,
    pub attributes: PoiAttributes,
}

impl PointOfInterest {
    pub fn new(
        id: impl Into<String>,
        kind: PoiKind,
        coordinate: Point<f64>,
        geohash: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            coordinate,
            geohash: geohash.into(),
            attributes: PoiAttributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: PoiAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether the tag is present and set to `true`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.attributes.tags.get(tag).copied().unwrap_or(false)
    }
}

/// A pre-aggregated group of nearby points of interest.
///
/// `count` mirrors `members.len()`; [`ClusterRecord::with_members`] is the only way
/// to replace the member list and keeps the two in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: String,
    pub centroid: Point<f64>,
    pub zoom_level: Option<ZoomLevel>,
    pub truncated_geohash: Option<String>,
    pub geohash: Option<String>,
    members: Vec<PointOfInterest>,
    count: usize,
}

impl ClusterRecord {
    pub fn new(id: impl Into<String>, centroid: Point<f64>, members: Vec<PointOfInterest>) -> Self {
        let count = members.len();
        Self {
            id: id.into(),
            centroid,
            zoom_level: None,
            truncated_geohash: None,
            geohash: None,
            members,
            count,
        }
    }

    /// Rebuild a cluster whose stored count may disagree with its member list.
    ///
    /// Used when decoding documents; callers normalise through `with_members`.
    pub fn from_stored(
        id: impl Into<String>,
        centroid: Point<f64>,
        members: Vec<PointOfInterest>,
        stored_count: usize,
    ) -> Self {
        let mut record = Self::new(id, centroid, members);
        record.count = stored_count;
        record
    }

    pub fn with_zoom_level(mut self, zoom_level: ZoomLevel) -> Self {
        self.zoom_level = Some(zoom_level);
        self
    }

    pub fn with_geohashes(mut self, truncated: Option<String>, full: Option<String>) -> Self {
        self.truncated_geohash = truncated;
        self.geohash = full;
        self
    }

    pub fn members(&self) -> &[PointOfInterest] {
        &self.members
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Replace the member list, recomputing `count`.
    ///
    /// Returns `None` when no members remain, since an empty cluster must never be emitted.
    pub fn with_members(mut self, members: Vec<PointOfInterest>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        self.count = members.len();
        self.members = members;
        Some(self)
    }

    pub fn is_consistent(&self) -> bool {
        self.count == self.members.len() && self.count > 0
    }

    pub fn into_members(self) -> Vec<PointOfInterest> {
        self.members
    }
}

/// Anything a range scan can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Point(PointOfInterest),
    Cluster(ClusterRecord),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Point(poi) => &poi.id,
            Entity::Cluster(cluster) => &cluster.id,
        }
    }

    /// Location used for distance checks: the point itself or the cluster centroid.
    pub fn coordinate(&self) -> Point<f64> {
        match self {
            Entity::Point(poi) => poi.coordinate,
            Entity::Cluster(cluster) => cluster.centroid,
        }
    }

    pub fn as_point(&self) -> Option<&PointOfInterest> {
        match self {
            Entity::Point(poi) => Some(poi),
            Entity::Cluster(_) => None,
        }
    }

    pub fn as_cluster(&self) -> Option<&ClusterRecord> {
        match self {
            Entity::Cluster(cluster) => Some(cluster),
            Entity::Point(_) => None,
        }
    }
}

impl From<PointOfInterest> for Entity {
    fn from(value: PointOfInterest) -> Self {
        Entity::Point(value)
    }
}

impl From<ClusterRecord> for Entity {
    fn from(value: ClusterRecord) -> Self {
        Entity::Cluster(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(id: &str) -> PointOfInterest {
        PointOfInterest::new(id, PoiKind::Restaurant, Point::new(-118.24, 34.05), "9q5ctr")
    }

    #[test]
    fn test_cluster_count_tracks_members() {
        let cluster = ClusterRecord::new("c1", Point::new(-118.24, 34.05), vec![poi("a"), poi("b")]);
        assert_eq!(cluster.count(), 2);
        assert!(cluster.is_consistent());

        let narrowed = cluster.with_members(vec![poi("a")]).unwrap();
        assert_eq!(narrowed.count(), 1);
        assert_eq!(narrowed.members()[0].id, "a");
    }

    #[test]
    fn test_cluster_with_no_members_is_dropped() {
        let cluster = ClusterRecord::new("c1", Point::new(0.0, 0.0), vec![poi("a")]);
        assert!(cluster.with_members(Vec::new()).is_none());
    }

    #[test]
    fn test_stored_count_can_disagree_until_normalised() {
        let cluster = ClusterRecord::from_stored("c1", Point::new(0.0, 0.0), vec![poi("a")], 7);
        assert!(!cluster.is_consistent());
        let members = cluster.members().to_vec();
        let fixed = cluster.with_members(members).unwrap();
        assert!(fixed.is_consistent());
    }

    #[test]
    fn test_tags_default_to_false() {
        let mut attributes = PoiAttributes::default();
        attributes.tags.insert("goodForGroups".into(), true);
        attributes.tags.insert("dateNight".into(), false);
        let p = poi("a").with_attributes(attributes);
        assert!(p.has_tag("goodForGroups"));
        assert!(!p.has_tag("dateNight"));
        assert!(!p.has_tag("brunch"));
    }

    #[test]
    fn test_entity_accessors() {
        let point: Entity = poi("a").into();
        assert_eq!(point.id(), "a");
        assert!(point.as_point().is_some());
        assert!(point.as_cluster().is_none());

        let cluster: Entity = ClusterRecord::new("c", Point::new(1.0, 2.0), vec![poi("a")]).into();
        assert_eq!(cluster.coordinate(), Point::new(1.0, 2.0));
    }
}
