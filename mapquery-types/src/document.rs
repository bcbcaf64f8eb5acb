//! Stored document shapes.
//!
//! These mirror the camelCase JSON documents the backing store returns. Optional
//! fields are tolerated; a document that cannot be placed on the map (no coordinate)
//! fails conversion with a [`DocumentError`].

use crate::coord::GeoPoint;
use crate::entity::{ClusterRecord, PoiAttributes, PoiKind, PointOfInterest};
use crate::zoom::ZoomLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("document {id} has no coordinate")]
    MissingCoordinate { id: String },

    #[error("document {id} has an unknown zoom level tag: {tag}")]
    UnknownZoomLevel { id: String, tag: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantStats {
    #[serde(default)]
    pub post_count: Option<u64>,
    #[serde(default)]
    pub overall_rating: Option<f64>,
}

/// A document in the restaurants collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantDocument {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "cuisine")]
    pub category_name: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub geo_point: Option<GeoPoint>,
    #[serde(default)]
    pub geo_hash: Option<String>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    pub stats: Option<RestaurantStats>,
}

impl RestaurantDocument {
    /// Convert to a point; `fallback_geohash` is used when the document omits its own.
    pub fn into_point(self, fallback_geohash: &str) -> Result<PointOfInterest, DocumentError> {
        let coordinate = self
            .geo_point
            .ok_or_else(|| DocumentError::MissingCoordinate {
                id: self.id.clone(),
            })?;

        let attributes = PoiAttributes {
            name: Some(self.name),
            cuisine: self.category_name,
            price: self.price,
            rating: self.stats.and_then(|s| s.overall_rating),
            tags: self.attributes.unwrap_or_default(),
            owner_id: None,
            restaurant_id: None,
        };

        let geohash = self.geo_hash.unwrap_or_else(|| fallback_geohash.to_string());
        Ok(
            PointOfInterest::new(self.id, PoiKind::Restaurant, coordinate.to_point(), geohash)
                .with_attributes(attributes),
        )
    }
}

/// Restaurant summary embedded in posts and clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedRestaurant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub geo_point: Option<GeoPoint>,
    #[serde(default, alias = "fullGeoHash")]
    pub geo_hash: Option<String>,
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, bool>>,
}

impl EmbeddedRestaurant {
    fn into_point(self, fallback_geohash: &str) -> Result<PointOfInterest, DocumentError> {
        RestaurantDocument {
            id: self.id,
            name: self.name,
            category_name: self.cuisine,
            price: self.price,
            geo_point: self.geo_point,
            geo_hash: self.geo_hash,
            attributes: self.attributes,
            stats: None,
        }
        .into_point(fallback_geohash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// A document in a posts collection, or a post embedded in a post cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDocument {
    pub id: String,
    pub restaurant: EmbeddedRestaurant,
    pub user: PostAuthor,
    #[serde(default)]
    pub overall_rating: Option<f64>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl PostDocument {
    /// Convert to a point placed at the post's restaurant.
    pub fn into_point(self, fallback_geohash: &str) -> Result<PointOfInterest, DocumentError> {
        let restaurant_id = self.restaurant.id.clone();
        let restaurant = self.restaurant.into_point(fallback_geohash)?;

        let attributes = PoiAttributes {
            name: restaurant.attributes.name,
            cuisine: restaurant.attributes.cuisine,
            price: restaurant.attributes.price,
            rating: self.overall_rating,
            tags: restaurant.attributes.tags,
            owner_id: Some(self.user.id),
            restaurant_id: Some(restaurant_id),
        };

        Ok(PointOfInterest::new(
            self.id,
            PoiKind::Post,
            restaurant.coordinate,
            restaurant.geohash,
        )
        .with_attributes(attributes))
    }
}

fn parse_zoom(id: &str, tag: Option<String>) -> Result<Option<ZoomLevel>, DocumentError> {
    match tag {
        None => Ok(None),
        Some(tag) => ZoomLevel::from_tag(&tag)
            .map(Some)
            .ok_or_else(|| DocumentError::UnknownZoomLevel {
                id: id.to_string(),
                tag,
            }),
    }
}

/// A pre-aggregated restaurant cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantClusterDocument {
    pub id: String,
    pub center: GeoPoint,
    #[serde(default)]
    pub restaurants: Vec<EmbeddedRestaurant>,
    pub count: usize,
    #[serde(default)]
    pub zoom_level: Option<String>,
    #[serde(default)]
    pub truncated_geo_hash: Option<String>,
    #[serde(default)]
    pub geo_hash: Option<String>,
}

impl RestaurantClusterDocument {
    /// Convert to a cluster. The stored count is kept as-is; the filter stage
    /// normalises it against the member list.
    pub fn into_cluster(self, fallback_geohash: &str) -> Result<ClusterRecord, DocumentError> {
        let zoom = parse_zoom(&self.id, self.zoom_level)?;
        let members = self
            .restaurants
            .into_iter()
            .map(|r| r.into_point(fallback_geohash))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cluster =
            ClusterRecord::from_stored(self.id, self.center.to_point(), members, self.count)
                .with_geohashes(self.truncated_geo_hash, self.geo_hash);
        if let Some(zoom) = zoom {
            cluster = cluster.with_zoom_level(zoom);
        }
        Ok(cluster)
    }
}

/// A pre-aggregated cluster of posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostClusterDocument {
    pub id: String,
    pub center: GeoPoint,
    #[serde(default)]
    pub posts: Vec<PostDocument>,
    pub count: usize,
    #[serde(default)]
    pub zoom_level: Option<String>,
    #[serde(default)]
    pub truncated_geo_hash: Option<String>,
    #[serde(default)]
    pub geo_hash: Option<String>,
}

impl PostClusterDocument {
    pub fn into_cluster(self, fallback_geohash: &str) -> Result<ClusterRecord, DocumentError> {
        let zoom = parse_zoom(&self.id, self.zoom_level)?;
        let members = self
            .posts
            .into_iter()
            .map(|p| p.into_point(fallback_geohash))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cluster =
            ClusterRecord::from_stored(self.id, self.center.to_point(), members, self.count)
                .with_geohashes(self.truncated_geo_hash, self.geo_hash);
        if let Some(zoom) = zoom {
            cluster = cluster.with_zoom_level(zoom);
        }
        Ok(cluster)
    }
}
