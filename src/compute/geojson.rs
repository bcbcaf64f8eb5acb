//! GeoJSON export of fetch results.

use crate::error::{MapQueryError, Result};
use crate::query::FetchResult;
use geo::Point;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use mapquery_types::{ClusterRecord, PoiKind, PointOfInterest};
use serde_json::{Map, json};

fn point_geometry(point: &Point) -> Geometry {
    Geometry::new(Value::Point(vec![point.x(), point.y()]))
}

fn feature(id: &str, point: &Point, props: Map<String, serde_json::Value>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(point_geometry(point)),
        id: Some(Id::String(id.to_string())),
        properties: Some(props),
        foreign_members: None,
    }
}

/// A point of interest as a Feature; unset attributes are omitted.
pub fn poi_to_feature(poi: &PointOfInterest) -> Feature {
    let mut props = Map::new();
    let kind = match poi.kind {
        PoiKind::Restaurant => "restaurant",
        PoiKind::Post => "post",
    };
    props.insert("kind".into(), json!(kind));
    props.insert("geohash".into(), json!(poi.geohash));

    let attrs = &poi.attributes;
    let optional = [
        ("name", attrs.name.as_ref().map(|v| json!(v))),
        ("cuisine", attrs.cuisine.as_ref().map(|v| json!(v))),
        ("price", attrs.price.as_ref().map(|v| json!(v))),
        ("rating", attrs.rating.map(|v| json!(v))),
        ("userId", attrs.owner_id.as_ref().map(|v| json!(v))),
        ("restaurantId", attrs.restaurant_id.as_ref().map(|v| json!(v))),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            props.insert(key.into(), value);
        }
    }

    let tags: Vec<&str> = attrs
        .tags
        .iter()
        .filter(|(_, set)| **set)
        .map(|(tag, _)| tag.as_str())
        .collect();
    if !tags.is_empty() {
        props.insert("tags".into(), json!(tags));
    }

    feature(&poi.id, &poi.coordinate, props)
}

/// A cluster as a Feature at its centroid, carrying its count and member ids.
pub fn cluster_to_feature(cluster: &ClusterRecord) -> Feature {
    let mut props = Map::new();
    props.insert("kind".into(), json!("cluster"));
    props.insert("count".into(), json!(cluster.count()));
    props.insert(
        "members".into(),
        json!(cluster.members().iter().map(|m| m.id.as_str()).collect::<Vec<_>>()),
    );
    if let Some(zoom) = cluster.zoom_level {
        props.insert("zoomLevel".into(), json!(zoom.as_tag()));
    }
    if let Some(hash) = &cluster.truncated_geohash {
        props.insert("truncatedGeohash".into(), json!(hash));
    }
    feature(&cluster.id, &cluster.centroid, props)
}

/// Clusters first, then points.
pub fn to_feature_collection(result: &FetchResult) -> FeatureCollection {
    let features = result
        .clusters
        .iter()
        .map(cluster_to_feature)
        .chain(result.points.iter().map(poi_to_feature))
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn to_geojson_string(result: &FetchResult) -> Result<String> {
    serde_json::to_string(&to_feature_collection(result)).map_err(|e| {
        MapQueryError::Serialization(format!("Failed to serialize feature collection: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::filter::Filters;
    use crate::compute::zoom::ZoomState;
    use crate::query::EntityKind;
    use mapquery_types::{PoiAttributes, ZoomLevel};

    fn sample_result() -> FetchResult {
        let mut attributes = PoiAttributes {
            name: Some("Sushi Gen".into()),
            cuisine: Some("Japanese".into()),
            ..Default::default()
        };
        attributes.tags.insert("dateNight".into(), true);
        attributes.tags.insert("brunch".into(), false);
        let poi = PointOfInterest::new("r1", PoiKind::Restaurant, Point::new(-118.2386, 34.0466), "9q5csy")
            .with_attributes(attributes);
        let cluster = ClusterRecord::new("c1", Point::new(-118.24, 34.05), vec![poi.clone()])
            .with_zoom_level(ZoomLevel::Neighborhood);

        let mut result = FetchResult::empty(
            EntityKind::Restaurant,
            ZoomState::Detailed { hybrid: true },
            Filters::new().signature(),
        );
        result.points.push(poi);
        result.clusters.push(cluster);
        result
    }

    #[test]
    fn test_feature_collection_order_and_properties() {
        let collection = to_feature_collection(&sample_result());
        assert_eq!(collection.features.len(), 2);

        let cluster = &collection.features[0];
        let props = cluster.properties.as_ref().unwrap();
        assert_eq!(props["kind"], json!("cluster"));
        assert_eq!(props["count"], json!(1));
        assert_eq!(props["zoomLevel"], json!("neighborhood"));

        let point = &collection.features[1];
        let props = point.properties.as_ref().unwrap();
        assert_eq!(props["cuisine"], json!("Japanese"));
        assert_eq!(props["tags"], json!(["dateNight"]));
        assert!(!props.contains_key("price"));
    }

    #[test]
    fn test_geojson_string() {
        let json = to_geojson_string(&sample_result()).unwrap();
        assert!(json.contains("FeatureCollection"));
        assert!(json.contains("-118.2386"));
    }
}
