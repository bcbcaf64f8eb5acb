//! Raw store records to typed entities.

use crate::error::DecodeError;
use crate::storage::RawRecord;
use mapquery_types::Entity;
use mapquery_types::document::{
    PostClusterDocument, PostDocument, RestaurantClusterDocument, RestaurantDocument,
};
use serde::de::DeserializeOwned;

/// Shape of the documents in a scanned collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    Restaurant,
    Post,
    RestaurantCluster,
    PostCluster,
}

impl RecordClass {
    pub fn is_cluster(&self) -> bool {
        matches!(self, RecordClass::RestaurantCluster | RecordClass::PostCluster)
    }
}

fn parse<T: DeserializeOwned>(
    collection: &str,
    record: &RawRecord,
) -> Result<T, DecodeError> {
    T::deserialize(&record.document).map_err(|e| DecodeError {
        collection: collection.to_string(),
        record_id: record.id.clone(),
        reason: e.to_string(),
    })
}

/// Decode one record. The record's ordering key stands in for a missing geohash.
pub fn decode(class: RecordClass, collection: &str, record: &RawRecord) -> Result<Entity, DecodeError> {
    let fallback = record.key.as_str();
    let converted = match class {
        RecordClass::Restaurant => parse::<RestaurantDocument>(collection, record)?
            .into_point(fallback)
            .map(Entity::from),
        RecordClass::Post => parse::<PostDocument>(collection, record)?
            .into_point(fallback)
            .map(Entity::from),
        RecordClass::RestaurantCluster => parse::<RestaurantClusterDocument>(collection, record)?
            .into_cluster(fallback)
            .map(Entity::from),
        RecordClass::PostCluster => parse::<PostClusterDocument>(collection, record)?
            .into_cluster(fallback)
            .map(Entity::from),
    };

    converted.map_err(|e| DecodeError {
        collection: collection.to_string(),
        record_id: record.id.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, key: &str, document: serde_json::Value) -> RawRecord {
        RawRecord {
            id: id.into(),
            key: key.into(),
            document,
        }
    }

    #[test]
    fn test_decode_restaurant_uses_key_as_fallback_geohash() {
        let record = raw(
            "r1",
            "9q5csy",
            json!({
                "id": "r1",
                "name": "Sushi Gen",
                "categoryName": "Japanese",
                "geoPoint": {"latitude": 34.0466, "longitude": -118.2386}
            }),
        );
        let entity = decode(RecordClass::Restaurant, "restaurants", &record).unwrap();
        let poi = entity.as_point().unwrap();
        assert_eq!(poi.geohash, "9q5csy");
        assert_eq!(poi.attributes.cuisine.as_deref(), Some("Japanese"));
    }

    #[test]
    fn test_decode_post_cluster() {
        let record = raw(
            "pc1",
            "9q5cs",
            json!({
                "id": "pc1",
                "center": {"latitude": 34.05, "longitude": -118.24},
                "count": 1,
                "zoomLevel": "neighborhood",
                "posts": [{
                    "id": "p1",
                    "restaurant": {
                        "id": "r1", "name": "Sushi Gen",
                        "geoPoint": {"latitude": 34.0466, "longitude": -118.2386}
                    },
                    "user": {"id": "u1"}
                }]
            }),
        );
        let entity = decode(RecordClass::PostCluster, "postClusters", &record).unwrap();
        let cluster = entity.as_cluster().unwrap();
        assert_eq!(cluster.count(), 1);
        assert_eq!(cluster.members()[0].attributes.owner_id.as_deref(), Some("u1"));
        assert!(RecordClass::PostCluster.is_cluster());
    }

    #[test]
    fn test_malformed_record_reports_context() {
        let record = raw("bad", "9q5c", json!({"id": "bad", "name": 42}));
        let err = decode(RecordClass::Restaurant, "restaurants", &record).unwrap_err();
        assert_eq!(err.record_id, "bad");
        assert_eq!(err.collection, "restaurants");
    }

    #[test]
    fn test_missing_coordinate_is_a_decode_error() {
        let record = raw("r9", "9q5c", json!({"id": "r9", "name": "Ghost"}));
        let err = decode(RecordClass::Restaurant, "restaurants", &record).unwrap_err();
        assert!(err.reason.contains("no coordinate"));
    }
}
