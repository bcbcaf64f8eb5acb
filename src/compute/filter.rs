//! Attribute filters and the post-fetch filter pass.
//!
//! A [`Filters`] value maps a field to the set of values it accepts. Field names are
//! normalised on insert (`categoryName` and `restaurant.cuisine` both become
//! `cuisine`), empty value sets are dropped, and the map is ordered, so two filter
//! sets that mean the same thing hash to the same [`FilterSignature`].
//!
//! Fields understood after fetching:
//!
//! | field       | accepts                         | matches when                          |
//! |-------------|---------------------------------|---------------------------------------|
//! | `cuisine`   | text                            | the entity's cuisine is in the set    |
//! | `price`     | text                            | the entity's price tier is in the set |
//! | `minRating` | numbers                         | rating >= the smallest value          |
//! | `tags`      | text                            | any listed tag is set on the entity   |
//! | `userId`    | text                            | the post's author is in the set       |
//!
//! `location` is accepted and ignored; the viewport already constrains location.

use crate::error::{MapQueryError, Result};
use crate::spatial::{DistanceMetric, within_radius};
use crate::storage::EqualityFilter;
use geo::Point;
use mapquery_types::{Entity, PointOfInterest};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

pub const CUISINE: &str = "cuisine";
pub const PRICE: &str = "price";
pub const MIN_RATING: &str = "minRating";
pub const TAGS: &str = "tags";
pub const USER_ID: &str = "userId";

const IGNORED_FIELDS: &[&str] = &["location"];

fn canonical_field(field: &str) -> Option<&str> {
    match field {
        "categoryName" | "restaurant.cuisine" | CUISINE => Some(CUISINE),
        "restaurant.price" | PRICE => Some(PRICE),
        f if IGNORED_FIELDS.contains(&f) => None,
        other => Some(other),
    }
}

fn is_post_fetch_field(field: &str) -> bool {
    matches!(field, CUISINE | PRICE | MIN_RATING | TAGS | USER_ID)
}

/// One accepted value of a filter field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            FilterValue::Number(_) => None,
        }
    }

    /// Numbers, and text that parses as one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) => Some(*n),
            FilterValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Number(n) => serde_json::json!(n),
            FilterValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FilterValue {}

impl PartialOrd for FilterValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilterValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FilterValue::Number(a), FilterValue::Number(b)) => a.total_cmp(b),
            (FilterValue::Text(a), FilterValue::Text(b)) => a.cmp(b),
            (FilterValue::Number(_), FilterValue::Text(_)) => Ordering::Less,
            (FilterValue::Text(_), FilterValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl Hash for FilterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FilterValue::Number(n) => {
                0u8.hash(state);
                n.to_bits().hash(state);
            }
            FilterValue::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Number(n) => write!(f, "{n}"),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

/// Stable fingerprint of a normalised filter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterSignature(pub u64);

impl fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Field name to accepted values. An absent field places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filters {
    fields: BTreeMap<String, BTreeSet<FilterValue>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Filters::insert`].
    pub fn with<V, I>(mut self, field: &str, values: I) -> Self
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        self.insert(field, values);
        self
    }

    /// Replace the accepted values for `field`. An empty set removes the field.
    pub fn insert<V, I>(&mut self, field: &str, values: I)
    where
        V: Into<FilterValue>,
        I: IntoIterator<Item = V>,
    {
        let Some(field) = canonical_field(field) else {
            return;
        };
        let values: BTreeSet<FilterValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.fields.remove(field);
        } else {
            self.fields.insert(field.to_string(), values);
        }
    }

    pub fn get(&self, field: &str) -> Option<&BTreeSet<FilterValue>> {
        canonical_field(field).and_then(|f| self.fields.get(f))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<FilterValue>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn signature(&self) -> FilterSignature {
        let mut hasher = FxHasher::default();
        self.fields.hash(&mut hasher);
        FilterSignature(hasher.finish())
    }

    /// Split into constraints the store evaluates and those applied after fetching.
    ///
    /// `native_fields` maps a filter field to the document path the store can match
    /// by equality. Cluster documents use the same path unless `cluster_paths`
    /// names another one. A native field the post-fetch pass also understands is
    /// checked twice, which is harmless. Any other field is rejected.
    pub fn plan(
        &self,
        native_fields: &BTreeMap<String, String>,
        cluster_paths: &BTreeMap<String, String>,
    ) -> Result<FilterPlan> {
        let mut store_side = Vec::new();
        let mut cluster_side = Vec::new();
        let mut post_fetch = Filters::new();

        for (field, values) in &self.fields {
            let native = native_fields.get(field);
            if native.is_none() && !is_post_fetch_field(field) {
                return Err(MapQueryError::InvalidInput(format!(
                    "Unsupported filter field: {}",
                    field
                )));
            }

            if field == MIN_RATING && values.iter().any(|v| v.as_number().is_none()) {
                return Err(MapQueryError::InvalidInput(format!(
                    "{} accepts numbers only",
                    MIN_RATING
                )));
            }

            if let Some(path) = native {
                let values: Vec<serde_json::Value> =
                    values.iter().map(FilterValue::to_json).collect();
                let cluster_path = cluster_paths.get(field).unwrap_or(path);
                cluster_side.push(EqualityFilter::new(cluster_path.clone(), values.clone()));
                store_side.push(EqualityFilter::new(path.clone(), values));
            }
            if is_post_fetch_field(field) {
                post_fetch.fields.insert(field.clone(), values.clone());
            }
        }

        Ok(FilterPlan {
            store_side,
            cluster_side,
            post_fetch,
        })
    }
}

/// Where each filter constraint is evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPlan {
    /// Equality constraints for point scans.
    pub store_side: Vec<EqualityFilter>,
    /// The same constraints, addressed to cluster documents.
    pub cluster_side: Vec<EqualityFilter>,
    pub post_fetch: Filters,
}

fn text_in(value: Option<&str>, accepted: &BTreeSet<FilterValue>) -> bool {
    value.is_some_and(|v| accepted.iter().any(|a| a.as_text() == Some(v)))
}

/// Whether a single point passes every post-fetch constraint.
pub fn matches(poi: &PointOfInterest, filters: &Filters) -> bool {
    let attrs = &poi.attributes;
    filters.iter().all(|(field, accepted)| match field {
        CUISINE => text_in(attrs.cuisine.as_deref(), accepted),
        PRICE => text_in(attrs.price.as_deref(), accepted),
        USER_ID => text_in(attrs.owner_id.as_deref(), accepted),
        TAGS => accepted
            .iter()
            .filter_map(FilterValue::as_text)
            .any(|tag| poi.has_tag(tag)),
        MIN_RATING => {
            let threshold = accepted
                .iter()
                .filter_map(FilterValue::as_number)
                .fold(f64::INFINITY, f64::min);
            attrs.rating.is_some_and(|r| r >= threshold)
        }
        // Store-side only.
        _ => true,
    })
}

/// Result of a post-fetch filter pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub entities: Vec<Entity>,
    /// Points rejected, standalone or as cluster members.
    pub points_rejected: usize,
    /// Clusters left with no members.
    pub clusters_dropped: usize,
}

/// Apply `filters` to points and to cluster members.
///
/// Every surviving cluster comes out with `count == members.len() > 0`, even when
/// no filter applies. Pure, so applying the same filters again changes nothing.
pub fn apply_filters(entities: Vec<Entity>, filters: &Filters) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        entities: Vec::with_capacity(entities.len()),
        ..Default::default()
    };

    for entity in entities {
        match entity {
            Entity::Point(poi) => {
                if matches(&poi, filters) {
                    outcome.entities.push(Entity::Point(poi));
                } else {
                    outcome.points_rejected += 1;
                }
            }
            Entity::Cluster(cluster) => {
                let members: Vec<PointOfInterest> = cluster.members().to_vec();
                let before = members.len();
                let kept: Vec<PointOfInterest> =
                    members.into_iter().filter(|m| matches(m, filters)).collect();
                outcome.points_rejected += before - kept.len();
                match cluster.with_members(kept) {
                    Some(cluster) => outcome.entities.push(Entity::Cluster(cluster)),
                    None => outcome.clusters_dropped += 1,
                }
            }
        }
    }

    outcome
}

/// Keep entities whose location (cluster centroid for clusters) is within the circle.
///
/// Returns the survivors and how many were dropped.
pub fn retain_within_radius(
    entities: Vec<Entity>,
    center: &Point,
    radius_m: f64,
    metric: DistanceMetric,
) -> (Vec<Entity>, usize) {
    let before = entities.len();
    let kept: Vec<Entity> = entities
        .into_iter()
        .filter(|e| within_radius(center, &e.coordinate(), radius_m, metric))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
