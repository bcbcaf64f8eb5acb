//! Engine configuration.
//!
//! Every section deserialises with per-field defaults, so a config file only has
//! to name what it changes:
//!
//! ```rust
//! use mapquery::EngineConfig;
//!
//! let json = r#"{ "max_bounds": 4, "strict_radius": true, "zoom": { "city_span": 0.01 } }"#;
//! let config = EngineConfig::from_json(json).unwrap();
//! assert_eq!(config.max_bounds, 4);
//! assert_eq!(config.zoom.city_span, 0.01);
//! assert_eq!(config.zoom.max_zoom_out_span, 0.2);
//! ```

use crate::spatial::DistanceMetric;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How the executor treats a stored record that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// Skip and count the record.
    #[default]
    Lenient,
    /// Fail the whole fetch.
    Strict,
}

/// Longitude-delta thresholds (degrees) separating zoom levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoomThresholds {
    #[serde(default = "ZoomThresholds::default_max_zoom_out_span")]
    pub max_zoom_out_span: f64,
    #[serde(default = "ZoomThresholds::default_region_span")]
    pub region_span: f64,
    #[serde(default = "ZoomThresholds::default_city_span")]
    pub city_span: f64,
}

impl ZoomThresholds {
    const fn default_max_zoom_out_span() -> f64 {
        0.2
    }

    const fn default_region_span() -> f64 {
        0.03
    }

    const fn default_city_span() -> f64 {
        0.007
    }
}

impl Default for ZoomThresholds {
    fn default() -> Self {
        Self {
            max_zoom_out_span: Self::default_max_zoom_out_span(),
            region_span: Self::default_region_span(),
            city_span: Self::default_city_span(),
        }
    }
}

/// Hybrid tier: at the most detailed zoom, also fetch small clusters for dense spots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HybridConfig {
    #[serde(default = "HybridConfig::default_enabled")]
    pub enabled: bool,
    /// Clusters smaller than this are returned as individual points.
    #[serde(default = "HybridConfig::default_min_cluster_size")]
    pub min_cluster_size: usize,
}

impl HybridConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_min_cluster_size() -> usize {
        3
    }
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            min_cluster_size: Self::default_min_cluster_size(),
        }
    }
}

/// How a viewport span is turned into a query radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadiusPolicy {
    #[serde(default = "RadiusPolicy::default_min_meters")]
    pub min_meters: f64,
    #[serde(default = "RadiusPolicy::default_max_meters")]
    pub max_meters: f64,
    /// Applied after clamping.
    #[serde(default = "RadiusPolicy::default_scale")]
    pub scale: f64,
    #[serde(default = "RadiusPolicy::default_meters_per_degree")]
    pub meters_per_degree: f64,
}

impl RadiusPolicy {
    const fn default_min_meters() -> f64 {
        500.0
    }

    const fn default_max_meters() -> f64 {
        50_000.0
    }

    const fn default_scale() -> f64 {
        0.9
    }

    const fn default_meters_per_degree() -> f64 {
        111_319.9
    }
}

impl Default for RadiusPolicy {
    fn default() -> Self {
        Self {
            min_meters: Self::default_min_meters(),
            max_meters: Self::default_max_meters(),
            scale: Self::default_scale(),
            meters_per_degree: Self::default_meters_per_degree(),
        }
    }
}

/// A collection path and the geohash field it is ordered by.
///
/// `{uid}` in the name is replaced with the signed-in user's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    pub name: String,
    pub order_by: String,
}

impl CollectionSpec {
    pub const UID_PLACEHOLDER: &'static str = "{uid}";

    pub fn new(name: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order_by: order_by.into(),
        }
    }

    pub fn requires_identity(&self) -> bool {
        self.name.contains(Self::UID_PLACEHOLDER)
    }

    /// Concrete collection path, or `None` when it needs an identity that is absent.
    pub fn resolve(&self, uid: Option<&str>) -> Option<String> {
        if !self.requires_identity() {
            return Some(self.name.clone());
        }
        uid.map(|uid| self.name.replace(Self::UID_PLACEHOLDER, uid))
    }
}

/// Where each record class lives in the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionLayout {
    #[serde(default = "CollectionLayout::default_restaurants")]
    pub restaurants: CollectionSpec,
    #[serde(default = "CollectionLayout::default_restaurant_clusters")]
    pub restaurant_clusters: CollectionSpec,
    #[serde(default = "CollectionLayout::default_posts")]
    pub posts: CollectionSpec,
    #[serde(default = "CollectionLayout::default_post_clusters")]
    pub post_clusters: CollectionSpec,
    #[serde(default = "CollectionLayout::default_following_posts")]
    pub following_posts: CollectionSpec,
    #[serde(default = "CollectionLayout::default_following_clusters")]
    pub following_clusters: CollectionSpec,
    /// Field holding a cluster's zoom tag.
    #[serde(default = "CollectionLayout::default_zoom_field")]
    pub zoom_field: String,
}

impl CollectionLayout {
    fn default_restaurants() -> CollectionSpec {
        CollectionSpec::new("restaurants", "geoHash")
    }

    fn default_restaurant_clusters() -> CollectionSpec {
        CollectionSpec::new("clusters", "geoHash")
    }

    fn default_posts() -> CollectionSpec {
        CollectionSpec::new("posts", "restaurant.geoHash")
    }

    fn default_post_clusters() -> CollectionSpec {
        CollectionSpec::new("postClusters", "geoHash")
    }

    fn default_following_posts() -> CollectionSpec {
        CollectionSpec::new("userFollowingPosts/{uid}/posts", "restaurant.geoHash")
    }

    fn default_following_clusters() -> CollectionSpec {
        CollectionSpec::new("userFollowingClusters/{uid}/clusters", "geoHash")
    }

    fn default_zoom_field() -> String {
        "zoomLevel".to_string()
    }

    fn all(&self) -> [&CollectionSpec; 6] {
        [
            &self.restaurants,
            &self.restaurant_clusters,
            &self.posts,
            &self.post_clusters,
            &self.following_posts,
            &self.following_clusters,
        ]
    }
}

impl Default for CollectionLayout {
    fn default() -> Self {
        Self {
            restaurants: Self::default_restaurants(),
            restaurant_clusters: Self::default_restaurant_clusters(),
            posts: Self::default_posts(),
            post_clusters: Self::default_post_clusters(),
            following_posts: Self::default_following_posts(),
            following_clusters: Self::default_following_clusters(),
            zoom_field: Self::default_zoom_field(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on compiled geohash ranges per fetch.
    #[serde(default = "EngineConfig::default_max_bounds")]
    pub max_bounds: usize,

    /// Range scans allowed in flight at once.
    #[serde(default = "EngineConfig::default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,

    #[serde(default = "EngineConfig::default_bound_timeout_ms")]
    pub bound_timeout_ms: u64,

    /// Page size used when a query does not set one. Zero means unlimited.
    #[serde(default = "EngineConfig::default_page_size")]
    pub default_page_size: usize,

    #[serde(default)]
    pub decode_mode: DecodeMode,

    /// Drop entities inside the geohash cover but outside the query circle.
    #[serde(default)]
    pub strict_radius: bool,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default)]
    pub zoom: ZoomThresholds,

    #[serde(default)]
    pub hybrid: HybridConfig,

    #[serde(default)]
    pub radius: RadiusPolicy,

    #[serde(default)]
    pub collections: CollectionLayout,

    /// Filter fields the store evaluates itself, mapped to their document path.
    #[serde(default = "EngineConfig::default_native_filter_fields")]
    pub native_filter_fields: BTreeMap<String, String>,

    /// Cluster-document paths for native filter fields stored elsewhere on clusters.
    /// Fields not listed here match clusters at their `native_filter_fields` path.
    #[serde(default = "EngineConfig::default_cluster_filter_paths")]
    pub cluster_filter_paths: BTreeMap<String, String>,
}

impl EngineConfig {
    const fn default_max_bounds() -> usize {
        9
    }

    const fn default_max_concurrent_scans() -> usize {
        9
    }

    const fn default_bound_timeout_ms() -> u64 {
        10_000
    }

    const fn default_page_size() -> usize {
        25
    }

    fn default_native_filter_fields() -> BTreeMap<String, String> {
        BTreeMap::from([("userId".to_string(), "user.id".to_string())])
    }

    fn default_cluster_filter_paths() -> BTreeMap<String, String> {
        BTreeMap::from([("userId".to_string(), "userId".to_string())])
    }

    pub fn bound_timeout(&self) -> Duration {
        Duration::from_millis(self.bound_timeout_ms)
    }

    pub fn with_max_bounds(mut self, max_bounds: usize) -> Self {
        assert!(max_bounds > 0, "Max bounds must be greater than zero");
        self.max_bounds = max_bounds;
        self
    }

    pub fn with_max_concurrent_scans(mut self, scans: usize) -> Self {
        assert!(scans > 0, "Concurrent scans must be greater than zero");
        self.max_concurrent_scans = scans;
        self
    }

    pub fn with_bound_timeout(mut self, timeout: Duration) -> Self {
        self.bound_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.decode_mode = mode;
        self
    }

    pub fn with_strict_radius(mut self, strict: bool) -> Self {
        self.strict_radius = strict;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_zoom_thresholds(mut self, zoom: ZoomThresholds) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    pub fn with_radius_policy(mut self, radius: RadiusPolicy) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_collections(mut self, collections: CollectionLayout) -> Self {
        self.collections = collections;
        self
    }

    /// Let the store evaluate `field` by matching the document value at `path`.
    pub fn with_native_filter_field(
        mut self,
        field: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.native_filter_fields.insert(field.into(), path.into());
        self
    }

    /// Match `field` on cluster documents at `path` instead of its point path.
    pub fn with_cluster_filter_path(
        mut self,
        field: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.cluster_filter_paths.insert(field.into(), path.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_bounds == 0 {
            return Err("Max bounds must be greater than zero".to_string());
        }

        if self.max_concurrent_scans == 0 {
            return Err("Concurrent scans must be greater than zero".to_string());
        }

        if self.bound_timeout_ms == 0 {
            return Err("Bound timeout must be greater than zero".to_string());
        }

        let zoom = &self.zoom;
        if !(zoom.city_span > 0.0
            && zoom.city_span < zoom.region_span
            && zoom.region_span < zoom.max_zoom_out_span)
        {
            return Err(format!(
                "Zoom thresholds must satisfy 0 < city ({}) < region ({}) < max zoom out ({})",
                zoom.city_span, zoom.region_span, zoom.max_zoom_out_span
            ));
        }

        if self.hybrid.min_cluster_size == 0 {
            return Err("Hybrid minimum cluster size must be greater than zero".to_string());
        }

        let radius = &self.radius;
        if !(radius.min_meters >= 0.0 && radius.min_meters <= radius.max_meters) {
            return Err(format!(
                "Radius bounds must satisfy 0 <= min ({}) <= max ({})",
                radius.min_meters, radius.max_meters
            ));
        }
        if !(radius.scale > 0.0 && radius.meters_per_degree > 0.0) {
            return Err("Radius scale and meters per degree must be positive".to_string());
        }

        if let Some((field, _)) = self
            .native_filter_fields
            .iter()
            .find(|(field, path)| field.is_empty() || path.is_empty())
        {
            return Err(format!("Native filter field '{}' needs a document path", field));
        }

        if let Some((field, _)) = self
            .cluster_filter_paths
            .iter()
            .find(|(field, path)| field.is_empty() || path.is_empty())
        {
            return Err(format!("Cluster filter path for '{}' is empty", field));
        }

        for collection in self.collections.all() {
            if collection.name.is_empty() || collection.order_by.is_empty() {
                return Err(format!(
                    "Collection '{}' needs both a name and an order_by field",
                    collection.name
                ));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bounds: Self::default_max_bounds(),
            max_concurrent_scans: Self::default_max_concurrent_scans(),
            bound_timeout_ms: Self::default_bound_timeout_ms(),
            default_page_size: Self::default_page_size(),
            decode_mode: DecodeMode::default(),
            strict_radius: false,
            metric: DistanceMetric::default(),
            zoom: ZoomThresholds::default(),
            hybrid: HybridConfig::default(),
            radius: RadiusPolicy::default(),
            collections: CollectionLayout::default(),
            native_filter_fields: Self::default_native_filter_fields(),
            cluster_filter_paths: Self::default_cluster_filter_paths(),
        }
    }
}
