//! Engine builder
//!
//! Wires a backing store, a session provider and a configuration into a
//! [`MapQueryEngine`]. Everything has a default: an empty in-memory store, no
//! signed-in user and [`EngineConfig::default`].

use crate::config::EngineConfig;
use crate::engine::{EngineInner, MapQueryEngine};
use crate::error::{MapQueryError, Result};
use crate::session::{AnonymousSession, SessionProvider};
use crate::storage::{MemoryStore, RangeStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder for [`MapQueryEngine`].
pub struct EngineBuilder {
    store: Option<Arc<dyn RangeStore>>,
    session: Option<Arc<dyn SessionProvider>>,
    config: EngineConfig,
    config_path: Option<PathBuf>,
}

impl EngineBuilder {
    /// Create a new builder with the in-memory defaults.
    pub fn new() -> Self {
        Self {
            store: None,
            session: None,
            config: EngineConfig::default(),
            config_path: None,
        }
    }

    /// Set the store range scans run against.
    pub fn store(mut self, store: Arc<dyn RangeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set where the signed-in user comes from.
    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the engine configuration. Replaced by [`EngineBuilder::config_path`] if both are set.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a file when building. `.toml` files need the
    /// `toml` feature; anything else is read as JSON.
    pub fn config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Build the engine. Fails if the configuration cannot be loaded or is invalid.
    pub fn build(self) -> Result<MapQueryEngine> {
        let config = match &self.config_path {
            Some(path) => load_config(path)?,
            None => self.config,
        };
        config.validate().map_err(MapQueryError::Config)?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn RangeStore>);
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(AnonymousSession) as Arc<dyn SessionProvider>);

        log::debug!(
            "building engine: max_bounds={}, concurrent scans={}, decode={:?}",
            config.max_bounds,
            config.max_concurrent_scans,
            config.decode_mode
        );

        Ok(MapQueryEngine {
            inner: Arc::new(EngineInner::new(store, session, config)),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MapQueryError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;

    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        #[cfg(feature = "toml")]
        {
            return EngineConfig::from_toml(&text)
                .map_err(|e| MapQueryError::Config(format!("{}: {}", path.display(), e)));
        }
        #[cfg(not(feature = "toml"))]
        {
            return Err(MapQueryError::Config(format!(
                "{}: TOML configuration needs the `toml` feature",
                path.display()
            )));
        }
    }

    EngineConfig::from_json(&text)
        .map_err(|e| MapQueryError::Config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecodeMode;
    use std::io::Write;

    #[test]
    fn test_builder_default() {
        let engine = EngineBuilder::new().build().unwrap();
        assert_eq!(engine.config().max_bounds, 9);
    }

    #[test]
    fn test_builder_with_config() {
        let config = EngineConfig::default()
            .with_max_bounds(4)
            .with_decode_mode(DecodeMode::Strict);
        let engine = EngineBuilder::new().config(config).build().unwrap();
        assert_eq!(engine.config().max_bounds, 4);
        assert_eq!(engine.config().decode_mode, DecodeMode::Strict);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.bound_timeout_ms = 0;
        assert!(matches!(
            EngineBuilder::new().config(config).build(),
            Err(MapQueryError::Config(_))
        ));
    }

    #[test]
    fn test_builder_json_config_path() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "max_bounds": 5, "strict_radius": true }}"#).unwrap();

        let engine = EngineBuilder::new().config_path(file.path()).build().unwrap();
        assert_eq!(engine.config().max_bounds, 5);
        assert!(engine.config().strict_radius);
    }

    #[test]
    fn test_builder_missing_config_file() {
        let result = EngineBuilder::new()
            .config_path("/nonexistent/mapquery.json")
            .build();
        assert!(matches!(result, Err(MapQueryError::Config(_))));
    }
}
