use serde::{Deserialize, Serialize};
use std::fmt;

/// Zoom tag attached to pre-aggregated cluster records.
///
/// Ordered from most detailed to coarsest; `MaxZoomOut` is the sentinel past which
/// nothing is fetched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ZoomLevel {
    #[default]
    Neighborhood,
    City,
    Region,
    MaxZoomOut,
}

impl ZoomLevel {
    pub const ALL: [ZoomLevel; 4] = [
        ZoomLevel::Neighborhood,
        ZoomLevel::City,
        ZoomLevel::Region,
        ZoomLevel::MaxZoomOut,
    ];

    /// The string stored in a cluster document's `zoomLevel` field.
    pub fn as_tag(&self) -> &'static str {
        match self {
            ZoomLevel::Neighborhood => "neighborhood",
            ZoomLevel::City => "city",
            ZoomLevel::Region => "region",
            ZoomLevel::MaxZoomOut => "max_zoom_out",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_tag() == tag)
    }

    pub fn is_max_zoom_out(&self) -> bool {
        matches!(self, ZoomLevel::MaxZoomOut)
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for level in ZoomLevel::ALL {
            assert_eq!(ZoomLevel::from_tag(level.as_tag()), Some(level));
        }
        assert_eq!(ZoomLevel::from_tag("street"), None);
    }

    #[test]
    fn test_ordering_puts_sentinel_last() {
        assert!(ZoomLevel::Neighborhood < ZoomLevel::City);
        assert!(ZoomLevel::City < ZoomLevel::Region);
        assert_eq!(ZoomLevel::ALL.iter().max(), Some(&ZoomLevel::MaxZoomOut));
    }

    #[test]
    fn test_serde_uses_wire_tags() {
        let json = serde_json::to_string(&ZoomLevel::MaxZoomOut).unwrap();
        assert_eq!(json, "\"max_zoom_out\"");
    }
}
