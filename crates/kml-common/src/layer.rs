//! Layer definitions.

use serde::{Deserialize, Serialize};

use crate::style::Color;
use crate::Envelope;

/// Unique identifier for a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a qualified layer ID like "topp:roads"
    pub fn parse(s: &str) -> (Option<&str>, &str) {
        match s.split_once(':') {
            Some((workspace, name)) => (Some(workspace), name),
            None => (None, s),
        }
    }

    /// The layer name without its workspace prefix.
    pub fn local_name(&self) -> &str {
        Self::parse(&self.0).1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// Features with geometries and attributes.
    Vector,
    /// Imagery only; always encoded as ground overlays.
    Raster,
}

/// A map layer definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayer {
    /// Unique layer identifier
    pub id: LayerId,

    /// Human-readable title
    pub title: String,

    pub kind: LayerKind,

    /// Feature type name used to select feature-type styles; defaults to the
    /// layer's local name.
    #[serde(default)]
    pub feature_type: Option<String>,

    /// Name of the style used when a request names none.
    pub default_style: String,

    /// Other styles this layer may be drawn with.
    #[serde(default)]
    pub styles: Vec<String>,

    /// Regionating strategy used when a request asks for `auto`.
    #[serde(default)]
    pub regionate_strategy: Option<String>,

    /// Geographic bounding box (always in EPSG:4326)
    #[serde(default)]
    pub bounds: Option<Envelope>,

    /// GeoJSON file backing a vector layer, relative to the config directory.
    #[serde(default)]
    pub source: Option<String>,

    /// Colour used when painting the raster form of the layer.
    #[serde(default)]
    pub raster_color: Option<Color>,

    #[serde(default)]
    pub attribution: Option<String>,
}

impl MapLayer {
    pub fn is_vector(&self) -> bool {
        self.kind == LayerKind::Vector
    }

    pub fn feature_type_name(&self) -> &str {
        self.feature_type
            .as_deref()
            .unwrap_or_else(|| self.id.local_name())
    }

    /// Check whether the layer may be drawn with the named style.
    pub fn supports_style(&self, name: &str) -> bool {
        self.default_style == name || self.styles.iter().any(|s| s == name)
    }
}
