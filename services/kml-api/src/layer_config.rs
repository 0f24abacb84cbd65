//! Layer, style and feature configuration.
//!
//! Everything is read once at startup from the config directory:
//! `kml.yaml` holds the encoder defaults, `layers/*.yaml` the layer
//! definitions, `styles/*.yaml` one style each, and vector layers point at
//! GeoJSON files relative to the directory.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use kml_common::style::StyleConfig;
use kml_common::{KmlError, KmlResult, MapLayer, Style};
use kml_encoder::{FeatureSource, KmlSettings, MemoryFeatureSource};
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

pub const SETTINGS_FILE: &str = "kml.yaml";

#[derive(Debug, Deserialize)]
struct YamlLayerFile {
    layers: Vec<MapLayer>,
}

/// A configured layer and, for vector layers, its features.
#[derive(Debug)]
pub struct LayerEntry {
    pub layer: MapLayer,
    pub source: Option<MemoryFeatureSource>,
}

/// Every layer and style the service can draw.
#[derive(Debug, Default)]
pub struct Catalog {
    layers: HashMap<String, LayerEntry>,
    styles: HashMap<String, Style>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `styles/` and then `layers/` under `config_dir`. Missing
    /// directories are logged and leave the catalog empty; unreadable or
    /// malformed files are errors.
    pub fn load_from_directory<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let mut catalog = Self::new();

        for path in config_files(&config_dir.join("styles"), YAML) {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("reading style file {}", path.display()))?;
            let style: Style = serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing style file {}", path.display()))?;
            style
                .validate()
                .map_err(|e| anyhow!("style {} in {}: {}", style.name, path.display(), e))?;
            catalog.insert_style(style);
        }

        // JSON bundles may hold several named styles.
        for path in config_files(&config_dir.join("styles"), &["json"]) {
            let bundle = StyleConfig::from_file(&path)
                .and_then(|bundle| bundle.validate().map(|_| bundle))
                .map_err(|e| anyhow!("style bundle {}: {}", path.display(), e))?;
            for (_, style) in bundle.styles {
                catalog.insert_style(style);
            }
        }

        for path in config_files(&config_dir.join("layers"), YAML) {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("reading layer file {}", path.display()))?;
            let file: YamlLayerFile = serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing layer file {}", path.display()))?;

            for layer in file.layers {
                let source = match (&layer.source, layer.is_vector()) {
                    (Some(relative), true) => {
                        Some(load_geojson(&config_dir.join(relative), &layer)?)
                    }
                    (None, true) => {
                        warn!(
                            layer = %layer.id,
                            "Vector layer has no feature file, serving it empty"
                        );
                        Some(MemoryFeatureSource::default())
                    }
                    (_, false) => None,
                };
                catalog.insert_layer(layer, source);
            }
        }

        for entry in catalog.layers.values() {
            if catalog.style(&entry.layer.default_style).is_none() {
                return Err(anyhow!(
                    "layer {} uses undefined default style {}",
                    entry.layer.id,
                    entry.layer.default_style
                ));
            }
        }

        info!(
            layers = catalog.layers.len(),
            styles = catalog.styles.len(),
            "Layer catalog loaded"
        );
        Ok(catalog)
    }

    /// Add a layer. A vector layer without configured bounds takes the
    /// extent of its features.
    pub fn insert_layer(&mut self, mut layer: MapLayer, source: Option<MemoryFeatureSource>) {
        if layer.bounds.is_none() {
            if let Some(extent) = source.as_ref().map(|s| s.bounds()) {
                if !extent.is_null() {
                    layer.bounds = Some(extent);
                }
            }
        }
        self.layers
            .insert(layer.id.as_str().to_string(), LayerEntry { layer, source });
    }

    pub fn insert_style(&mut self, style: Style) {
        self.styles.insert(style.name.clone(), style);
    }

    pub fn layer(&self, name: &str) -> KmlResult<&LayerEntry> {
        self.layers
            .get(name)
            .or_else(|| {
                self.layers
                    .values()
                    .find(|e| e.layer.id.as_str().eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| KmlError::LayerNotFound(name.to_string()))
    }

    pub fn style(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }

    /// The style a layer is drawn with. An empty name means the layer's
    /// default style; any other name must be one the layer offers.
    pub fn resolve_style(&self, layer: &MapLayer, requested: &str) -> KmlResult<&Style> {
        let name = if requested.is_empty() {
            layer.default_style.as_str()
        } else if layer.supports_style(requested) {
            requested
        } else {
            return Err(KmlError::StyleNotFound(format!(
                "{} is not a style of layer {}",
                requested, layer.id
            )));
        };
        self.style(name)
            .ok_or_else(|| KmlError::StyleNotFound(name.to_string()))
    }

    pub fn default_style(&self, layer: &MapLayer) -> KmlResult<&Style> {
        self.resolve_style(layer, "")
    }

    pub fn layers(&self) -> impl Iterator<Item = &LayerEntry> {
        self.layers.values()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

const YAML: &[&str] = &["yaml", "yml"];

/// Files with one of `extensions` directly under `dir`, sorted by name.
fn config_files(dir: &Path, extensions: &[&str]) -> Vec<std::path::PathBuf> {
    if !dir.exists() {
        warn!(path = ?dir, "Config directory not found");
        return Vec::new();
    }
    WalkDir::new(dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .map(|ext| extensions.contains(&ext))
                .unwrap_or(false)
        })
        .collect()
}

fn load_geojson(path: &Path, layer: &MapLayer) -> Result<MemoryFeatureSource> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading features of {} from {}", layer.id, path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing GeoJSON {}", path.display()))?;
    let source = MemoryFeatureSource::from_geojson(layer.feature_type_name(), &value)
        .with_context(|| format!("loading features of {}", layer.id))?;
    info!(layer = %layer.id, features = source.len(), "Loaded features");
    Ok(source)
}

/// Read `kml.yaml`; a missing file gives the built-in defaults.
pub fn load_settings<P: AsRef<Path>>(config_dir: P) -> Result<KmlSettings> {
    let path = config_dir.as_ref().join(SETTINGS_FILE);
    if !path.exists() {
        info!(path = ?path, "No KML settings file, using defaults");
        return Ok(KmlSettings::default());
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let settings: KmlSettings =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    settings
        .validate()
        .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    Ok(settings)
}
