//! Server-wide KML settings and per-request format options.
//!
//! Format options arrive as one `format_options=key:value;key:value` request
//! parameter. Keys are case-insensitive. Request values override the
//! settings loaded from `kml.yaml`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kml_common::{DateFormats, KmlError, KmlResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lookat::LookAtOptions;

/// Altitude interpretation for extruded geometries and LookAts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AltitudeMode {
    ClampToGround,
    RelativeToGround,
    Absolute,
}

impl AltitudeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AltitudeMode::ClampToGround => "clampToGround",
            AltitudeMode::RelativeToGround => "relativeToGround",
            AltitudeMode::Absolute => "absolute",
        }
    }

    /// Case-insensitive match against the three KML modes.
    pub fn parse(s: &str) -> Option<Self> {
        [
            AltitudeMode::ClampToGround,
            AltitudeMode::RelativeToGround,
            AltitudeMode::Absolute,
        ]
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Geometry altitude mode: anything unset or unknown is `relativeToGround`.
    pub fn lenient(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or(AltitudeMode::RelativeToGround)
    }
}

impl fmt::Display for AltitudeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a super-overlay tile chooses between imagery and placemarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuperOverlayMode {
    Raster,
    Overview,
    Hybrid,
    Auto,
    Cached,
}

impl SuperOverlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuperOverlayMode::Raster => "raster",
            SuperOverlayMode::Overview => "overview",
            SuperOverlayMode::Hybrid => "hybrid",
            SuperOverlayMode::Auto => "auto",
            SuperOverlayMode::Cached => "cached",
        }
    }
}

impl FromStr for SuperOverlayMode {
    type Err = KmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raster" => Ok(SuperOverlayMode::Raster),
            "overview" => Ok(SuperOverlayMode::Overview),
            "hybrid" => Ok(SuperOverlayMode::Hybrid),
            "auto" => Ok(SuperOverlayMode::Auto),
            "cached" => Ok(SuperOverlayMode::Cached),
            other => Err(KmlError::invalid_parameter(
                "superoverlay_mode",
                format!("Unknown super-overlay mode: {}", other),
            )),
        }
    }
}

/// Defaults loaded from `config/kml.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmlSettings {
    pub kmscore: u8,
    pub kmattr: bool,
    pub kmplacemark: bool,
    pub superoverlay_mode: SuperOverlayMode,
    /// Features assigned to each tile by a regionating strategy.
    pub regionate_feature_limit: usize,
    pub coordinate_decimals: u32,
    pub extrude: bool,
    pub max_zoom_level: usize,
    /// Overrides the built-in date pattern table when set.
    pub date_formats: Option<Vec<String>>,
    /// Base URL of a KML tile cache used by the `cached` super-overlay mode.
    pub tile_cache_url: Option<String>,
}

impl Default for KmlSettings {
    fn default() -> Self {
        Self {
            kmscore: 40,
            kmattr: true,
            kmplacemark: false,
            superoverlay_mode: SuperOverlayMode::Auto,
            regionate_feature_limit: 15,
            coordinate_decimals: 6,
            extrude: true,
            max_zoom_level: 20,
            date_formats: None,
            tile_cache_url: None,
        }
    }
}

impl KmlSettings {
    pub fn date_table(&self) -> DateFormats {
        match &self.date_formats {
            Some(patterns) if !patterns.is_empty() => {
                DateFormats::from_patterns(patterns.iter().cloned())
            }
            _ => DateFormats::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.kmscore > 100 {
            return Err(format!("kmscore must be within 0..=100, got {}", self.kmscore));
        }
        if self.regionate_feature_limit == 0 {
            return Err("regionate_feature_limit must be positive".to_string());
        }
        Ok(())
    }
}

/// The raw `format_options` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOptions {
    values: BTreeMap<String, String>,
}

impl FormatOptions {
    /// Parse `key:value;key:value`. A key without a value reads as `true`.
    pub fn parse(s: &str) -> Self {
        let values = s
            .split(';')
            .map(str::trim)
            .filter(|kv| !kv.is_empty())
            .map(|kv| match kv.split_once(':') {
                Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim().to_string()),
                None => (kv.to_ascii_lowercase(), "true".to_string()),
            })
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bool(&self, key: &str) -> KmlResult<Option<bool>> {
        self.get(key).map(|v| parse_bool(key, v)).transpose()
    }

    pub fn f64(&self, key: &str) -> KmlResult<Option<f64>> {
        self.get(key)
            .map(|v| {
                v.parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .ok_or_else(|| {
                        KmlError::invalid_parameter(key, format!("'{}' is not a number", v))
                    })
            })
            .transpose()
    }

    /// Serialise back to the `key:value;...` form, keys upper-cased.
    pub fn encode(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}:{}", k.to_ascii_uppercase(), v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn parse_bool(key: &str, value: &str) -> KmlResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(KmlError::invalid_parameter(
            key,
            format!("'{}' is not a boolean", value),
        )),
    }
}

/// Format options resolved against the server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct KmlOptions {
    pub superoverlay: bool,
    pub superoverlay_mode: SuperOverlayMode,
    pub kmscore: u8,
    pub kmattr: bool,
    pub kmplacemark: bool,
    pub regionate_by: Option<String>,
    pub extrude: bool,
    pub altitude_mode: AltitudeMode,
    pub legend: bool,
    pub kmltitle: Option<String>,
    pub self_links: bool,
    pub lookat: LookAtOptions,
}

impl KmlOptions {
    pub fn resolve(options: &FormatOptions, settings: &KmlSettings) -> KmlResult<Self> {
        let superoverlay_mode = match options
            .get("superoverlay_mode")
            .or_else(|| options.get("overlayMode"))
        {
            Some(mode) => mode.parse()?,
            None => settings.superoverlay_mode,
        };

        let kmscore = match options.get("kmscore") {
            Some(v) => v
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| {
                    KmlError::invalid_parameter("kmscore", format!("'{}' is not within 0..=100", v))
                })?,
            None => settings.kmscore,
        };

        let resolved = Self {
            superoverlay: options.bool("superoverlay")?.unwrap_or(false),
            superoverlay_mode,
            kmscore,
            kmattr: options.bool("kmattr")?.unwrap_or(settings.kmattr),
            kmplacemark: options.bool("kmplacemark")?.unwrap_or(settings.kmplacemark),
            regionate_by: options
                .get("regionateBy")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            extrude: options.bool("extrude")?.unwrap_or(settings.extrude),
            altitude_mode: AltitudeMode::lenient(options.get("altitudeMode")),
            legend: options.bool("legend")?.unwrap_or(false),
            kmltitle: options
                .get("kmltitle")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            self_links: options.bool("selfLinks")?.unwrap_or(false),
            lookat: LookAtOptions::from_format_options(options)?,
        };
        debug!(options = ?resolved, "Resolved KML format options");
        Ok(resolved)
    }

    /// True when the attribute, placemark and score switches are the server
    /// defaults.
    pub fn uses_default_switches(&self, settings: &KmlSettings) -> bool {
        self.kmattr == settings.kmattr
            && self.kmplacemark == settings.kmplacemark
            && self.kmscore == settings.kmscore
    }
}
