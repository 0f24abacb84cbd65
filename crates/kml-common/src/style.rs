//! Cartographic style model.
//!
//! A style is a list of feature-type styles, each holding an ordered list of
//! rules. A rule applies within a scale-denominator range, optionally guarded
//! by an attribute filter, and carries the symbolizers used to draw matching
//! features. Styles are loaded from JSON or YAML configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::Feature;

/// Root style configuration - can contain multiple named styles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Version of the style schema
    #[serde(default = "default_version")]
    pub version: String,

    /// Named style definitions
    pub styles: HashMap<String, Style>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl StyleConfig {
    /// Load style configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StyleError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| StyleError::IoError(e.to_string()))?;
        Self::from_json(&content)
    }

    /// Parse style configuration from JSON string.
    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        serde_json::from_str(json).map_err(|e| StyleError::ParseError(e.to_string()))
    }

    /// Get a style by name.
    pub fn get(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }

    /// Validate all styles in the configuration.
    pub fn validate(&self) -> Result<(), StyleError> {
        for (name, style) in &self.styles {
            style
                .validate()
                .map_err(|e| StyleError::ValidationError(format!("{}: {}", name, e)))?;
        }
        Ok(())
    }
}

/// A named cartographic style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub feature_type_styles: Vec<FeatureTypeStyle>,
}

impl Style {
    pub fn validate(&self) -> Result<(), String> {
        for fts in &self.feature_type_styles {
            for rule in &fts.rules {
                if rule.min_scale > rule.max_scale {
                    return Err(format!(
                        "rule {:?} has min scale {} above max scale {}",
                        rule.name, rule.min_scale, rule.max_scale
                    ));
                }
            }
        }
        Ok(())
    }

    /// All rules of all feature-type styles, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.feature_type_styles.iter().flat_map(|fts| fts.rules.iter())
    }
}

/// A group of rules, optionally restricted to named feature types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTypeStyle {
    /// Feature types this group applies to; empty means every type.
    #[serde(default)]
    pub feature_type_names: Vec<String>,

    pub rules: Vec<Rule>,
}

impl FeatureTypeStyle {
    pub fn applies_to(&self, type_name: &str) -> bool {
        self.feature_type_names.is_empty()
            || self
                .feature_type_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(type_name))
    }
}

/// A scale-ranged, optionally filtered, list of symbolizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub name: Option<String>,

    /// Inclusive lower scale-denominator bound.
    #[serde(default)]
    pub min_scale: f64,

    /// Exclusive upper scale-denominator bound.
    #[serde(default = "unbounded_scale")]
    pub max_scale: f64,

    #[serde(default)]
    pub filter: Option<Filter>,

    /// Else rules only apply when no regular rule matched the feature.
    #[serde(default, rename = "else")]
    pub else_filter: bool,

    #[serde(default)]
    pub symbolizers: Vec<Symbolizer>,
}

fn unbounded_scale() -> f64 {
    f64::INFINITY
}

impl Rule {
    pub fn new(symbolizers: Vec<Symbolizer>) -> Self {
        Self {
            name: None,
            min_scale: 0.0,
            max_scale: f64::INFINITY,
            filter: None,
            else_filter: false,
            symbolizers,
        }
    }

    pub fn with_scale_range(mut self, min_scale: f64, max_scale: f64) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn as_else(mut self) -> Self {
        self.else_filter = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The visual instructions carried by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Symbolizer {
    Point(PointSymbolizer),
    Line(LineSymbolizer),
    Polygon(PolygonSymbolizer),
    Text(TextSymbolizer),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSymbolizer {
    /// URL of an external icon; may embed `${attribute}` expressions.
    #[serde(default)]
    pub external_graphic: Option<String>,

    /// Well-known mark name (circle, square, triangle, star, cross, x).
    #[serde(default)]
    pub mark: Option<String>,

    #[serde(default)]
    pub fill: Option<Fill>,

    #[serde(default)]
    pub stroke: Option<Stroke>,

    /// Size in pixels.
    #[serde(default)]
    pub size: Option<f64>,

    #[serde(default)]
    pub opacity: Option<f64>,

    /// Rotation in degrees, clockwise.
    #[serde(default)]
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSymbolizer {
    #[serde(default)]
    pub stroke: Option<Stroke>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonSymbolizer {
    #[serde(default)]
    pub fill: Option<Fill>,

    #[serde(default)]
    pub stroke: Option<Stroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSymbolizer {
    /// Attribute whose value is the label.
    pub label: String,

    #[serde(default)]
    pub fill: Option<Fill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub color: Color,

    #[serde(default)]
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub color: Option<Color>,

    #[serde(default)]
    pub opacity: Option<f64>,

    #[serde(default)]
    pub width: Option<f64>,
}

/// Attribute predicate attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Include,
    Exclude,
    Equals { property: String, value: Value },
    NotEquals { property: String, value: Value },
    LessThan { property: String, value: f64 },
    LessThanOrEqual { property: String, value: f64 },
    GreaterThan { property: String, value: f64 },
    GreaterThanOrEqual { property: String, value: f64 },
    /// SQL-style pattern: `%` matches any run, `_` a single character.
    Like { property: String, pattern: String },
    IsNull { property: String },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Evaluate the predicate against a feature.
    pub fn evaluate(&self, feature: &Feature) -> Result<bool, FilterError> {
        match self {
            Filter::Include => Ok(true),
            Filter::Exclude => Ok(false),
            Filter::Equals { property, value } => Ok(feature
                .attribute(property)
                .map(|v| values_equal(v, value))
                .unwrap_or(false)),
            Filter::NotEquals { property, value } => Ok(!feature
                .attribute(property)
                .map(|v| values_equal(v, value))
                .unwrap_or(false)),
            Filter::LessThan { property, value } => {
                compare(feature, property, |a| a < *value)
            }
            Filter::LessThanOrEqual { property, value } => {
                compare(feature, property, |a| a <= *value)
            }
            Filter::GreaterThan { property, value } => {
                compare(feature, property, |a| a > *value)
            }
            Filter::GreaterThanOrEqual { property, value } => {
                compare(feature, property, |a| a >= *value)
            }
            Filter::Like { property, pattern } => Ok(feature
                .attribute_text(property)
                .map(|text| like_matches(&text, pattern))
                .unwrap_or(false)),
            Filter::IsNull { property } => Ok(matches!(
                feature.attribute(property),
                None | Some(Value::Null)
            )),
            Filter::And { filters } => {
                for f in filters {
                    if !f.evaluate(feature)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or { filters } => {
                for f in filters {
                    if f.evaluate(feature)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not { filter } => Ok(!filter.evaluate(feature)?),
        }
    }

    /// OR the filters together, folding constants.
    pub fn or(filters: Vec<Filter>) -> Filter {
        let mut kept = Vec::with_capacity(filters.len());
        for f in filters {
            match f {
                Filter::Include => return Filter::Include,
                Filter::Exclude => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Filter::Exclude,
            1 => kept.remove(0),
            _ => Filter::Or { filters: kept },
        }
    }

    /// AND the filters together, folding constants.
    pub fn and(filters: Vec<Filter>) -> Filter {
        let mut kept = Vec::with_capacity(filters.len());
        for f in filters {
            match f {
                Filter::Exclude => return Filter::Exclude,
                Filter::Include => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Filter::Include,
            1 => kept.remove(0),
            _ => Filter::And { filters: kept },
        }
    }
}

fn values_equal(attribute: &Value, literal: &Value) -> bool {
    match (attribute, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.parse::<f64>().ok() == b.as_f64()
        }
        (a, b) => a == b,
    }
}

fn compare<F: Fn(f64) -> bool>(
    feature: &Feature,
    property: &str,
    predicate: F,
) -> Result<bool, FilterError> {
    match feature.attribute(property) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Number(n)) => Ok(n.as_f64().map(&predicate).unwrap_or(false)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(&predicate)
            .map_err(|_| FilterError::NotNumeric {
                property: property.to_string(),
                value: s.clone(),
            }),
        Some(other) => Err(FilterError::NotNumeric {
            property: property.to_string(),
            value: other.to_string(),
        }),
    }
}

fn like_matches(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_from(&text, &pattern)
}

fn like_from(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_from(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_from(&text[1..], rest),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Attribute '{property}' is not numeric: {value}")]
    NotNumeric { property: String, value: String },
}

/// Color representation supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// Hex string: "#RRGGBB" or "#RRGGBBAA"
    Hex(String),

    /// RGB array: [r, g, b] or [r, g, b, a]
    Array(Vec<u8>),

    /// Explicit RGBA
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::Rgba { r, g, b, a: 255 }
    }

    /// Convert to RGBA tuple.
    pub fn to_rgba(&self) -> (u8, u8, u8, u8) {
        match self {
            Color::Hex(s) if s.starts_with('#') => parse_hex_color(s),
            Color::Hex(s) => named_color(s).unwrap_or_else(|| parse_hex_color(s)),
            Color::Array(arr) => {
                let r = arr.first().copied().unwrap_or(0);
                let g = arr.get(1).copied().unwrap_or(0);
                let b = arr.get(2).copied().unwrap_or(0);
                let a = arr.get(3).copied().unwrap_or(255);
                (r, g, b, a)
            }
            Color::Rgba { r, g, b, a } => (*r, *g, *b, *a),
        }
    }

    /// KML colour string `aabbggrr`, alpha taken from `opacity` (0..1).
    pub fn to_kml_hex(&self, opacity: f64) -> String {
        let (r, g, b, _) = self.to_rgba();
        let alpha = (255.0 * opacity.clamp(0.0, 1.0)) as u8;
        format!("{:02x}{:02x}{:02x}{:02x}", alpha, b, g, r)
    }
}

fn parse_hex_color(s: &str) -> (u8, u8, u8, u8) {
    let s = s.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>, fallback: u8| {
        s.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .unwrap_or(fallback)
    };

    match s.len() {
        6 => (channel(0..2, 0), channel(2..4, 0), channel(4..6, 0), 255),
        8 => (
            channel(0..2, 0),
            channel(2..4, 0),
            channel(4..6, 0),
            channel(6..8, 255),
        ),
        _ => (0, 0, 0, 255),
    }
}

fn named_color(name: &str) -> Option<(u8, u8, u8, u8)> {
    let rgba = match name.to_lowercase().as_str() {
        "transparent" => (0, 0, 0, 0),
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 255, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" => (0, 255, 255, 255),
        "magenta" => (255, 0, 255, 255),
        "orange" => (255, 165, 0, 255),
        "purple" => (128, 0, 128, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        _ => return None,
    };
    Some(rgba)
}

#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
