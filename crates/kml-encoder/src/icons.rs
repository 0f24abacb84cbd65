//! Point symbol icons.
//!
//! Icons are either external graphics referenced by URL, live icons drawn on
//! demand by the `/icon/{style}` endpoint, or inline icons rendered once and
//! packed into a KMZ archive under `icons/`.

use std::collections::BTreeMap;

use kml_common::style::PointSymbolizer;
use kml_common::{Feature, Style, Symbolizer};

use crate::regionate::stable_hash;
use crate::urls::{icon_url, QueryString};

/// Pixel size that maps to an IconStyle scale of 1.
pub const DEFAULT_ICON_SIZE: f64 = 16.0;

#[derive(Debug, Clone, PartialEq)]
pub struct IconProperties {
    pub opacity: Option<f64>,
    pub scale: Option<f64>,
    pub heading: Option<f64>,
    /// The icon lives at a URL outside this service.
    pub external: bool,
    /// Resolved URL of an external graphic.
    pub href: Option<String>,
    /// Unique name of a rendered icon within the document.
    pub icon_name: String,
    pub symbolizer: PointSymbolizer,
}

impl IconProperties {
    /// URL for a live (not embedded) icon.
    pub fn live_href(&self, base_url: &str, style_name: &str) -> String {
        if let Some(href) = self.href.as_ref().filter(|_| self.external) {
            return href.clone();
        }
        icon_url(base_url, style_name, &icon_query(&self.symbolizer))
    }

    /// Path of an embedded icon inside the KMZ archive.
    pub fn inline_href(&self) -> String {
        format!("icons/{}.png", self.icon_name)
    }
}

/// Query understood by the icon endpoint.
pub fn icon_query(symbolizer: &PointSymbolizer) -> QueryString {
    let mut query = QueryString::new();
    if let Some(mark) = &symbolizer.mark {
        query = query.push("mark", mark);
    }
    if let Some(fill) = &symbolizer.fill {
        let (r, g, b, _) = fill.color.to_rgba();
        query = query.push("fill", format!("{:02x}{:02x}{:02x}", r, g, b));
    }
    if let Some(color) = symbolizer.stroke.as_ref().and_then(|s| s.color.as_ref()) {
        let (r, g, b, _) = color.to_rgba();
        query = query.push("stroke", format!("{:02x}{:02x}{:02x}", r, g, b));
    }
    if let Some(size) = symbolizer.size {
        query = query.push("size", size.to_string());
    }
    query
}

/// Replace `${attribute}` expressions with the feature's attribute text.
/// Missing attributes expand to nothing.
pub fn expand_attributes(template: &str, feature: &Feature) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = feature.attribute_text(name) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolves the icon a feature is drawn with.
pub trait IconPropertyExtractor: Send + Sync {
    fn extract(
        &self,
        style: &Style,
        feature: &Feature,
        symbolizers: &[&Symbolizer],
    ) -> Option<IconProperties>;
}

/// Takes the first point symbolizer that applies to the feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolizerIconExtractor;

impl IconPropertyExtractor for SymbolizerIconExtractor {
    fn extract(
        &self,
        style: &Style,
        feature: &Feature,
        symbolizers: &[&Symbolizer],
    ) -> Option<IconProperties> {
        let point = symbolizers.iter().find_map(|s| match s {
            Symbolizer::Point(p) => Some(p),
            _ => None,
        })?;

        let href = point
            .external_graphic
            .as_deref()
            .map(|g| expand_attributes(g, feature));
        let external = href.is_some();

        let digest = serde_json::to_string(point)
            .map(|json| stable_hash(&json))
            .unwrap_or_default();
        let icon_name = format!("{}_{:016x}", sanitize_name(&style.name), digest);

        Some(IconProperties {
            opacity: point.opacity,
            scale: point.size.map(|s| s / DEFAULT_ICON_SIZE),
            heading: point.rotation,
            external,
            href,
            icon_name,
            symbolizer: point.clone(),
        })
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Icons to embed in a KMZ, keyed by icon name. Filled while placemarks are
/// written and drained once when the archive is assembled.
#[derive(Debug, Clone, Default)]
pub struct IconRegistry {
    icons: BTreeMap<String, PointSymbolizer>,
}

impl IconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, symbolizer: &PointSymbolizer) {
        self.icons
            .entry(name.to_string())
            .or_insert_with(|| symbolizer.clone());
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    pub fn drain(&mut self) -> Vec<(String, PointSymbolizer)> {
        std::mem::take(&mut self.icons).into_iter().collect()
    }
}
