//! URLs that documents point back at: GetMap requests for tiles and
//! overlays, icon and legend endpoints.

use kml_common::Envelope;

use crate::options::FormatOptions;

pub const KML_MIME: &str = "application/vnd.google-earth.kml+xml";
pub const KMZ_MIME: &str = "application/vnd.google-earth.kmz";
pub const PNG_MIME: &str = "image/png";

/// Separators that are harmless inside a value and stay readable in links.
const READABLE: [(&str, &str); 4] = [("%2C", ","), ("%3A", ":"), ("%3B", ";"), ("%2F", "/")];

/// Percent-encode a query component, keeping `,` `:` `;` `/` readable.
pub fn encode_component(s: &str) -> String {
    READABLE
        .iter()
        .fold(urlencoding::encode(s).into_owned(), |acc, (escaped, plain)| {
            acc.replace(escaped, plain)
        })
}

#[derive(Debug, Clone, Default)]
pub struct QueryString {
    parts: Vec<String>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl AsRef<str>) -> Self {
        let pair = format!("{}={}", encode_component(key), encode_component(value.as_ref()));
        self.parts.push(pair);
        self
    }

    pub fn build(&self) -> String {
        self.parts.join("&")
    }
}

/// A GetMap request against this service.
#[derive(Debug, Clone)]
pub struct GetMapUrl<'a> {
    pub base_url: &'a str,
    pub layer: &'a str,
    pub style: &'a str,
    /// Left out when the client fills the box in (network-link view format).
    pub bbox: Option<Envelope>,
    pub width: u32,
    pub height: u32,
    pub format: &'a str,
    pub format_options: Option<FormatOptions>,
}

impl<'a> GetMapUrl<'a> {
    pub fn new(base_url: &'a str, layer: &'a str, style: &'a str, format: &'a str) -> Self {
        Self {
            base_url,
            layer,
            style,
            bbox: None,
            width: 256,
            height: 256,
            format,
            format_options: None,
        }
    }

    pub fn with_bbox(mut self, bbox: Envelope) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_format_options(mut self, options: FormatOptions) -> Self {
        self.format_options = Some(options);
        self
    }

    pub fn build(&self) -> String {
        let mut query = QueryString::new()
            .push("service", "WMS")
            .push("version", "1.1.1")
            .push("request", "GetMap")
            .push("layers", self.layer)
            .push("styles", self.style)
            .push("srs", "EPSG:4326");
        if let Some(bbox) = &self.bbox {
            query = query.push("bbox", bbox.to_wms_string());
        }
        query = query
            .push("width", self.width.to_string())
            .push("height", self.height.to_string())
            .push("format", self.format);
        if self.format == PNG_MIME {
            query = query.push("transparent", "true");
        }
        if let Some(options) = self.format_options.as_ref().filter(|o| !o.is_empty()) {
            query = query.push("format_options", options.encode());
        }
        format!("{}/wms?{}", self.base_url.trim_end_matches('/'), query.build())
    }
}

pub fn legend_url(base_url: &str, layer: &str, style: &str) -> String {
    let query = QueryString::new()
        .push("layer", layer)
        .push("style", style)
        .push("format", PNG_MIME);
    format!("{}/legend?{}", base_url.trim_end_matches('/'), query.build())
}

pub fn icon_url(base_url: &str, style: &str, query: &QueryString) -> String {
    format!(
        "{}/icon/{}?{}",
        base_url.trim_end_matches('/'),
        encode_component(style),
        query.build()
    )
}
