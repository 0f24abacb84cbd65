//! Query-string parameters of the map and reflector endpoints.

use std::collections::HashMap;

use kml_common::{Crs, Envelope, Filter, KmlError, KmlResult};
use serde::Deserialize;

use crate::options::FormatOptions;
use crate::reflector::ReflectorMode;
use crate::urls::{KML_MIME, KMZ_MIME, PNG_MIME};

/// KML switches that may be sent as plain parameters instead of inside
/// `format_options`.
pub const KML_PARAMETERS: &[&str] = &[
    "KMSCORE",
    "KMATTR",
    "KMPLACEMARK",
    "KMLTITLE",
    "KMLREFRESH",
    "KMLVISIBLE",
    "LEGEND",
    "SUPEROVERLAY",
    "SUPEROVERLAY_MODE",
    "OVERLAYMODE",
    "REGIONATEBY",
    "EXTRUDE",
    "ALTITUDEMODE",
    "SELFLINKS",
];

pub const DEFAULT_SIZE: u32 = 256;

/// Largest image edge accepted.
pub const MAX_SIZE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Kml,
    Kmz,
    Png,
}

impl OutputFormat {
    pub fn parse(s: &str) -> KmlResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kml" | "application/vnd.google-earth.kml" | "application/vnd.google-earth.kml+xml" => Ok(OutputFormat::Kml),
            "kmz" | "application/vnd.google-earth.kmz" => Ok(OutputFormat::Kmz),
            "png" | "image/png" => Ok(OutputFormat::Png),
            _ => Err(KmlError::UnsupportedFormat(s.to_string())),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Kml => KML_MIME,
            OutputFormat::Kmz => KMZ_MIME,
            OutputFormat::Png => PNG_MIME,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Kml => "kml",
            OutputFormat::Kmz => "kmz",
            OutputFormat::Png => "png",
        }
    }
}

/// A parsed GetMap request, box already in WGS84.
#[derive(Debug, Clone)]
pub struct GetMapRequest {
    pub layers: Vec<String>,
    /// One entry per layer; empty means the layer's default style.
    pub styles: Vec<String>,
    pub bbox: Envelope,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub format_options: FormatOptions,
    pub filter: Option<Filter>,
    pub start_index: usize,
    pub max_features: Option<usize>,
}

/// A parsed reflector request.
#[derive(Debug, Clone)]
pub struct ReflectRequest {
    pub layers: Vec<String>,
    pub styles: Vec<String>,
    pub bbox: Option<Envelope>,
    pub mode: ReflectorMode,
    pub format: OutputFormat,
    pub format_options: FormatOptions,
    pub filter: Option<Filter>,
}

impl ReflectRequest {
    /// The GetMap request a download is answered with. Without a box the
    /// given extent is used.
    pub fn into_get_map(self, extent: Envelope) -> GetMapRequest {
        GetMapRequest {
            layers: self.layers,
            styles: self.styles,
            bbox: self.bbox.unwrap_or(extent),
            width: 1024,
            height: 1024,
            format: self.format,
            format_options: self.format_options,
            filter: self.filter,
            start_index: 0,
            max_features: None,
        }
    }
}

/// Query-string parameters. Keys are matched case-insensitively through
/// [`KvpParams::from_pairs`].
#[derive(Debug, Default, Deserialize)]
pub struct KvpParams {
    #[serde(rename = "SERVICE")]
    pub service: Option<String>,

    #[serde(rename = "REQUEST")]
    pub request: Option<String>,

    #[serde(rename = "VERSION")]
    pub version: Option<String>,

    #[serde(rename = "LAYERS")]
    pub layers: Option<String>,

    #[serde(rename = "STYLES")]
    pub styles: Option<String>,

    #[serde(rename = "BBOX")]
    pub bbox: Option<String>,

    #[serde(rename = "SRS", alias = "CRS")]
    pub srs: Option<String>,

    #[serde(rename = "WIDTH")]
    pub width: Option<String>,

    #[serde(rename = "HEIGHT")]
    pub height: Option<String>,

    #[serde(rename = "FORMAT")]
    pub format: Option<String>,

    #[serde(rename = "FORMAT_OPTIONS")]
    pub format_options: Option<String>,

    /// A JSON-encoded filter.
    #[serde(rename = "FILTER")]
    pub filter: Option<String>,

    #[serde(rename = "STARTINDEX")]
    pub start_index: Option<String>,

    #[serde(rename = "MAXFEATURES")]
    pub max_features: Option<String>,

    // Reflector
    #[serde(rename = "MODE")]
    pub mode: Option<String>,

    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

impl KvpParams {
    /// Collect query pairs, upper-casing keys. The first value of a repeated
    /// key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> KmlResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = serde_json::Map::new();
        for (k, v) in pairs {
            let key = k.as_ref().to_ascii_uppercase();
            if !map.contains_key(&key) {
                map.insert(key, serde_json::Value::String(v.into()));
            }
        }
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| KmlError::invalid_parameter("query", e.to_string()))
    }

    /// Parse into a GetMap request.
    pub fn into_get_map(self) -> KmlResult<GetMapRequest> {
        if let Some(service) = self.service.as_deref() {
            if !service.eq_ignore_ascii_case("WMS") {
                return Err(KmlError::invalid_parameter("SERVICE", "SERVICE must be WMS"));
            }
        }
        match self.request.as_deref() {
            Some(r) if r.eq_ignore_ascii_case("GetMap") => {}
            Some(r) => {
                return Err(KmlError::invalid_parameter(
                    "REQUEST",
                    format!("Unknown request: {}", r),
                ))
            }
            None => return Err(KmlError::MissingParameter("REQUEST".to_string())),
        }

        let layers = self.layer_names()?;
        let styles = split_list(self.styles.as_deref());
        let crs = self.crs()?;
        let bbox = self
            .bbox
            .as_deref()
            .ok_or_else(|| KmlError::MissingParameter("BBOX".to_string()))?;
        let bbox = crs.to_wgs84(&Envelope::from_wms_string(bbox)?)?;
        let format = OutputFormat::parse(
            self.format
                .as_deref()
                .ok_or_else(|| KmlError::MissingParameter("FORMAT".to_string()))?,
        )?;

        Ok(GetMapRequest {
            width: parse_size("WIDTH", self.width.as_deref())?,
            height: parse_size("HEIGHT", self.height.as_deref())?,
            filter: self.parsed_filter()?,
            start_index: parse_count("STARTINDEX", self.start_index.as_deref())?.unwrap_or(0),
            max_features: parse_count("MAXFEATURES", self.max_features.as_deref())?,
            format_options: self.merged_format_options(),
            layers,
            styles,
            bbox,
            format,
        })
    }

    /// Parse into a reflector request. The box is optional and the format
    /// defaults to KML.
    pub fn into_reflect(self) -> KmlResult<ReflectRequest> {
        let layers = self.layer_names()?;
        let styles = split_list(self.styles.as_deref());
        let crs = self.crs()?;
        let bbox = self
            .bbox
            .as_deref()
            .map(|b| -> KmlResult<Envelope> { Ok(crs.to_wgs84(&Envelope::from_wms_string(b)?)?) })
            .transpose()?;
        let format = match self.format.as_deref() {
            Some(f) => OutputFormat::parse(f)?,
            None => OutputFormat::Kml,
        };
        if format == OutputFormat::Png {
            return Err(KmlError::UnsupportedFormat(PNG_MIME.to_string()));
        }

        let mut format_options = self.merged_format_options();
        let mode = match self.mode.as_deref().or_else(|| format_options.get("mode")) {
            Some(m) => m.parse()?,
            None => ReflectorMode::default(),
        };
        format_options.insert("mode", mode.as_str());

        Ok(ReflectRequest {
            filter: self.parsed_filter()?,
            layers,
            styles,
            bbox,
            mode,
            format,
            format_options,
        })
    }

    fn layer_names(&self) -> KmlResult<Vec<String>> {
        let layers = split_list(self.layers.as_deref());
        if layers.iter().all(|l| l.is_empty()) {
            return Err(KmlError::MissingParameter("LAYERS".to_string()));
        }
        Ok(layers)
    }

    fn crs(&self) -> KmlResult<Crs> {
        Ok(Crs::parse(self.srs.as_deref().unwrap_or("EPSG:4326"))?)
    }

    fn parsed_filter(&self) -> KmlResult<Option<Filter>> {
        self.filter
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| {
                serde_json::from_str(f)
                    .map_err(|e| KmlError::invalid_parameter("FILTER", e.to_string()))
            })
            .transpose()
    }

    /// `format_options` plus any KML switch sent as its own parameter; the
    /// `format_options` value wins when both are present.
    fn merged_format_options(&self) -> FormatOptions {
        let mut fo = FormatOptions::parse(self.format_options.as_deref().unwrap_or(""));
        for key in KML_PARAMETERS {
            if let Some(value) = self.other.get(*key) {
                if !fo.contains(key) {
                    fo.insert(key, value.clone());
                }
            }
        }
        fo
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    match value {
        Some(v) if !v.is_empty() => v.split(',').map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn parse_size(param: &str, value: Option<&str>) -> KmlResult<u32> {
    let Some(value) = value else {
        return Ok(DEFAULT_SIZE);
    };
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|v| (1..=MAX_SIZE).contains(v))
        .ok_or_else(|| {
            KmlError::invalid_parameter(
                param,
                format!("'{}' is not within 1..={}", value, MAX_SIZE),
            )
        })
}

fn parse_count(param: &str, value: Option<&str>) -> KmlResult<Option<usize>> {
    value
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| KmlError::invalid_parameter(param, format!("'{}' is not a count", v)))
        })
        .transpose()
}

/// WMS 1.1.1 exception document.
pub fn service_exception(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ServiceExceptionReport version="1.1.1">
  <ServiceException code="{}">{}</ServiceException>
</ServiceExceptionReport>"#,
        quick_xml::escape::escape(code),
        quick_xml::escape::escape(message)
    )
}
