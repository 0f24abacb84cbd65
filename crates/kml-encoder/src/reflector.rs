//! The network-link reflector: small documents that make the client fetch
//! the real content itself.
//!
//! `refresh` links every layer with a view-bound box so the client re-asks
//! whenever the camera stops. `superoverlay` links the root of each layer's
//! super-overlay. `download` is answered with the real document by the
//! caller and never reaches [`Reflector::write`].

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use kml_common::{Envelope, KmlError, KmlResult, MapLayer, Tile, WORLD_BOUNDS};

use crate::lookat;
use crate::options::{FormatOptions, KmlOptions};
use crate::raster::write_region;
use crate::superoverlay::TILE_PIXELS;
use crate::urls::{GetMapUrl, KML_MIME, KMZ_MIME};
use crate::writer::KmlWriter;

/// Image size asked for by refresh links; the client substitutes the box.
pub const REFRESH_PIXELS: u32 = 2048;

pub const VIEW_FORMAT: &str = "BBOX=[bboxWest],[bboxSouth],[bboxEast],[bboxNorth]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflectorMode {
    #[default]
    Refresh,
    SuperOverlay,
    Download,
}

impl ReflectorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectorMode::Refresh => "refresh",
            ReflectorMode::SuperOverlay => "superoverlay",
            ReflectorMode::Download => "download",
        }
    }
}

impl fmt::Display for ReflectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReflectorMode {
    type Err = KmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" => Ok(ReflectorMode::Refresh),
            "superoverlay" => Ok(ReflectorMode::SuperOverlay),
            "download" => Ok(ReflectorMode::Download),
            other => Err(KmlError::invalid_parameter(
                "mode",
                format!("Unknown reflector mode: {}", other),
            )),
        }
    }
}

/// `kmlrefresh`: refresh when the server says the content expired, or
/// every N seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshPolicy {
    OnExpire,
    Interval(f64),
}

impl RefreshPolicy {
    pub fn from_format_options(options: &FormatOptions) -> KmlResult<Option<Self>> {
        let Some(value) = options.get("kmlrefresh") else {
            return Ok(None);
        };
        if value.eq_ignore_ascii_case("expires") {
            return Ok(Some(RefreshPolicy::OnExpire));
        }
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| Some(RefreshPolicy::Interval(s)))
            .ok_or_else(|| {
                KmlError::invalid_parameter(
                    "kmlrefresh",
                    format!("'{}' is neither 'expires' nor a number of seconds", value),
                )
            })
    }
}

pub struct ReflectLayer<'a> {
    pub layer: &'a MapLayer,
    pub style: &'a str,
}

pub struct Reflector<'a> {
    pub base_url: &'a str,
    pub mode: ReflectorMode,
    pub layers: Vec<ReflectLayer<'a>>,
    pub bbox: Option<Envelope>,
    /// Format options as sent, before the reflector's own additions.
    pub format_options: FormatOptions,
    pub options: KmlOptions,
    pub kmz: bool,
}

impl<'a> Reflector<'a> {
    /// The format options every link carries: the request's own plus the
    /// mode, the resolved switches and the super-overlay flag.
    pub fn link_format_options(&self) -> FormatOptions {
        let mut fo = self.format_options.clone();
        fo.insert("mode", self.mode.as_str());
        fo.insert("autofit", "true");
        fo.insert("kmattr", self.options.kmattr.to_string());
        fo.insert("kmplacemark", self.options.kmplacemark.to_string());
        fo.insert("kmscore", self.options.kmscore.to_string());
        let superoverlay = self.mode == ReflectorMode::SuperOverlay;
        fo.insert("superoverlay", superoverlay.to_string());
        if superoverlay {
            fo.insert("overlaymode", self.options.superoverlay_mode.as_str());
        }
        fo
    }

    pub fn title(&self) -> String {
        match &self.options.kmltitle {
            Some(title) => title.clone(),
            None => self
                .layers
                .iter()
                .map(|l| l.layer.title.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// The request box, else the union of the layers' bounds, else the
    /// world.
    pub fn extent(&self) -> Envelope {
        if let Some(bbox) = self.bbox.filter(|b| !b.is_null()) {
            return bbox;
        }
        let mut extent = Envelope::null();
        for l in &self.layers {
            if let Some(bounds) = &l.layer.bounds {
                extent.expand_to_include_envelope(bounds);
            }
        }
        if extent.is_null() {
            WORLD_BOUNDS
        } else {
            extent
        }
    }

    pub fn write<W: Write>(&self, w: &mut KmlWriter<W>) -> KmlResult<()> {
        if self.layers.is_empty() {
            return Err(KmlError::MissingParameter("layers".to_string()));
        }
        if self.mode == ReflectorMode::Download {
            return Err(KmlError::Internal(
                "download requests are answered with the map itself".to_string(),
            ));
        }

        let format_options = self.link_format_options();
        let refresh = RefreshPolicy::from_format_options(&format_options)?;
        let visible = format_options.bool("kmlvisible")?.unwrap_or(true);
        let extent = self.extent();

        w.declaration()?;
        w.start_kml()?;
        w.start("Document")?;
        w.element("name", &self.title())?;
        if let Some(look_at) = lookat::compute(&extent, &self.options.lookat) {
            lookat::write_lookat(w, &look_at)?;
        }

        for l in &self.layers {
            match self.mode {
                ReflectorMode::SuperOverlay => {
                    w.start("Folder")?;
                    w.element("name", &l.layer.title)?;
                    self.superoverlay_link(w, l, &extent, &format_options, visible)?;
                    w.end("Folder")?;
                }
                _ => self.refresh_link(w, l, &format_options, refresh, visible)?,
            }
        }

        w.end("Document")?;
        w.end("kml")?;
        w.flush()
    }

    fn format(&self) -> &'static str {
        if self.kmz {
            KMZ_MIME
        } else {
            KML_MIME
        }
    }

    fn link_header<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        layer: &ReflectLayer<'_>,
        visible: bool,
    ) -> KmlResult<()> {
        w.start("NetworkLink")?;
        w.element("name", &layer.layer.title)?;
        w.element("open", "1")?;
        w.element("visibility", if visible { "1" } else { "0" })
    }

    /// A link without a box; the client appends the view box itself.
    fn refresh_link<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        layer: &ReflectLayer<'_>,
        format_options: &FormatOptions,
        refresh: Option<RefreshPolicy>,
        visible: bool,
    ) -> KmlResult<()> {
        let id = layer.layer.id.as_str();
        let href = GetMapUrl::new(self.base_url, id, layer.style, self.format())
            .with_size(REFRESH_PIXELS, REFRESH_PIXELS)
            .with_format_options(format_options.clone())
            .build();

        self.link_header(w, layer, visible)?;
        w.start("Url")?;
        w.element("href", &href)?;
        match refresh {
            Some(RefreshPolicy::OnExpire) => w.element("refreshMode", "onExpire")?,
            Some(RefreshPolicy::Interval(seconds)) => {
                w.element("refreshMode", "onInterval")?;
                w.element("refreshInterval", &seconds.to_string())?;
            }
            None => {}
        }
        w.element("viewRefreshMode", "onStop")?;
        w.element("viewRefreshTime", "1")?;
        w.element("viewBoundScale", "1")?;
        w.element("viewFormat", VIEW_FORMAT)?;
        w.end("Url")?;
        w.end("NetworkLink")
    }

    fn superoverlay_link<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        layer: &ReflectLayer<'_>,
        extent: &Envelope,
        format_options: &FormatOptions,
        visible: bool,
    ) -> KmlResult<()> {
        let tile = Tile::enclosing(extent);
        let id = layer.layer.id.as_str();
        let href = GetMapUrl::new(self.base_url, id, layer.style, self.format())
            .with_bbox(tile.envelope)
            .with_size(TILE_PIXELS, TILE_PIXELS)
            .with_format_options(format_options.clone())
            .build();

        self.link_header(w, layer, visible)?;
        write_region(w, &tile.envelope, &tile.lod)?;
        w.start("Link")?;
        w.element("href", &href)?;
        w.element("viewRefreshMode", "onRegion")?;
        w.end("Link")?;
        w.end("NetworkLink")
    }
}

/// `Content-Disposition` file name for downloaded documents, e.g.
/// `topp-states_topp-roads.kml`.
pub fn download_filename(layers: &[&MapLayer], extension: &str) -> String {
    let stem = layers
        .iter()
        .map(|l| l.id.as_str().replace(':', "-"))
        .collect::<Vec<_>>()
        .join("_");
    format!("{}.{}", stem, extension)
}
