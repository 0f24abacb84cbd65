//! Per-request state shared by the layer encoders.

use kml_common::{DateFormats, Envelope, Filter, MapLayer, Style};

use crate::icons::IconPropertyExtractor;
use crate::options::{FormatOptions, KmlOptions, KmlSettings};
use crate::placemark::Diagnostic;
use crate::source::FeatureSource;
use crate::template::FeatureTemplate;

/// Metres per degree of longitude at the equator.
pub const METRES_PER_DEGREE: f64 = 111_319.490_793_273_58;

/// Size of a rendering pixel in metres (0.28 mm).
pub const PIXEL_SIZE: f64 = 0.000_28;

/// A GetMap request already reprojected to WGS84.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub bbox: Envelope,
    pub width: u32,
    pub height: u32,
    /// Format options as sent, forwarded on network links.
    pub format_options: FormatOptions,
    pub options: KmlOptions,
    pub base_url: String,
    pub kmz: bool,
    pub start_index: usize,
    pub max_features: Option<usize>,
}

impl MapRequest {
    /// OGC scale denominator of the whole map.
    pub fn scale_denominator(&self) -> f64 {
        if self.bbox.is_null() || self.width == 0 {
            return 0.0;
        }
        self.bbox.width() * METRES_PER_DEGREE / (self.width as f64 * PIXEL_SIZE)
    }

    /// Degrees per pixel of the requested image.
    pub fn resolution(&self) -> f64 {
        if self.width == 0 {
            return f64::INFINITY;
        }
        self.bbox.width() / self.width as f64
    }
}

/// One entry of the request's layer list.
#[derive(Clone)]
pub struct LayerRequest<'a> {
    pub layer: &'a MapLayer,
    pub style: &'a Style,
    /// The layer's own default style; drawing with anything else defeats
    /// the tile cache.
    pub default_style: &'a Style,
    /// Required for vector layers.
    pub source: Option<&'a dyn FeatureSource>,
    /// Extra filter sent with the request.
    pub filter: Option<Filter>,
}

impl<'a> LayerRequest<'a> {
    pub fn new(layer: &'a MapLayer, style: &'a Style) -> Self {
        Self {
            layer,
            style,
            default_style: style,
            source: None,
            filter: None,
        }
    }

    pub fn with_default_style(mut self, style: &'a Style) -> Self {
        self.default_style = style;
        self
    }

    pub fn with_source(mut self, source: &'a dyn FeatureSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Collaborators that turn features into text and icons.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub template: &'a dyn FeatureTemplate,
    pub icons: &'a dyn IconPropertyExtractor,
    pub dates: &'a DateFormats,
}

/// What one encoding produced, for logging and metrics.
#[derive(Debug, Clone, Default)]
pub struct EncodeSummary {
    pub placemarks: usize,
    pub ground_overlays: usize,
    pub links_emitted: usize,
    pub links_skipped: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Images to store in a KMZ: layer index and the area drawn.
    pub images: Vec<(usize, Envelope)>,
}

/// Everything a layer encoder reads.
#[derive(Clone, Copy)]
pub struct EncodeContext<'a> {
    pub request: &'a MapRequest,
    pub settings: &'a KmlSettings,
    pub collaborators: Collaborators<'a>,
    pub scale_denominator: f64,
}

impl<'a> EncodeContext<'a> {
    pub fn new(
        request: &'a MapRequest,
        settings: &'a KmlSettings,
        collaborators: Collaborators<'a>,
    ) -> Self {
        Self {
            request,
            settings,
            collaborators,
            scale_denominator: request.scale_denominator(),
        }
    }

    pub fn options(&self) -> &'a KmlOptions {
        &self.request.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_denominator() {
        let request = MapRequest {
            bbox: Envelope::new(-180.0, -90.0, 180.0, 90.0),
            width: 1024,
            height: 512,
            format_options: FormatOptions::default(),
            options: KmlOptions::resolve(&FormatOptions::default(), &KmlSettings::default())
                .unwrap(),
            base_url: "http://localhost".into(),
            kmz: false,
            start_index: 0,
            max_features: None,
        };
        let scale = request.scale_denominator();
        assert!((scale - 139_770_566.0).abs() / scale < 1e-6, "{}", scale);
        assert!((request.resolution() - 360.0 / 1024.0).abs() < 1e-12);
    }
}
