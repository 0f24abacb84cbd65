//! Shared fixtures for the encoder integration tests.

#![allow(dead_code)]

use kml_common::style::{Fill, PointSymbolizer, PolygonSymbolizer};
use kml_common::{
    Color, Coordinate, DateFormats, Envelope, Feature, FeatureTypeStyle, Geometry, KmlResult,
    LayerId, LayerKind, MapLayer, Polygon, Rule, Style, Symbolizer,
};
use kml_encoder::{
    AttributeTemplate, Collaborators, DocumentAssembler, EncodeContext, EncodeSummary,
    FormatOptions, KmlOptions, KmlSettings, LayerRequest, MapRequest, MemoryFeatureSource,
    SymbolizerIconExtractor,
};

pub const BASE_URL: &str = "http://localhost:8080";

pub struct Harness {
    pub settings: KmlSettings,
    pub template: AttributeTemplate,
    pub dates: DateFormats,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(KmlSettings::default())
    }

    pub fn with_settings(settings: KmlSettings) -> Self {
        Self {
            settings,
            template: AttributeTemplate::default(),
            dates: DateFormats::default(),
        }
    }

    pub fn request(&self, bbox: Envelope, width: u32, format_options: &str) -> MapRequest {
        let fo = FormatOptions::parse(format_options);
        MapRequest {
            bbox,
            width,
            height: width,
            options: KmlOptions::resolve(&fo, &self.settings).unwrap(),
            format_options: fo,
            base_url: BASE_URL.to_string(),
            kmz: false,
            start_index: 0,
            max_features: None,
        }
    }

    pub fn ctx<'a>(&'a self, request: &'a MapRequest) -> EncodeContext<'a> {
        EncodeContext::new(
            request,
            &self.settings,
            Collaborators {
                template: &self.template,
                icons: &SymbolizerIconExtractor,
                dates: &self.dates,
            },
        )
    }

    /// Plan and stream a whole document.
    pub fn encode(
        &self,
        request: &MapRequest,
        layers: &[LayerRequest<'_>],
    ) -> KmlResult<(String, EncodeSummary)> {
        let assembler = DocumentAssembler::new(self.ctx(request), layers);
        let plan = assembler.plan()?;
        let (bytes, summary) = assembler.write(&plan, Vec::new())?;
        Ok((String::from_utf8(bytes).unwrap(), summary))
    }
}

pub fn map_layer(id: &str, title: &str, kind: LayerKind) -> MapLayer {
    MapLayer {
        id: LayerId::new(id),
        title: title.to_string(),
        kind,
        feature_type: None,
        default_style: "default".to_string(),
        styles: vec![],
        regionate_strategy: None,
        bounds: None,
        source: None,
        raster_color: None,
        attribution: None,
    }
}

pub fn style(name: &str, symbolizer: Symbolizer) -> Style {
    Style {
        name: name.to_string(),
        title: None,
        feature_type_styles: vec![FeatureTypeStyle {
            feature_type_names: vec![],
            rules: vec![Rule::new(vec![symbolizer])],
        }],
    }
}

pub fn circle_style() -> Style {
    style(
        "default",
        Symbolizer::Point(PointSymbolizer {
            mark: Some("circle".to_string()),
            fill: Some(Fill {
                color: Color::Hex("#ff0000".to_string()),
                opacity: None,
            }),
            size: Some(8.0),
            ..Default::default()
        }),
    )
}

pub fn polygon_style() -> Style {
    style(
        "default",
        Symbolizer::Polygon(PolygonSymbolizer {
            fill: Some(Fill {
                color: Color::Hex("#00ff00".to_string()),
                opacity: Some(0.5),
            }),
            stroke: None,
        }),
    )
}

pub fn town(id: &str, name: &str, x: f64, y: f64) -> Feature {
    Feature::new(id, Geometry::Point(Coordinate::new(x, y))).with_attribute("name", name)
}

pub fn towns() -> MemoryFeatureSource {
    MemoryFeatureSource::new(vec![
        town("towns.1", "Alpha", 10.0, 10.0),
        town("towns.2", "Beta", 20.0, 20.0),
        town("towns.3", "Gamma", 30.0, 5.0),
    ])
}

pub fn square(id: &str, x: f64, y: f64, size: f64) -> Feature {
    Feature::new(
        id,
        Geometry::Polygon(Polygon::new(
            vec![
                Coordinate::new(x, y),
                Coordinate::new(x, y + size),
                Coordinate::new(x + size, y + size),
                Coordinate::new(x + size, y),
                Coordinate::new(x, y),
            ],
            vec![],
        )),
    )
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
