//! Per-placemark `<Style>` elements.

use std::io::Write;

use kml_common::style::{PolygonSymbolizer, Stroke, TextSymbolizer};
use kml_common::{Feature, Geometry, KmlResult, Style, Symbolizer};

use crate::icons::{IconPropertyExtractor, IconRegistry};
use crate::writer::KmlWriter;

const DEFAULT_POLY_ICON: &str = "http://icons.opengeo.org/markers/icon-poly.1.png";
const DEFAULT_LINE_ICON: &str = "http://icons.opengeo.org/markers/icon-line.1.png";

pub struct StyleEncoder<'a> {
    pub base_url: &'a str,
    pub kmattr: bool,
    pub icons: &'a dyn IconPropertyExtractor,
}

impl<'a> StyleEncoder<'a> {
    /// Write a `<Style>` for the symbolizers that paint `feature`. Nothing is
    /// written when there are none. Inline icons go into `registry` when one
    /// is given; otherwise icons are linked live.
    pub fn encode<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        feature: &Feature,
        style: &Style,
        symbolizers: &[&Symbolizer],
        registry: Option<&mut IconRegistry>,
    ) -> KmlResult<()> {
        if symbolizers.is_empty() {
            return Ok(());
        }

        let mut lines = Vec::new();
        let mut polygons = Vec::new();
        let mut texts = Vec::new();
        let mut has_point = false;
        for s in symbolizers {
            match s {
                Symbolizer::Point(_) => has_point = true,
                Symbolizer::Line(l) => lines.push(l),
                Symbolizer::Polygon(p) => polygons.push(p),
                Symbolizer::Text(t) => texts.push(t),
            }
        }

        w.start("Style")?;
        if has_point {
            self.icon_style(w, feature, style, symbolizers, registry)?;
        } else {
            self.default_icon_style(w, &feature.geometry)?;
        }
        self.label_style(w, texts.first().copied())?;

        let line_stroke = match (lines.first(), polygons.first()) {
            (Some(line), _) => Some(line.stroke.as_ref()),
            (None, Some(polygon)) if polygon.stroke.is_some() => Some(polygon.stroke.as_ref()),
            _ => None,
        };
        if let Some(stroke) = line_stroke {
            line_style(w, stroke)?;
        }
        if let Some(polygon) = polygons.first() {
            poly_style(w, polygon, !lines.is_empty())?;
        }
        w.end("Style")
    }

    fn icon_style<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        feature: &Feature,
        style: &Style,
        symbolizers: &[&Symbolizer],
        registry: Option<&mut IconRegistry>,
    ) -> KmlResult<()> {
        let Some(props) = self.icons.extract(style, feature, symbolizers) else {
            return Ok(());
        };

        w.start("IconStyle")?;
        match registry {
            Some(registry) if !props.external => {
                // rotation and opacity are baked into the rendered icon
                registry.register(&props.icon_name, &props.symbolizer);
                if props.heading.is_some() {
                    w.element("heading", "0.0")?;
                }
                if let Some(scale) = props.scale {
                    w.element("scale", &scale.to_string())?;
                }
                w.start("Icon")?;
                w.element("href", &props.inline_href())?;
                w.end("Icon")?;
            }
            _ => {
                if let Some(opacity) = props.opacity {
                    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
                    w.element("color", &format!("{:02x}ffffff", alpha))?;
                }
                if let Some(scale) = props.scale {
                    w.element("scale", &scale.to_string())?;
                }
                if let Some(heading) = props.heading {
                    w.element("heading", &heading.to_string())?;
                }
                w.start("Icon")?;
                w.element("href", &props.live_href(self.base_url, &style.name))?;
                w.end("Icon")?;
            }
        }
        w.end("IconStyle")
    }

    /// Lines and polygons without a point symbolizer still get a small
    /// marker for their label placemark.
    fn default_icon_style<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        geometry: &Geometry,
    ) -> KmlResult<()> {
        let href = match geometry_family(geometry) {
            Family::Polygon => DEFAULT_POLY_ICON,
            Family::Line => DEFAULT_LINE_ICON,
            Family::Point => return Ok(()),
        };
        w.start("IconStyle")?;
        if self.kmattr {
            w.element("color", "00ffffff")?;
        }
        w.element("scale", "0.4")?;
        w.start("Icon")?;
        w.element("href", href)?;
        w.end("Icon")?;
        w.end("IconStyle")
    }

    fn label_style<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        text: Option<&TextSymbolizer>,
    ) -> KmlResult<()> {
        let color = match text {
            None => "00ffffff".to_string(),
            Some(TextSymbolizer { fill: Some(fill), .. }) => {
                fill.color.to_kml_hex(fill.opacity.unwrap_or(1.0))
            }
            Some(_) => "ffffffff".to_string(),
        };
        w.start("LabelStyle")?;
        w.element("color", &color)?;
        w.end("LabelStyle")
    }
}

fn line_style<W: Write>(w: &mut KmlWriter<W>, stroke: Option<&Stroke>) -> KmlResult<()> {
    w.start("LineStyle")?;
    match stroke {
        Some(stroke) => {
            if let Some(color) = &stroke.color {
                w.element("color", &color.to_kml_hex(stroke.opacity.unwrap_or(1.0)))?;
            }
            if let Some(width) = stroke.width {
                w.element("width", &(width.round() as i64).to_string())?;
            }
        }
        None => {
            w.element("color", "ffaaaaaa")?;
            w.element("width", "1")?;
        }
    }
    w.end("LineStyle")
}

fn poly_style<W: Write>(
    w: &mut KmlWriter<W>,
    polygon: &PolygonSymbolizer,
    force_outline: bool,
) -> KmlResult<()> {
    w.start("PolyStyle")?;
    let color = match &polygon.fill {
        Some(fill) => fill.color.to_kml_hex(fill.opacity.unwrap_or(1.0)),
        None => "00aaaaaa".to_string(),
    };
    w.element("color", &color)?;
    let outline = polygon.stroke.is_some() || force_outline;
    w.element("outline", if outline { "1" } else { "0" })?;
    w.end("PolyStyle")
}

enum Family {
    Point,
    Line,
    Polygon,
}

fn geometry_family(geometry: &Geometry) -> Family {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Family::Point,
        Geometry::LineString(_) | Geometry::MultiLineString(_) => Family::Line,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Family::Polygon,
        Geometry::GeometryCollection(members) => members
            .first()
            .map(geometry_family)
            .unwrap_or(Family::Point),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::SymbolizerIconExtractor;
    use kml_common::style::{Fill, LineSymbolizer, PointSymbolizer};
    use kml_common::{Color, Coordinate};

    fn road() -> Feature {
        Feature::new(
            "roads.1",
            Geometry::LineString(vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)]),
        )
    }

    fn style() -> Style {
        Style {
            name: "roads".into(),
            title: None,
            feature_type_styles: vec![],
        }
    }

    fn encode(
        feature: &Feature,
        symbolizers: &[Symbolizer],
        registry: Option<&mut IconRegistry>,
    ) -> String {
        let encoder = StyleEncoder {
            base_url: "http://h",
            kmattr: true,
            icons: &SymbolizerIconExtractor,
        };
        let refs: Vec<&Symbolizer> = symbolizers.iter().collect();
        let mut w = KmlWriter::new(Vec::new());
        encoder.encode(&mut w, feature, &style(), &refs, registry).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    fn stroke(color: &str, width: f64) -> Stroke {
        Stroke {
            color: Some(Color::Hex(color.into())),
            opacity: None,
            width: Some(width),
        }
    }

    #[test]
    fn test_no_symbolizers_no_style() {
        assert_eq!(encode(&road(), &[], None), "");
    }

    #[test]
    fn test_line_style() {
        let xml = encode(
            &road(),
            &[Symbolizer::Line(LineSymbolizer {
                stroke: Some(stroke("#0000ff", 2.6)),
            })],
            None,
        );
        assert!(xml.contains(&format!("<Icon><href>{}</href></Icon>", DEFAULT_LINE_ICON)));
        assert!(xml.contains("<IconStyle><color>00ffffff</color><scale>0.4</scale>"));
        assert!(xml.contains("<LabelStyle><color>00ffffff</color></LabelStyle>"));
        assert!(xml.contains("<LineStyle><color>ffff0000</color><width>3</width></LineStyle>"));
        assert!(!xml.contains("PolyStyle"));
    }

    #[test]
    fn test_bare_line_symbolizer_defaults() {
        let xml = encode(&road(), &[Symbolizer::Line(LineSymbolizer::default())], None);
        assert!(xml.contains("<LineStyle><color>ffaaaaaa</color><width>1</width></LineStyle>"));
    }

    #[test]
    fn test_polygon_style() {
        let mut parcel = road();
        parcel.geometry = Geometry::Polygon(kml_common::Polygon::new(
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(0.0, 0.0),
            ],
            vec![],
        ));

        let filled = Symbolizer::Polygon(PolygonSymbolizer {
            fill: Some(Fill {
                color: Color::Hex("#00ff00".into()),
                opacity: Some(0.5),
            }),
            stroke: Some(stroke("#000000", 1.0)),
        });
        let xml = encode(&parcel, &[filled], None);
        assert!(xml.contains(DEFAULT_POLY_ICON));
        assert!(xml.contains(
            "<LineStyle><color>ff000000</color><width>1</width></LineStyle><PolyStyle>"
        ));
        assert!(
            xml.contains("<PolyStyle><color>7f00ff00</color><outline>1</outline></PolyStyle>")
        );

        let hollow = Symbolizer::Polygon(PolygonSymbolizer::default());
        let xml = encode(&parcel, &[hollow.clone()], None);
        assert!(xml.contains("<PolyStyle><color>00aaaaaa</color><outline>0</outline></PolyStyle>"));

        let xml = encode(&parcel, &[hollow, Symbolizer::Line(LineSymbolizer::default())], None);
        assert!(xml.contains("<outline>1</outline>"));
    }

    #[test]
    fn test_label_style() {
        let labelled = Symbolizer::Text(TextSymbolizer {
            label: "name".into(),
            fill: Some(Fill {
                color: Color::Hex("#ff0000".into()),
                opacity: None,
            }),
        });
        let xml = encode(&road(), &[labelled], None);
        assert!(xml.contains("<LabelStyle><color>ff0000ff</color></LabelStyle>"));

        let plain = Symbolizer::Text(TextSymbolizer {
            label: "name".into(),
            fill: None,
        });
        let xml = encode(&road(), &[plain], None);
        assert!(xml.contains("<LabelStyle><color>ffffffff</color></LabelStyle>"));
    }

    #[test]
    fn test_point_icons_live_and_inline() {
        let town = Feature::new("towns.1", Geometry::Point(Coordinate::new(0.0, 0.0)));
        let point = Symbolizer::Point(PointSymbolizer {
            mark: Some("star".into()),
            size: Some(8.0),
            opacity: Some(0.5),
            rotation: Some(30.0),
            ..Default::default()
        });

        let xml = encode(&town, &[point.clone()], None);
        assert!(xml.contains(
            "<IconStyle><color>80ffffff</color><scale>0.5</scale><heading>30</heading>"
        ));
        assert!(xml.contains("<href>http://h/icon/roads?mark=star&amp;size=8</href>"));

        let mut registry = IconRegistry::new();
        let xml = encode(&town, &[point], Some(&mut registry));
        assert_eq!(registry.len(), 1);
        assert!(xml.contains(
            "<IconStyle><heading>0.0</heading><scale>0.5</scale><Icon><href>icons/roads_"
        ));
    }

    #[test]
    fn test_point_without_point_symbolizer_has_no_icon() {
        let town = Feature::new("towns.1", Geometry::Point(Coordinate::new(0.0, 0.0)));
        let xml = encode(&town, &[Symbolizer::Line(LineSymbolizer::default())], None);
        assert!(!xml.contains("IconStyle"));
    }
}
