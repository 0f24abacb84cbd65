//! Placemarks.
//!
//! Element order is fixed: name, Snippet, description, self link, LookAt,
//! time primitive, Style, ExtendedData, geometry. Failures of the feature
//! template or of date parsing drop only the element concerned and are
//! returned as [`Diagnostic`]s. Failures of the output stream abort.

use std::fmt;
use std::io::Write;

use kml_common::time::format_xs_datetime;
use kml_common::{DateFormats, Feature, Geometry, KmlResult, Style, Symbolizer};
use serde_json::Value;

use crate::geometry::{geometry_centroid, GeometryEncoder};
use crate::icons::IconRegistry;
use crate::lookat::{self, LookAtOptions};
use crate::style::StyleEncoder;
use crate::template::FeatureTemplate;
use crate::writer::KmlWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacemarkStep {
    Name,
    Snippet,
    Description,
    Time,
    Height,
}

impl fmt::Display for PlacemarkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            PlacemarkStep::Name => "name",
            PlacemarkStep::Snippet => "snippet",
            PlacemarkStep::Description => "description",
            PlacemarkStep::Time => "time",
            PlacemarkStep::Height => "height",
        };
        f.write_str(step)
    }
}

/// A placemark step that failed and was left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub feature_id: String,
    pub step: PlacemarkStep,
    pub reason: String,
}

impl Diagnostic {
    fn new(feature: &Feature, step: PlacemarkStep, reason: impl fmt::Display) -> Self {
        Self {
            feature_id: feature.id.clone(),
            step,
            reason: reason.to_string(),
        }
    }
}

pub struct PlacemarkEncoder<'a> {
    pub geometry: GeometryEncoder,
    pub styles: StyleEncoder<'a>,
    pub template: &'a dyn FeatureTemplate,
    pub dates: &'a DateFormats,
    pub lookat: &'a LookAtOptions,
    /// Emit name, description and extended data.
    pub kmattr: bool,
    /// `{base}/rest/{layer}` when self links were asked for.
    pub self_link_base: Option<String>,
}

impl<'a> PlacemarkEncoder<'a> {
    /// Write one placemark. With `mark` set the placemark is a single point
    /// at the mark's first coordinate instead of the feature geometry.
    pub fn encode<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        feature: &Feature,
        style: &Style,
        symbolizers: &[&Symbolizer],
        mark: Option<&Geometry>,
        icons: Option<&mut IconRegistry>,
    ) -> KmlResult<Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();

        w.start_with("Placemark", &[("id", feature.id.as_str())])?;

        if self.kmattr {
            match self.name(feature, symbolizers) {
                Ok(name) => w.cdata_element("name", &name)?,
                Err(e) => diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Name, e)),
            }
            match self.template.snippet(feature) {
                Ok(Some(snippet)) if !snippet.is_empty() => w.element("Snippet", &snippet)?,
                Ok(_) => {}
                Err(e) => diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Snippet, e)),
            }
            match self.template.description(feature) {
                Ok(description) if !description.is_empty() => {
                    w.cdata_element("description", &description)?
                }
                Ok(_) => {}
                Err(e) => diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Description, e)),
            }
        }

        if let Some(base) = &self.self_link_base {
            let href = format!("{}/{}.kml", base.trim_end_matches('/'), feature.local_id());
            w.empty_with("atom:link", &[("rel", "self"), ("href", href.as_str())])?;
        }

        let geometry = self.raised_geometry(feature, &mut diagnostics);

        let framed = mark.map(Geometry::envelope).unwrap_or_else(|| geometry.envelope());
        if let Some(look_at) = lookat::compute(&framed, self.lookat) {
            lookat::write_lookat(w, &look_at)?;
        }

        self.time(w, feature, &mut diagnostics)?;

        self.styles.encode(w, feature, style, symbolizers, icons)?;

        if self.kmattr {
            extended_data(w, feature)?;
        }

        match mark.and_then(Geometry::first_coordinate) {
            Some(c) => self.geometry.point(w, &c)?,
            None => self.placemark_geometry(w, &geometry)?,
        }

        w.end("Placemark")?;
        Ok(diagnostics)
    }

    /// Template title, else the feature id; an id-only name is replaced by
    /// the feature's label text when it has any.
    fn name(
        &self,
        feature: &Feature,
        symbolizers: &[&Symbolizer],
    ) -> Result<String, crate::template::TemplateError> {
        let title = self.template.title(feature)?;
        let name = if title.is_empty() { feature.id.clone() } else { title };
        if name != feature.id {
            return Ok(name);
        }

        let labels: Vec<String> = symbolizers
            .iter()
            .filter_map(|s| match s {
                Symbolizer::Text(t) => feature.attribute_text(&t.label),
                _ => None,
            })
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            Ok(name)
        } else {
            Ok(labels.join(" "))
        }
    }

    fn raised_geometry(&self, feature: &Feature, diagnostics: &mut Vec<Diagnostic>) -> Geometry {
        let mut geometry = feature.geometry.clone();
        match self.template.height(feature) {
            Ok(h) if h.is_finite() && h != 0.0 => geometry.set_z(h),
            Ok(_) => {}
            Err(e) => diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Height, e)),
        }
        geometry
    }

    fn time<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        feature: &Feature,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> KmlResult<()> {
        let values = match self.template.time(feature) {
            Ok(values) => values,
            Err(e) => {
                diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Time, e));
                return Ok(());
            }
        };

        let mut parse = |text: &str| -> Option<String> {
            if text.trim().is_empty() {
                return None;
            }
            match self.dates.parse(text) {
                Ok(dt) => Some(format_xs_datetime(&dt)),
                Err(e) => {
                    diagnostics.push(Diagnostic::new(feature, PlacemarkStep::Time, e));
                    None
                }
            }
        };

        match values.as_slice() {
            [] => Ok(()),
            [instant] => match parse(instant) {
                Some(when) => {
                    w.start("TimeStamp")?;
                    w.element("when", &when)?;
                    w.end("TimeStamp")
                }
                None => Ok(()),
            },
            [begin, end, ..] => {
                let begin = parse(begin);
                let end = parse(end);
                if begin.is_none() && end.is_none() {
                    return Ok(());
                }
                w.start("TimeSpan")?;
                if let Some(begin) = begin {
                    w.element("begin", &begin)?;
                }
                if let Some(end) = end {
                    w.element("end", &end)?;
                }
                w.end("TimeSpan")
            }
        }
    }

    /// Single points stand alone. With attributes on, anything else is put in
    /// a MultiGeometry behind a label point at its centroid.
    fn placemark_geometry<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        geometry: &Geometry,
    ) -> KmlResult<()> {
        if geometry.is_empty() {
            return Ok(());
        }
        match geometry {
            Geometry::Point(c) => return self.geometry.point(w, c),
            Geometry::MultiPoint(points) if points.len() == 1 => {
                return self.geometry.point(w, &points[0])
            }
            _ => {}
        }

        if !self.kmattr {
            return self.geometry.encode_single(w, geometry);
        }

        w.start("MultiGeometry")?;
        if let Some(mut centroid) = geometry_centroid(geometry) {
            if let Some(first) = geometry.first_coordinate().filter(|c| c.has_z()) {
                centroid.z = first.z;
            }
            self.geometry.point(w, &centroid)?;
        }
        self.geometry.encode_members(w, geometry)?;
        w.end("MultiGeometry")
    }
}

fn extended_data<W: Write>(w: &mut KmlWriter<W>, feature: &Feature) -> KmlResult<()> {
    let scalars: Vec<(&String, String)> = feature
        .attributes
        .iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s.clone())),
            Value::Number(n) => Some((k, n.to_string())),
            Value::Bool(b) => Some((k, b.to_string())),
            _ => None,
        })
        .collect();
    if scalars.is_empty() {
        return Ok(());
    }

    w.start("ExtendedData")?;
    for (name, value) in scalars {
        w.start_with("Data", &[("name", name.as_str())])?;
        w.element("value", &value)?;
        w.end("Data")?;
    }
    w.end("ExtendedData")
}
