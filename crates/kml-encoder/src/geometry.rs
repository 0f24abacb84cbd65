//! KML geometry elements.

use std::io::Write;

use kml_common::{Coordinate, Geometry, KmlResult, Polygon};

use crate::coordinates::CoordinateFormatter;
use crate::options::AltitudeMode;
use crate::writer::KmlWriter;

/// Distance below which a walked line length counts as the midpoint.
const MIDPOINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct GeometryEncoder {
    formatter: CoordinateFormatter,
    extrude: bool,
    altitude_mode: AltitudeMode,
}

impl GeometryEncoder {
    pub fn new(formatter: CoordinateFormatter, extrude: bool, altitude_mode: AltitudeMode) -> Self {
        Self {
            formatter,
            extrude,
            altitude_mode,
        }
    }

    pub fn formatter(&self) -> &CoordinateFormatter {
        &self.formatter
    }

    /// Encode a geometry. Collection members are written one after another
    /// without a wrapper; multi-geometries become `<MultiGeometry>`.
    pub fn encode<W: Write>(&self, w: &mut KmlWriter<W>, geometry: &Geometry) -> KmlResult<()> {
        let tags = needs_extrude_tags(geometry);
        match geometry {
            Geometry::GeometryCollection(members) => {
                for member in members {
                    self.encode(w, member)?;
                }
                Ok(())
            }
            Geometry::Point(c) => self.point(w, c),
            Geometry::LineString(coords) => self.line_string(w, coords, tags),
            Geometry::Polygon(polygon) => self.polygon(w, polygon, tags),
            Geometry::MultiPoint(points) => {
                w.start("MultiGeometry")?;
                for c in points {
                    self.point(w, c)?;
                }
                w.end("MultiGeometry")
            }
            Geometry::MultiLineString(lines) => {
                w.start("MultiGeometry")?;
                for line in lines {
                    self.line_string(w, line, tags)?;
                }
                w.end("MultiGeometry")
            }
            Geometry::MultiPolygon(polygons) => {
                w.start("MultiGeometry")?;
                for polygon in polygons {
                    self.polygon(w, polygon, tags)?;
                }
                w.end("MultiGeometry")
            }
        }
    }

    /// Write the parts of a geometry with no wrapper of their own, for a
    /// `<MultiGeometry>` the caller has opened. Multi-geometries and
    /// collections are flattened.
    pub fn encode_members<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        geometry: &Geometry,
    ) -> KmlResult<()> {
        let tags = needs_extrude_tags(geometry);
        match geometry {
            Geometry::GeometryCollection(members) => {
                members.iter().try_for_each(|m| self.encode_members(w, m))
            }
            Geometry::MultiPoint(points) => points.iter().try_for_each(|c| self.point(w, c)),
            Geometry::MultiLineString(lines) => {
                lines.iter().try_for_each(|line| self.line_string(w, line, tags))
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().try_for_each(|polygon| self.polygon(w, polygon, tags))
            }
            single => self.encode(w, single),
        }
    }

    /// Encode as exactly one KML geometry element: a collection of several
    /// members is wrapped in `<MultiGeometry>`.
    pub fn encode_single<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        geometry: &Geometry,
    ) -> KmlResult<()> {
        match geometry {
            Geometry::GeometryCollection(members) => match members.as_slice() {
                [only] => self.encode_single(w, only),
                _ => {
                    w.start("MultiGeometry")?;
                    self.encode(w, geometry)?;
                    w.end("MultiGeometry")
                }
            },
            other => self.encode(w, other),
        }
    }

    /// A `<Point>`; altitude tags are added whenever the point has a z.
    pub fn point<W: Write>(&self, w: &mut KmlWriter<W>, c: &Coordinate) -> KmlResult<()> {
        w.start("Point")?;
        if c.z.is_finite() {
            self.extrude_tags(w)?;
        }
        self.coordinates(w, std::slice::from_ref(c))?;
        w.end("Point")
    }

    fn line_string<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        coords: &[Coordinate],
        tags: bool,
    ) -> KmlResult<()> {
        w.start("LineString")?;
        if tags {
            self.extrude_tags(w)?;
        }
        self.coordinates(w, coords)?;
        w.end("LineString")
    }

    fn polygon<W: Write>(
        &self,
        w: &mut KmlWriter<W>,
        polygon: &Polygon,
        tags: bool,
    ) -> KmlResult<()> {
        w.start("Polygon")?;
        if tags {
            self.extrude_tags(w)?;
        }
        w.start("outerBoundaryIs")?;
        self.linear_ring(w, &polygon.exterior)?;
        w.end("outerBoundaryIs")?;
        for hole in &polygon.interiors {
            w.start("innerBoundaryIs")?;
            self.linear_ring(w, hole)?;
            w.end("innerBoundaryIs")?;
        }
        w.end("Polygon")
    }

    fn linear_ring<W: Write>(&self, w: &mut KmlWriter<W>, ring: &[Coordinate]) -> KmlResult<()> {
        w.start("LinearRing")?;
        self.coordinates(w, ring)?;
        w.end("LinearRing")
    }

    fn coordinates<W: Write>(&self, w: &mut KmlWriter<W>, coords: &[Coordinate]) -> KmlResult<()> {
        w.element("coordinates", &self.formatter.format_sequence(coords))
    }

    fn extrude_tags<W: Write>(&self, w: &mut KmlWriter<W>) -> KmlResult<()> {
        w.element("extrude", if self.extrude { "1" } else { "0" })?;
        w.element("altitudeMode", self.altitude_mode.as_str())
    }
}

/// Altitude tags go on a geometry when its first coordinate has a non-zero z.
pub fn needs_extrude_tags(geometry: &Geometry) -> bool {
    geometry
        .first_coordinate()
        .map(|c| c.z.is_finite() && c.z != 0.0)
        .unwrap_or(false)
}

/// Where a label for the geometry goes.
///
/// Lines use the point halfway along their length and collections the
/// centroid of their largest member; everything else uses the true centroid.
pub fn geometry_centroid(geometry: &Geometry) -> Option<Coordinate> {
    match geometry {
        Geometry::GeometryCollection(members) => match members.as_slice() {
            [] => None,
            [only] => geometry_centroid(only),
            [first, rest @ ..] => {
                let mut largest = first;
                let mut largest_area = first.area();
                for member in rest {
                    let area = member.area();
                    if area > largest_area {
                        largest = member;
                        largest_area = area;
                    }
                }
                geometry_centroid(largest)
            }
        },
        Geometry::Point(c) => Some(Coordinate::new(c.x, c.y)),
        Geometry::LineString(coords) => line_midpoint(coords),
        other => other.centroid(),
    }
}

fn line_midpoint(coords: &[Coordinate]) -> Option<Coordinate> {
    let first = coords.first()?;
    let total: f64 = coords.windows(2).map(|s| s[0].distance(&s[1])).sum();
    let mid = total / 2.0;

    let mut walked = 0.0;
    for segment in coords.windows(2) {
        let (start, end) = (&segment[0], &segment[1]);
        let length = start.distance(end);
        let reached = walked + length;
        if (reached - mid).abs() < MIDPOINT_TOLERANCE {
            return Some(Coordinate::new(end.x, end.y));
        }
        if reached > mid {
            let t = (mid - walked) / length;
            return Some(Coordinate::new(
                start.x + t * (end.x - start.x),
                start.y + t * (end.y - start.y),
            ));
        }
        walked = reached;
    }
    Some(Coordinate::new(first.x, first.y))
}
