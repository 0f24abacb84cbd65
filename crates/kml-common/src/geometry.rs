//! Vector geometry model.
//!
//! Geometries are plain owned trees of coordinates. A missing Z ordinate is
//! represented by `NaN`, never by a sentinel zero, so encoders can tell a
//! ground-level coordinate from a two-dimensional one.

use serde_json::Value;

use crate::Envelope;

/// A coordinate tuple. `z` is `NaN` when the coordinate has no elevation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: f64::NAN }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn has_z(&self) -> bool {
        !self.z.is_nan()
    }

    pub fn distance(&self, other: &Coordinate) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A polygon with one exterior ring and any number of holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Vec<Coordinate>,
    pub interiors: Vec<Vec<Coordinate>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coordinate>, interiors: Vec<Vec<Coordinate>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| ring_signed_area(r).abs()).sum();
        (ring_signed_area(&self.exterior).abs() - holes).max(0.0)
    }

    fn rings(&self) -> impl Iterator<Item = &Vec<Coordinate>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

/// Tagged union of the supported geometry kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon(Polygon),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Vec<Coordinate>>),
    MultiPolygon(Vec<Polygon>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Visit every coordinate in traversal order.
    pub fn for_each_coordinate<F: FnMut(&Coordinate)>(&self, f: &mut F) {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => cs.iter().for_each(f),
            Geometry::Polygon(p) => p.rings().flatten().for_each(f),
            Geometry::MultiLineString(lines) => lines.iter().flatten().for_each(f),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|p| p.rings())
                .flatten()
                .for_each(f),
            Geometry::GeometryCollection(members) => {
                for member in members {
                    member.for_each_coordinate(f);
                }
            }
        }
    }

    /// Apply a function to every coordinate in place.
    pub fn map_coordinates<F: FnMut(&mut Coordinate)>(&mut self, f: &mut F) {
        match self {
            Geometry::Point(c) => f(c),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => cs.iter_mut().for_each(f),
            Geometry::Polygon(p) => {
                p.exterior.iter_mut().for_each(&mut *f);
                p.interiors.iter_mut().flatten().for_each(f);
            }
            Geometry::MultiLineString(lines) => lines.iter_mut().flatten().for_each(f),
            Geometry::MultiPolygon(polys) => {
                for p in polys {
                    p.exterior.iter_mut().for_each(&mut *f);
                    p.interiors.iter_mut().flatten().for_each(&mut *f);
                }
            }
            Geometry::GeometryCollection(members) => {
                for member in members {
                    member.map_coordinates(f);
                }
            }
        }
    }

    pub fn first_coordinate(&self) -> Option<Coordinate> {
        match self {
            Geometry::Point(c) => Some(*c),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => cs.first().copied(),
            Geometry::Polygon(p) => p.exterior.first().copied(),
            Geometry::MultiLineString(lines) => lines.iter().find_map(|l| l.first().copied()),
            Geometry::MultiPolygon(polys) => polys.iter().find_map(|p| p.exterior.first().copied()),
            Geometry::GeometryCollection(members) => {
                members.iter().find_map(Geometry::first_coordinate)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_coordinate().is_none()
    }

    pub fn envelope(&self) -> Envelope {
        let mut env = Envelope::null();
        self.for_each_coordinate(&mut |c| env.expand_to_include(c.x, c.y));
        env
    }

    /// Number of top-level members (1 for simple geometries).
    pub fn num_geometries(&self) -> usize {
        match self {
            Geometry::MultiPoint(cs) => cs.len(),
            Geometry::MultiLineString(ls) => ls.len(),
            Geometry::MultiPolygon(ps) => ps.len(),
            Geometry::GeometryCollection(gs) => gs.len(),
            _ => 1,
        }
    }

    /// The `n`th top-level member as an owned geometry.
    pub fn geometry_n(&self, n: usize) -> Option<Geometry> {
        match self {
            Geometry::MultiPoint(cs) => cs.get(n).copied().map(Geometry::Point),
            Geometry::MultiLineString(ls) => ls.get(n).cloned().map(Geometry::LineString),
            Geometry::MultiPolygon(ps) => ps.get(n).cloned().map(Geometry::Polygon),
            Geometry::GeometryCollection(gs) => gs.get(n).cloned(),
            other if n == 0 => Some(other.clone()),
            _ => None,
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            Geometry::Polygon(p) => p.area(),
            Geometry::MultiPolygon(ps) => ps.iter().map(Polygon::area).sum(),
            Geometry::GeometryCollection(gs) => gs.iter().map(Geometry::area).sum(),
            _ => 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Geometry::LineString(cs) => line_length(cs),
            Geometry::MultiLineString(ls) => ls.iter().map(|l| line_length(l)).sum(),
            Geometry::Polygon(p) => p.rings().map(|r| line_length(r)).sum(),
            Geometry::MultiPolygon(ps) => ps
                .iter()
                .flat_map(|p| p.rings())
                .map(|r| line_length(r))
                .sum(),
            Geometry::GeometryCollection(gs) => gs.iter().map(Geometry::length).sum(),
            _ => 0.0,
        }
    }

    /// The mathematical centroid, weighted by the highest dimension present:
    /// area for polygonal content, length for lineal content, otherwise the
    /// mean of the points. Z is not computed.
    pub fn centroid(&self) -> Option<Coordinate> {
        let mut acc = CentroidAccumulator::default();
        acc.add(self);
        acc.result()
    }

    /// Replace the Z of every coordinate.
    pub fn set_z(&mut self, z: f64) {
        self.map_coordinates(&mut |c| c.z = z);
    }

    /// Build a geometry from a GeoJSON geometry object.
    pub fn from_geojson(value: &Value) -> Result<Self, GeometryError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| GeometryError::Malformed("missing geometry type".to_string()))?;

        if kind == "GeometryCollection" {
            let members = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| GeometryError::Malformed("missing geometries".to_string()))?;
            return members
                .iter()
                .map(Geometry::from_geojson)
                .collect::<Result<Vec<_>, _>>()
                .map(Geometry::GeometryCollection);
        }

        let coords = value
            .get("coordinates")
            .ok_or_else(|| GeometryError::Malformed("missing coordinates".to_string()))?;

        match kind {
            "Point" => Ok(Geometry::Point(json_coordinate(coords)?)),
            "LineString" => Ok(Geometry::LineString(json_sequence(coords)?)),
            "Polygon" => Ok(Geometry::Polygon(json_polygon(coords)?)),
            "MultiPoint" => Ok(Geometry::MultiPoint(json_sequence(coords)?)),
            "MultiLineString" => json_array(coords)?
                .iter()
                .map(json_sequence)
                .collect::<Result<Vec<_>, _>>()
                .map(Geometry::MultiLineString),
            "MultiPolygon" => json_array(coords)?
                .iter()
                .map(json_polygon)
                .collect::<Result<Vec<_>, _>>()
                .map(Geometry::MultiPolygon),
            other => Err(GeometryError::UnsupportedType(other.to_string())),
        }
    }

    /// Parse a small WKT subset: POINT, LINESTRING and POLYGON, with optional Z.
    pub fn from_wkt(wkt: &str) -> Result<Self, GeometryError> {
        let wkt = wkt.trim();
        let open = wkt
            .find('(')
            .ok_or_else(|| GeometryError::Malformed(wkt.to_string()))?;
        let kind = wkt[..open].trim().trim_end_matches(" Z").trim().to_uppercase();
        let body = wkt[open..].trim();
        let inner = body
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| GeometryError::Malformed(wkt.to_string()))?;

        match kind.as_str() {
            "POINT" => Ok(Geometry::Point(wkt_coordinate(inner)?)),
            "LINESTRING" => Ok(Geometry::LineString(wkt_sequence(inner)?)),
            "POLYGON" => {
                let mut rings = Vec::new();
                for ring in inner.split(')') {
                    let ring = ring.trim().trim_start_matches(',').trim();
                    if ring.is_empty() {
                        continue;
                    }
                    let ring = ring
                        .strip_prefix('(')
                        .ok_or_else(|| GeometryError::Malformed(wkt.to_string()))?;
                    rings.push(wkt_sequence(ring)?);
                }
                let mut rings = rings.into_iter();
                let exterior = rings
                    .next()
                    .ok_or_else(|| GeometryError::Malformed(wkt.to_string()))?;
                Ok(Geometry::Polygon(Polygon::new(exterior, rings.collect())))
            }
            other => Err(GeometryError::UnsupportedType(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("Malformed geometry: {0}")]
    Malformed(String),

    #[error("Unsupported geometry type: {0}")]
    UnsupportedType(String),
}

fn ring_signed_area(ring: &[Coordinate]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        sum += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
    }
    sum / 2.0
}

fn line_length(coords: &[Coordinate]) -> f64 {
    coords.windows(2).map(|p| p[0].distance(&p[1])).sum()
}

#[derive(Default)]
struct CentroidAccumulator {
    area_sum: f64,
    area_cx: f64,
    area_cy: f64,
    len_sum: f64,
    len_cx: f64,
    len_cy: f64,
    pt_count: usize,
    pt_cx: f64,
    pt_cy: f64,
}

impl CentroidAccumulator {
    fn add(&mut self, geometry: &Geometry) {
        match geometry {
            Geometry::Point(c) => self.add_point(c),
            Geometry::MultiPoint(cs) => cs.iter().for_each(|c| self.add_point(c)),
            Geometry::LineString(cs) => self.add_line(cs),
            Geometry::MultiLineString(ls) => ls.iter().for_each(|l| self.add_line(l)),
            Geometry::Polygon(p) => self.add_polygon(p),
            Geometry::MultiPolygon(ps) => ps.iter().for_each(|p| self.add_polygon(p)),
            Geometry::GeometryCollection(gs) => gs.iter().for_each(|g| self.add(g)),
        }
    }

    fn add_point(&mut self, c: &Coordinate) {
        self.pt_count += 1;
        self.pt_cx += c.x;
        self.pt_cy += c.y;
    }

    fn add_line(&mut self, coords: &[Coordinate]) {
        for pair in coords.windows(2) {
            let len = pair[0].distance(&pair[1]);
            self.len_sum += len;
            self.len_cx += len * (pair[0].x + pair[1].x) / 2.0;
            self.len_cy += len * (pair[0].y + pair[1].y) / 2.0;
        }
        if let Some(first) = coords.first() {
            // degenerate lines still contribute a point
            self.add_point(first);
        }
    }

    fn add_polygon(&mut self, polygon: &Polygon) {
        self.add_ring(&polygon.exterior, true);
        for hole in &polygon.interiors {
            self.add_ring(hole, false);
        }
        self.add_line(&polygon.exterior);
    }

    fn add_ring(&mut self, ring: &[Coordinate], exterior: bool) {
        let signed = ring_signed_area(ring);
        if signed == 0.0 {
            return;
        }
        let mut cx = 0.0;
        let mut cy = 0.0;
        for pair in ring.windows(2) {
            let cross = pair[0].x * pair[1].y - pair[1].x * pair[0].y;
            cx += (pair[0].x + pair[1].x) * cross;
            cy += (pair[0].y + pair[1].y) * cross;
        }
        // ring centroid = (cx, cy) / (6 * signed)
        let weight = if exterior { signed.abs() } else { -signed.abs() };
        self.area_sum += weight;
        self.area_cx += weight * cx / (6.0 * signed);
        self.area_cy += weight * cy / (6.0 * signed);
    }

    fn result(&self) -> Option<Coordinate> {
        if self.area_sum > 0.0 {
            return Some(Coordinate::new(
                self.area_cx / self.area_sum,
                self.area_cy / self.area_sum,
            ));
        }
        if self.len_sum > 0.0 {
            return Some(Coordinate::new(
                self.len_cx / self.len_sum,
                self.len_cy / self.len_sum,
            ));
        }
        if self.pt_count > 0 {
            let n = self.pt_count as f64;
            return Some(Coordinate::new(self.pt_cx / n, self.pt_cy / n));
        }
        None
    }
}

fn json_array(value: &Value) -> Result<&Vec<Value>, GeometryError> {
    value
        .as_array()
        .ok_or_else(|| GeometryError::Malformed(format!("expected array, got {}", value)))
}

fn json_coordinate(value: &Value) -> Result<Coordinate, GeometryError> {
    let parts = json_array(value)?;
    let ordinate = |i: usize| -> Result<Option<f64>, GeometryError> {
        match parts.get(i) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| GeometryError::Malformed(format!("bad ordinate {}", v))),
        }
    };
    match (ordinate(0)?, ordinate(1)?, ordinate(2)?) {
        (Some(x), Some(y), Some(z)) => Ok(Coordinate::with_z(x, y, z)),
        (Some(x), Some(y), None) => Ok(Coordinate::new(x, y)),
        _ => Err(GeometryError::Malformed(format!("bad position {}", value))),
    }
}

fn json_sequence(value: &Value) -> Result<Vec<Coordinate>, GeometryError> {
    json_array(value)?.iter().map(json_coordinate).collect()
}

fn json_polygon(value: &Value) -> Result<Polygon, GeometryError> {
    let mut rings = json_array(value)?
        .iter()
        .map(json_sequence)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| GeometryError::Malformed("polygon without rings".to_string()))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn wkt_coordinate(text: &str) -> Result<Coordinate, GeometryError> {
    let values = text
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| GeometryError::Malformed(text.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [x, y] => Ok(Coordinate::new(*x, *y)),
        [x, y, z] => Ok(Coordinate::with_z(*x, *y, *z)),
        _ => Err(GeometryError::Malformed(text.to_string())),
    }
}

fn wkt_sequence(text: &str) -> Result<Vec<Coordinate>, GeometryError> {
    text.split(',').map(|c| wkt_coordinate(c.trim())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(1.0, 0.0),
                Coordinate::new(0.0, 0.0),
            ],
            vec![],
        )
    }

    #[test]
    fn test_polygon_area_and_centroid() {
        let g = Geometry::Polygon(square());
        assert!((g.area() - 1.0).abs() < 1e-12);
        let c = g.centroid().unwrap();
        assert!((c.x - 0.5).abs() < 1e-12);
        assert!((c.y - 0.5).abs() < 1e-12);
        assert!(!c.has_z());
    }

    #[test]
    fn test_line_centroid_is_length_weighted() {
        let g = Geometry::LineString(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(2.0, 0.0),
        ]);
        let c = g.centroid().unwrap();
        assert_eq!((c.x, c.y), (1.0, 0.0));
    }

    #[test]
    fn test_envelope_of_collection() {
        let g = Geometry::GeometryCollection(vec![
            Geometry::Point(Coordinate::new(-5.0, 2.0)),
            Geometry::Polygon(square()),
        ]);
        assert_eq!(g.envelope(), Envelope::new(-5.0, 0.0, 1.0, 2.0));
    }

    #[test]
    fn test_from_geojson_point_with_z() {
        let v = serde_json::json!({"type": "Point", "coordinates": [1.5, 2.5, 30.0]});
        let g = Geometry::from_geojson(&v).unwrap();
        assert_eq!(g, Geometry::Point(Coordinate::with_z(1.5, 2.5, 30.0)));
    }

    #[test]
    fn test_from_wkt_polygon_with_hole() {
        let g = Geometry::from_wkt("POLYGON ((0 0, 0 4, 4 4, 4 0, 0 0), (1 1, 1 2, 2 2, 2 1, 1 1))")
            .unwrap();
        match g {
            Geometry::Polygon(p) => {
                assert_eq!(p.exterior.len(), 5);
                assert_eq!(p.interiors.len(), 1);
                assert!((p.area() - 15.0).abs() < 1e-12);
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }
}
