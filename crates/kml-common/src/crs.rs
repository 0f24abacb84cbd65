//! Coordinate Reference System types and utilities.
//!
//! KML is always WGS84 longitude/latitude, so the only job here is to
//! recognise the request CRS and bring a Web Mercator box back to degrees.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::Envelope;

/// Semi-major axis of the WGS84 ellipsoid, used by spherical Web Mercator.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the width of the Web Mercator square in metres.
pub const MERCATOR_MAX_EXTENT: f64 = 20_037_508.342_789_244;

/// Well-known CRS codes accepted in requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS string from a request (SRS or CRS parameter).
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:4326"
    /// - "CRS:84"
    /// - "EPSG:900913"
    pub fn from_wms_string(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }
}

impl Default for CrsCode {
    fn default() -> Self {
        CrsCode::Epsg4326
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CrsCode::Epsg4326 => "EPSG:4326",
            CrsCode::Epsg3857 => "EPSG:3857",
        };
        write!(f, "{}", code)
    }
}

/// A CRS with the transform needed to produce WGS84 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crs {
    pub code: CrsCode,
}

impl Crs {
    pub fn new(code: CrsCode) -> Self {
        Self { code }
    }

    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        CrsCode::from_wms_string(s).map(Self::new)
    }

    /// Get the valid bounds for this CRS.
    pub fn valid_bounds(&self) -> Envelope {
        match self.code {
            CrsCode::Epsg4326 => crate::envelope::WORLD_BOUNDS,
            CrsCode::Epsg3857 => Envelope::new(
                -MERCATOR_MAX_EXTENT,
                -MERCATOR_MAX_EXTENT,
                MERCATOR_MAX_EXTENT,
                MERCATOR_MAX_EXTENT,
            ),
        }
    }

    /// Reproject an envelope in this CRS to WGS84 degrees.
    pub fn to_wgs84(&self, envelope: &Envelope) -> Result<Envelope, CrsParseError> {
        if envelope.is_null() {
            return Ok(*envelope);
        }
        match self.code {
            CrsCode::Epsg4326 => Ok(*envelope),
            CrsCode::Epsg3857 => {
                let (min_lon, min_lat) = mercator_to_wgs84(envelope.min_x, envelope.min_y)?;
                let (max_lon, max_lat) = mercator_to_wgs84(envelope.max_x, envelope.max_y)?;
                Ok(Envelope::new(min_lon, min_lat, max_lon, max_lat))
            }
        }
    }
}

/// Convert Web Mercator metres to WGS84 degrees.
pub fn mercator_to_wgs84(x: f64, y: f64) -> Result<(f64, f64), CrsParseError> {
    let limit = MERCATOR_MAX_EXTENT * (1.0 + 1e-9);
    if !x.is_finite() || !y.is_finite() || x.abs() > limit || y.abs() > limit {
        return Err(CrsParseError::OutOfDomain { x, y });
    }
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    Ok((lon, lat))
}

/// Convert WGS84 degrees to Web Mercator metres.
pub fn wgs84_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = ((PI / 4.0) + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Coordinate ({x}, {y}) is outside the Web Mercator domain")]
    OutOfDomain { x: f64, y: f64 },
}
