//! Camera framing for documents, folders and placemarks.
//!
//! The two corners of the target envelope are placed on a sphere, averaged,
//! and the midpoint is projected back to longitude/latitude. The straight-line
//! distance between the corners becomes the default range.

use std::io::Write;

use kml_common::{Envelope, Geometry, KmlError, KmlResult};

use crate::options::{AltitudeMode, FormatOptions};
use crate::writer::KmlWriter;

/// Mean earth radius in metres.
pub const EARTH_RADIUS: f64 = 6.371e6;

/// Field of view assumed when deriving altitude from range, in degrees.
pub const FIELD_OF_VIEW_DEGREES: f64 = 22.0;

/// Explicit camera settings from the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookAtOptions {
    pub range: Option<f64>,
    pub tilt: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_mode: Option<AltitudeMode>,
    /// Frame this box instead of the natural one.
    pub bbox: Option<Envelope>,
    /// Frame this geometry instead of the natural envelope; wins over `bbox`.
    pub geometry: Option<Geometry>,
}

impl LookAtOptions {
    /// Read `lookatbbox`, `lookatgeometry`, `range`, `tilt`, `heading`,
    /// `altitude` and `lookat_altitude_mode`.
    pub fn from_format_options(options: &FormatOptions) -> KmlResult<Self> {
        let bbox = options
            .get("lookatbbox")
            .map(Envelope::from_wms_string)
            .transpose()?;

        let geometry = options
            .get("lookatgeometry")
            .map(|wkt| {
                Geometry::from_wkt(wkt)
                    .map_err(|e| KmlError::invalid_parameter("lookatgeometry", e.to_string()))
            })
            .transpose()?;

        let altitude_mode = match options.get("lookat_altitude_mode") {
            Some(mode) => Some(AltitudeMode::parse(mode).ok_or_else(|| {
                KmlError::invalid_parameter(
                    "lookat_altitude_mode",
                    format!("Unknown altitude mode: {}", mode),
                )
            })?),
            None => None,
        };

        Ok(Self {
            range: options.f64("range")?,
            tilt: options.f64("tilt")?,
            heading: options.f64("heading")?,
            altitude: options.f64("altitude")?,
            altitude_mode,
            bbox,
            geometry,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAt {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub range: f64,
    pub tilt: f64,
    pub heading: f64,
    pub altitude_mode: AltitudeMode,
}

/// Frame `envelope`, or the override geometry/box from `options`.
///
/// Returns `None` when there is nothing to look at.
pub fn compute(envelope: &Envelope, options: &LookAtOptions) -> Option<LookAt> {
    let target = match (&options.geometry, &options.bbox) {
        (Some(geometry), _) => geometry.envelope(),
        (None, Some(bbox)) => *bbox,
        (None, None) => *envelope,
    };
    if target.is_null() {
        return None;
    }

    let lower = to_cartesian(target.min_x, target.min_y);
    let upper = to_cartesian(target.max_x, target.max_y);
    let mid = [
        (lower[0] + upper[0]) / 2.0,
        (lower[1] + upper[1]) / 2.0,
        (lower[2] + upper[2]) / 2.0,
    ];

    // antipodal corners average to the origin
    let (longitude, latitude) = to_geographic(mid).unwrap_or_else(|| {
        let (x, y) = target.centre().unwrap_or((0.0, 0.0));
        (x, y)
    });

    let range = options.range.unwrap_or_else(|| distance(lower, upper));
    let altitude = options
        .altitude
        .unwrap_or_else(|| range / (2.0 * FIELD_OF_VIEW_DEGREES.to_radians().tan()));

    Some(LookAt {
        longitude,
        latitude,
        altitude,
        range,
        tilt: options.tilt.unwrap_or(0.0),
        heading: options.heading.unwrap_or(0.0),
        altitude_mode: options.altitude_mode.unwrap_or(AltitudeMode::ClampToGround),
    })
}

fn to_cartesian(lon: f64, lat: f64) -> [f64; 3] {
    let theta = (90.0 - lat).to_radians();
    let phi = (90.0 - lon).to_radians();
    [
        EARTH_RADIUS * theta.sin() * phi.cos(),
        EARTH_RADIUS * theta.sin() * phi.sin(),
        EARTH_RADIUS * theta.cos(),
    ]
}

fn to_geographic(p: [f64; 3]) -> Option<(f64, f64)> {
    let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    if r < 1e-6 {
        return None;
    }
    let theta = (p[2] / r).clamp(-1.0, 1.0).acos();
    let phi = p[1].atan2(p[0]);
    let latitude = 90.0 - theta.to_degrees();
    let mut longitude = 90.0 - phi.to_degrees();
    while longitude > 180.0 {
        longitude -= 360.0;
    }
    while longitude <= -180.0 {
        longitude += 360.0;
    }
    Some((longitude, latitude))
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

pub fn write_lookat<W: Write>(w: &mut KmlWriter<W>, look_at: &LookAt) -> KmlResult<()> {
    w.start("LookAt")?;
    w.element("longitude", &look_at.longitude.to_string())?;
    w.element("latitude", &look_at.latitude.to_string())?;
    w.element("altitude", &look_at.altitude.to_string())?;
    w.element("heading", &look_at.heading.to_string())?;
    w.element("tilt", &look_at.tilt.to_string())?;
    w.element("range", &look_at.range.to_string())?;
    w.element("altitudeMode", look_at.altitude_mode.as_str())?;
    w.end("LookAt")
}
