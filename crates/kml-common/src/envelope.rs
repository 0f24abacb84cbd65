//! Axis-aligned envelope types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding rectangle in geographic coordinates.
///
/// An envelope is either a proper rectangle (`min <= max` on both axes) or the
/// distinct *null* envelope, which contains nothing and is the identity for
/// [`Envelope::expand_to_include`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// The whole WGS84 world.
pub const WORLD_BOUNDS: Envelope = Envelope {
    min_x: -180.0,
    min_y: -90.0,
    max_x: 180.0,
    max_y: 90.0,
};

impl Envelope {
    /// Create a new envelope from corner coordinates. Corners are normalised so
    /// the result always satisfies `min <= max`.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// The null envelope.
    pub const fn null() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: -1.0,
            max_y: -1.0,
        }
    }

    /// A zero-area envelope around a single point.
    pub fn of_point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Parse a WMS BBOX parameter string: "minx,miny,maxx,maxy"
    pub fn from_wms_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
            if !value.is_finite() {
                return Err(BboxParseError::InvalidNumber(part.to_string()));
            }
        }

        if values[0] > values[2] || values[1] > values[3] {
            return Err(BboxParseError::Inverted(s.to_string()));
        }

        Ok(Self {
            min_x: values[0],
            min_y: values[1],
            max_x: values[2],
            max_y: values[3],
        })
    }

    pub fn is_null(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    /// Width of the envelope in coordinate units (0 for the null envelope).
    pub fn width(&self) -> f64 {
        if self.is_null() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    /// Height of the envelope in coordinate units (0 for the null envelope).
    pub fn height(&self) -> f64 {
        if self.is_null() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn centre(&self) -> Option<(f64, f64)> {
        if self.is_null() {
            return None;
        }
        Some((
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        ))
    }

    /// Grow this envelope so it contains the given point.
    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        if x.is_nan() || y.is_nan() {
            return;
        }
        if self.is_null() {
            *self = Self::of_point(x, y);
            return;
        }
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Grow this envelope so it contains another envelope.
    pub fn expand_to_include_envelope(&mut self, other: &Envelope) {
        if other.is_null() {
            return;
        }
        self.expand_to_include(other.min_x, other.min_y);
        self.expand_to_include(other.max_x, other.max_y);
    }

    /// Check if this envelope intersects another. Shared edges count as intersecting.
    pub fn intersects(&self, other: &Envelope) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Compute the intersection of two envelopes.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }

        Some(Envelope {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this envelope (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        !self.is_null() && x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        !other.is_null()
            && self.contains_point(other.min_x, other.min_y)
            && self.contains_point(other.max_x, other.max_y)
    }

    /// Format as a WMS BBOX parameter value.
    pub fn to_wms_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::null()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),

    #[error("BBOX minimum exceeds maximum: {0}")]
    Inverted(String),
}
