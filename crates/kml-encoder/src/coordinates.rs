//! Textual coordinate tuples for `<coordinates>` elements.

use kml_common::Coordinate;

/// Smallest magnitude printed in plain decimal form.
pub const DECIMAL_MIN: f64 = 1e-3;

/// Magnitudes at or above this switch to scientific notation.
pub const DECIMAL_MAX: f64 = 1e7;

/// Formats ordinates with a fixed number of decimals, always using `.` as
/// the decimal separator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateFormatter {
    decimals: u32,
    scale: f64,
}

impl Default for CoordinateFormatter {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CoordinateFormatter {
    pub fn new(decimals: u32) -> Self {
        let decimals = decimals.min(15);
        Self {
            decimals,
            scale: 10f64.powi(decimals as i32),
        }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn format(&self, x: f64) -> String {
        let abs = x.abs();
        if (DECIMAL_MIN..DECIMAL_MAX).contains(&abs) {
            let rounded = (x * self.scale + 0.5).floor() / self.scale;
            if rounded.fract() == 0.0 {
                // also turns -0 into "0"
                format!("{}", rounded as i64)
            } else {
                let text = format!("{:.*}", self.decimals as usize, rounded);
                text.trim_end_matches('0').to_string()
            }
        } else if x == 0.0 {
            "0".to_string()
        } else {
            format!("{:E}", x)
        }
    }

    /// Append `x,y` or `x,y,z` to `buf`. A z that is not finite is left out.
    pub fn write_tuple(&self, buf: &mut String, c: &Coordinate) {
        buf.push_str(&self.format(c.x));
        buf.push(',');
        buf.push_str(&self.format(c.y));
        if c.z.is_finite() {
            buf.push(',');
            buf.push_str(&self.format(c.z));
        }
    }

    /// Space separated tuples for a coordinate sequence.
    pub fn format_sequence(&self, coords: &[Coordinate]) -> String {
        let mut buf = String::with_capacity(coords.len() * 24);
        for (i, c) in coords.iter().enumerate() {
            if i > 0 {
                buf.push(' ');
            }
            self.write_tuple(&mut buf, c);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_values_have_no_point() {
        let f = CoordinateFormatter::default();
        assert_eq!(f.format(45.0), "45");
        assert_eq!(f.format(-120.0), "-120");
        assert_eq!(f.format(0.9999999), "1");
    }

    #[test]
    fn test_rounding() {
        let f = CoordinateFormatter::new(3);
        assert_eq!(f.format(12.34567), "12.346");
        assert_eq!(f.format(-12.34567), "-12.346");
        assert_eq!(f.format(0.1), "0.1");
        assert_eq!(f.format(1.5), "1.5");
    }

    #[test]
    fn test_round_trip_within_half_unit() {
        let f = CoordinateFormatter::new(4);
        for x in [0.001, 0.0123456, 1.23456789, -45.678912, 123456.78901, 9999999.9] {
            let parsed: f64 = f.format(x).parse().unwrap();
            assert!((parsed - x).abs() <= 0.5e-4 + 1e-12, "{} -> {}", x, parsed);
        }
    }

    #[test]
    fn test_scientific_fallback() {
        let f = CoordinateFormatter::default();
        assert_eq!(f.format(0.0), "0");
        assert_eq!(f.format(1e-5), "1E-5");
        assert_eq!(f.format(2.5e7), "2.5E7");
        let parsed: f64 = f.format(-3.25e-4).parse().unwrap();
        assert_eq!(parsed, -3.25e-4);
    }

    #[test]
    fn test_tuples() {
        let f = CoordinateFormatter::default();
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::with_z(1.5, 2.0, 10.0),
            Coordinate::with_z(3.0, 4.0, f64::NAN),
        ];
        assert_eq!(f.format_sequence(&coords), "0,0 1.5,2,10 3,4");
    }
}
