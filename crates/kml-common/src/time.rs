//! Lenient date/time parsing for template-produced timestamps.
//!
//! Templates emit dates in whatever shape the data has, so parsing tries an
//! ordered table of patterns: date-times first, then dates, then bare times,
//! and finally the XML-schema forms.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Separators tried for every templated date pattern, in order.
const SEPARATORS: [&str; 5] = ["-", "/", ".", " ", ","];

/// What a pattern yields when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    DateTime,
    Date,
    Time,
}

impl PatternKind {
    /// Classify a chrono pattern by the fields it contains.
    pub fn infer(pattern: &str) -> Self {
        let has_time = ["%H", "%I", "%M", "%S", "%T", "%R"]
            .iter()
            .any(|f| pattern.contains(f));
        let has_date = ["%Y", "%y", "%m", "%d", "%b", "%B", "%F", "%D"]
            .iter()
            .any(|f| pattern.contains(f));
        match (has_date, has_time) {
            (true, true) => PatternKind::DateTime,
            (false, true) => PatternKind::Time,
            _ => PatternKind::Date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePattern {
    pub pattern: String,
    pub kind: PatternKind,
}

impl DatePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let kind = PatternKind::infer(&pattern);
        Self { pattern, kind }
    }

    fn parse(&self, text: &str) -> Option<NaiveDateTime> {
        match self.kind {
            PatternKind::DateTime => NaiveDateTime::parse_from_str(text, &self.pattern).ok(),
            PatternKind::Date => NaiveDate::parse_from_str(text, &self.pattern)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            PatternKind::Time => NaiveTime::parse_from_str(text, &self.pattern)
                .ok()
                .zip(NaiveDate::from_ymd_opt(1970, 1, 1))
                .map(|(t, d)| d.and_time(t)),
        }
    }
}

/// The ordered pattern table. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormats {
    patterns: Vec<DatePattern>,
}

impl Default for DateFormats {
    fn default() -> Self {
        let mut patterns = vec![DatePattern::new("%m/%d/%Y %H:%M:%S")];

        for templ in [
            "%d~%m~%Y %H:%M:%S",
            "%m~%d~%Y %H:%M:%S",
            "%d~%b~%Y %H:%M:%S",
            "%b~%d~%Y %H:%M:%S",
            "%d~%m~%Y %H:%M",
            "%m~%d~%Y %H:%M",
            "%d~%b~%Y %H:%M",
            "%b~%d~%Y %H:%M",
        ] {
            push_separated(&mut patterns, templ);
        }

        patterns.push(DatePattern::new("%m/%d/%Y"));
        for templ in ["%d~%m~%Y", "%m~%d~%Y", "%d~%b~%Y", "%b~%d~%Y"] {
            push_separated(&mut patterns, templ);
        }

        patterns.push(DatePattern::new("%H:%M:%S"));
        patterns.push(DatePattern::new("%H:%M"));

        Self { patterns }
    }
}

/// Expand `~` placeholders into each separator, with both two and four
/// digit year variants.
fn push_separated(patterns: &mut Vec<DatePattern>, templ: &str) {
    for sep in SEPARATORS {
        let p = templ.replace('~', sep);
        patterns.push(DatePattern::new(p.replace("%Y", "%y")));
        patterns.push(DatePattern::new(p));
    }
}

impl DateFormats {
    /// A table made of the given chrono patterns, tried in order.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(DatePattern::new).collect(),
        }
    }

    pub fn patterns(&self) -> &[DatePattern] {
        &self.patterns
    }

    /// Parse a timestamp, trying date-times, dates, then times in table order,
    /// then RFC 3339 / xs:dateTime / xs:date.
    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>, TimeParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TimeParseError::Empty);
        }

        for kind in [PatternKind::DateTime, PatternKind::Date, PatternKind::Time] {
            let hit = self
                .patterns
                .iter()
                .filter(|p| p.kind == kind)
                .find_map(|p| p.parse(text));
            if let Some(naive) = hit {
                return Ok(naive.and_utc());
            }
        }

        parse_xml_schema(text).ok_or_else(|| TimeParseError::Unrecognised(text.to_string()))
    }
}

fn parse_xml_schema(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    let date_part = text.strip_suffix('Z').unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// Format as an xs:dateTime in UTC, e.g. `2007-03-14T10:30:00Z`.
pub fn format_xs_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Empty time value")]
    Empty,

    #[error("Unrecognised date/time: {0}")]
    Unrecognised(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_separators() {
        let formats = DateFormats::default();
        for text in ["14-03-2007", "14/03/2007", "14.03.2007", "14 03 2007", "14,03,2007"] {
            let dt = formats.parse(text).unwrap();
            assert_eq!((dt.year(), dt.month(), dt.day()), (2007, 3, 14), "{}", text);
        }
    }

    #[test]
    fn test_date_time_before_date() {
        let formats = DateFormats::default();
        let dt = formats.parse("03/14/2007 10:30:15").unwrap();
        assert_eq!((dt.month(), dt.day(), dt.hour(), dt.second()), (3, 14, 10, 15));

        let dt = formats.parse("14-Mar-2007 08:00").unwrap();
        assert_eq!((dt.month(), dt.hour()), (3, 8));
    }

    #[test]
    fn test_xml_schema_fallback() {
        let formats = DateFormats::default();
        let dt = formats.parse("2007-03-14T10:30:00Z").unwrap();
        assert_eq!(format_xs_datetime(&dt), "2007-03-14T10:30:00Z");

        let dt = formats.parse("2007-03-14").unwrap();
        assert_eq!(format_xs_datetime(&dt), "2007-03-14T00:00:00Z");
    }

    #[test]
    fn test_unparseable() {
        let formats = DateFormats::default();
        assert!(matches!(
            formats.parse("not a date"),
            Err(TimeParseError::Unrecognised(_))
        ));
        assert!(matches!(formats.parse("  "), Err(TimeParseError::Empty)));
    }

    #[test]
    fn test_custom_patterns() {
        let formats = DateFormats::from_patterns(["%Y%m%d"]);
        assert_eq!(formats.patterns()[0].kind, PatternKind::Date);
        let dt = formats.parse("20070314").unwrap();
        assert_eq!(dt.day(), 14);
    }
}
