//! Feature templates: the text that goes into placemark names,
//! descriptions and time primitives.

use kml_common::Feature;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Attribute '{attribute}' of {feature} is not a number: {value}")]
    NotNumeric {
        feature: String,
        attribute: String,
        value: String,
    },

    #[error("Template failed for {feature}: {message}")]
    Failed { feature: String, message: String },
}

pub trait FeatureTemplate: Send + Sync {
    fn title(&self, feature: &Feature) -> Result<String, TemplateError>;

    fn snippet(&self, _feature: &Feature) -> Result<Option<String>, TemplateError> {
        Ok(None)
    }

    fn description(&self, feature: &Feature) -> Result<String, TemplateError>;

    /// One value for an instant, two for a begin/end span, none for no time.
    fn time(&self, feature: &Feature) -> Result<Vec<String>, TemplateError>;

    /// Height applied to every coordinate; NaN or zero leaves Z alone.
    fn height(&self, feature: &Feature) -> Result<f64, TemplateError>;
}

/// Builds everything from plain attributes.
#[derive(Debug, Clone)]
pub struct AttributeTemplate {
    /// Tried in order for the title.
    pub title_attributes: Vec<String>,
    pub time_attribute: String,
    pub begin_attribute: String,
    pub end_attribute: String,
    pub height_attribute: String,
    /// Heading of the description table, usually the feature type.
    pub type_name: String,
}

impl Default for AttributeTemplate {
    fn default() -> Self {
        Self {
            title_attributes: vec!["name".to_string(), "title".to_string()],
            time_attribute: "time".to_string(),
            begin_attribute: "begin".to_string(),
            end_attribute: "end".to_string(),
            height_attribute: "height".to_string(),
            type_name: String::new(),
        }
    }
}

impl AttributeTemplate {
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }
}

impl FeatureTemplate for AttributeTemplate {
    fn title(&self, feature: &Feature) -> Result<String, TemplateError> {
        Ok(self
            .title_attributes
            .iter()
            .find_map(|a| feature.attribute_text(a))
            .unwrap_or_default())
    }

    fn description(&self, feature: &Feature) -> Result<String, TemplateError> {
        let mut html = String::new();
        if !self.type_name.is_empty() {
            html.push_str(&format!("<h4>{}</h4>\n", escape_html(&self.type_name)));
        }
        html.push_str("<ul class=\"textattributes\">\n");
        for (name, value) in &feature.attributes {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            html.push_str(&format!(
                "  <li><strong><span class=\"atr-name\">{}</span>:</strong> <span class=\"atr-value\">{}</span></li>\n",
                escape_html(name),
                escape_html(&text)
            ));
        }
        html.push_str("</ul>\n");
        Ok(html)
    }

    fn time(&self, feature: &Feature) -> Result<Vec<String>, TemplateError> {
        if let Some(t) = feature.attribute_text(&self.time_attribute) {
            return Ok(vec![t]);
        }
        let begin = feature.attribute_text(&self.begin_attribute);
        let end = feature.attribute_text(&self.end_attribute);
        Ok(match (begin, end) {
            (Some(b), Some(e)) => vec![b, e],
            (Some(b), None) => vec![b, String::new()],
            (None, Some(e)) => vec![String::new(), e],
            (None, None) => Vec::new(),
        })
    }

    fn height(&self, feature: &Feature) -> Result<f64, TemplateError> {
        match feature.attribute(&self.height_attribute) {
            None | Some(Value::Null) => Ok(f64::NAN),
            Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(f64::NAN)),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(f64::NAN),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| TemplateError::NotNumeric {
                feature: feature.id.clone(),
                attribute: self.height_attribute.clone(),
                value: s.clone(),
            }),
            Some(other) => Err(TemplateError::NotNumeric {
                feature: feature.id.clone(),
                attribute: self.height_attribute.clone(),
                value: other.to_string(),
            }),
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kml_common::{Coordinate, Geometry};

    fn feature() -> Feature {
        Feature::new("poi.7", Geometry::Point(Coordinate::new(0.0, 0.0)))
    }

    #[test]
    fn test_title_fallback_order() {
        let t = AttributeTemplate::default();
        assert_eq!(t.title(&feature()).unwrap(), "");
        let f = feature().with_attribute("title", "Museum");
        assert_eq!(t.title(&f).unwrap(), "Museum");
        let f = f.with_attribute("name", "Louvre");
        assert_eq!(t.title(&f).unwrap(), "Louvre");
    }

    #[test]
    fn test_description_escapes_values() {
        let t = AttributeTemplate::for_type("poi");
        let f = feature().with_attribute("note", "<b>&</b>");
        let html = t.description(&f).unwrap();
        assert!(html.starts_with("<h4>poi</h4>"));
        assert!(html.contains("<span class=\"atr-value\">&lt;b&gt;&amp;&lt;/b&gt;</span>"));
    }

    #[test]
    fn test_time_values() {
        let t = AttributeTemplate::default();
        assert!(t.time(&feature()).unwrap().is_empty());
        let f = feature().with_attribute("time", "2007-03-14");
        assert_eq!(t.time(&f).unwrap(), vec!["2007-03-14"]);
        let f = feature()
            .with_attribute("begin", "2007-03-14")
            .with_attribute("end", "2007-03-15");
        assert_eq!(t.time(&f).unwrap().len(), 2);
    }

    #[test]
    fn test_height() {
        let t = AttributeTemplate::default();
        assert!(t.height(&feature()).unwrap().is_nan());
        assert_eq!(t.height(&feature().with_attribute("height", 12.5)).unwrap(), 12.5);
        assert_eq!(t.height(&feature().with_attribute("height", " 3 ")).unwrap(), 3.0);
        assert!(t.height(&feature().with_attribute("height", "tall")).is_err());
    }
}
