//! Simple features: an identifier, a default geometry and a bag of attributes.

use serde_json::{Map, Value};

use crate::Geometry;

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature identifier, conventionally `<type>.<n>`.
    pub id: String,
    pub geometry: Geometry,
    pub attributes: Map<String, Value>,
}

impl Feature {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute rendered as display text. Strings are returned unquoted,
    /// null and missing attributes yield `None`.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The identifier with the characters that upset KML readers removed.
    pub fn sanitized_id(&self) -> String {
        self.id.replace(['&', '>', '<', '%'], "")
    }

    /// The part of the id after the first `.`, or the whole id.
    pub fn local_id(&self) -> &str {
        self.id.split_once('.').map(|(_, n)| n).unwrap_or(&self.id)
    }
}
