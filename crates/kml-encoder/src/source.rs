//! Feature sources.
//!
//! A source hands out cursors over the features matching a query. Cursors
//! may hold live resources, so they release them when dropped: iteration
//! that stops early, or unwinds through `?`, still closes the cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kml_common::{Envelope, Feature, Filter, Geometry, KmlError};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Feature source I/O failure: {0}")]
    Io(String),

    /// The source has nothing at all for the query.
    #[error("No data: {0}")]
    NoData(String),

    #[error("Malformed feature data: {0}")]
    Malformed(String),
}

impl From<SourceError> for KmlError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NoData(msg) => KmlError::NoData(msg),
            other => KmlError::Source(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub bbox: Envelope,
    pub filter: Filter,
    pub start_index: usize,
    pub max_features: Option<usize>,
}

impl FeatureQuery {
    pub fn new(bbox: Envelope, filter: Filter) -> Self {
        Self {
            bbox,
            filter,
            start_index: 0,
            max_features: None,
        }
    }

    /// The same query over another box.
    pub fn with_bbox(&self, bbox: Envelope) -> Self {
        Self {
            bbox,
            ..self.clone()
        }
    }

    /// Bounding box and filter test. Filter errors count as no match.
    pub fn matches(&self, feature: &Feature) -> bool {
        if !self.bbox.is_null() && !feature.geometry.envelope().intersects(&self.bbox) {
            return false;
        }
        self.filter.evaluate(feature).unwrap_or_else(|e| {
            debug!(feature = %feature.id, error = %e, "Query filter failed");
            false
        })
    }
}

type CursorItems<'a> = Box<dyn Iterator<Item = Result<Feature, SourceError>> + 'a>;

/// An open iteration over query results.
pub struct FeatureCursor<'a> {
    items: CursorItems<'a>,
    on_close: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> FeatureCursor<'a> {
    pub fn new<I>(items: I) -> Self
    where
        I: Iterator<Item = Result<Feature, SourceError>> + 'a,
    {
        Self {
            items: Box::new(items),
            on_close: None,
        }
    }

    /// Run `close` when the cursor is dropped.
    pub fn on_close<F: FnOnce() + 'a>(mut self, close: F) -> Self {
        self.on_close = Some(Box::new(close));
        self
    }
}

impl Iterator for FeatureCursor<'_> {
    type Item = Result<Feature, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

impl Drop for FeatureCursor<'_> {
    fn drop(&mut self) {
        if let Some(close) = self.on_close.take() {
            close();
        }
    }
}

pub trait FeatureSource: Send + Sync {
    fn features(&self, query: &FeatureQuery) -> Result<FeatureCursor<'_>, SourceError>;

    fn count(&self, query: &FeatureQuery) -> Result<usize, SourceError> {
        let mut n = 0;
        for feature in self.features(query)? {
            feature?;
            n += 1;
        }
        Ok(n)
    }

    /// Extent of all features.
    fn bounds(&self) -> Envelope;
}

/// Features held in memory, loaded from GeoJSON.
#[derive(Debug, Default)]
pub struct MemoryFeatureSource {
    features: Vec<Feature>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryFeatureSource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Parse a GeoJSON FeatureCollection. Features without an `id` are
    /// numbered `{type_name}.{n}`.
    pub fn from_geojson(type_name: &str, value: &Value) -> Result<Self, SourceError> {
        let items = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Malformed("expected a FeatureCollection".to_string()))?;

        let mut features = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let id = match item.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => format!("{}.{}", type_name, n),
                _ => format!("{}.{}", type_name, i + 1),
            };
            let geometry = item
                .get("geometry")
                .ok_or_else(|| SourceError::Malformed(format!("feature {} has no geometry", id)))
                .and_then(|g| {
                    Geometry::from_geojson(g)
                        .map_err(|e| SourceError::Malformed(format!("feature {}: {}", id, e)))
                })?;
            let mut feature = Feature::new(id, geometry);
            if let Some(Value::Object(props)) = item.get("properties") {
                feature.attributes = props.clone();
            }
            features.push(feature);
        }
        Ok(Self::new(features))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Cursors handed out and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }
}

impl FeatureSource for MemoryFeatureSource {
    fn features(&self, query: &FeatureQuery) -> Result<FeatureCursor<'_>, SourceError> {
        let start = query.start_index;
        let limit = query.max_features.unwrap_or(usize::MAX);
        let query = query.clone();
        let open = Arc::clone(&self.open_cursors);
        open.fetch_add(1, Ordering::SeqCst);

        let matching = self
            .features
            .iter()
            .filter(move |f| query.matches(f))
            .skip(start)
            .take(limit)
            .cloned()
            .map(Ok);

        Ok(FeatureCursor::new(matching).on_close(move || {
            open.fetch_sub(1, Ordering::SeqCst);
        }))
    }

    fn bounds(&self) -> Envelope {
        let mut env = Envelope::null();
        for f in &self.features {
            env.expand_to_include_envelope(&f.geometry.envelope());
        }
        env
    }
}
