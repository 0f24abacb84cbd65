//! Application state and shared resources.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use kml_common::DateFormats;
use kml_encoder::{AttributeTemplate, Collaborators, KmlSettings, SymbolizerIconExtractor};

use crate::layer_config::{load_settings, Catalog};
use crate::metrics::MetricsCollector;
use crate::rendering::ImageRenderer;

/// Shared application state.
pub struct AppState {
    pub settings: KmlSettings,
    pub dates: DateFormats,
    pub template: AttributeTemplate,
    pub catalog: Arc<Catalog>,
    pub renderer: ImageRenderer,
    pub metrics: Arc<MetricsCollector>,
    /// Public URL of this service, used in every generated link.
    pub base_url: String,
}

impl AppState {
    /// Load settings, styles and layers from a configuration directory.
    pub fn new<P: AsRef<Path>>(config_dir: P, base_url: impl Into<String>) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let settings = load_settings(config_dir)?;
        let catalog = Catalog::load_from_directory(config_dir)?;
        info!(
            config_dir = %config_dir.display(),
            layers = catalog.len(),
            "Loaded layer catalog"
        );
        Ok(Self::from_parts(settings, catalog, base_url))
    }

    pub fn from_parts(
        settings: KmlSettings,
        catalog: Catalog,
        base_url: impl Into<String>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            dates: settings.date_table(),
            template: AttributeTemplate::default(),
            renderer: ImageRenderer::new(catalog.clone()),
            catalog,
            settings,
            metrics: Arc::new(MetricsCollector::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            template: &self.template,
            icons: &SymbolizerIconExtractor,
            dates: &self.dates,
        }
    }
}
