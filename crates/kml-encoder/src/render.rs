//! Image collaborators. The encoder only asks for PNG bytes; drawing lives
//! in the service.

use kml_common::style::PointSymbolizer;
use kml_common::{Envelope, KmlError, MapLayer};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Layer {layer} cannot be rendered: {message}")]
    Layer { layer: String, message: String },

    #[error("Invalid image size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Image encoding failed: {0}")]
    Encode(String),
}

impl From<RenderError> for KmlError {
    fn from(err: RenderError) -> Self {
        KmlError::Render(err.to_string())
    }
}

/// Draws one layer over an envelope as a PNG.
pub trait TileRenderer: Send + Sync {
    fn render_tile(
        &self,
        layer: &MapLayer,
        style: &str,
        envelope: &Envelope,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Draws a point symbol as a PNG for inline KMZ icons.
pub trait IconRenderer: Send + Sync {
    fn render_icon(&self, symbolizer: &PointSymbolizer) -> Result<Vec<u8>, RenderError>;
}
