//! Point icons and legend images referenced from KML documents.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
};
use kml_common::style::{Fill, PointSymbolizer, Stroke};
use kml_common::{Color, KmlError, KmlResult};
use kml_encoder::{IconRenderer, OutputFormat};
use serde::Deserialize;
use tracing::instrument;

use super::common::{bytes_response, kml_exception};
use crate::state::AppState;

/// Query written by the encoder's icon links.
#[derive(Debug, Default, Deserialize)]
pub struct IconParams {
    pub mark: Option<String>,
    /// `rrggbb`
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub size: Option<f64>,
}

impl IconParams {
    fn symbolizer(&self) -> KmlResult<PointSymbolizer> {
        if let Some(size) = self.size.filter(|s| !s.is_finite() || *s <= 0.0) {
            return Err(KmlError::invalid_parameter(
                "size",
                format!("{} is not a positive size", size),
            ));
        }
        Ok(PointSymbolizer {
            mark: self.mark.clone(),
            fill: self.fill.as_deref().map(|hex| Fill {
                color: hex_color(hex),
                opacity: None,
            }),
            stroke: self.stroke.as_deref().map(|hex| Stroke {
                color: Some(hex_color(hex)),
                opacity: None,
                width: None,
            }),
            size: self.size,
            ..Default::default()
        })
    }
}

fn hex_color(hex: &str) -> Color {
    Color::Hex(format!("#{}", hex.trim_start_matches('#')))
}

/// GET /icon/:style
#[instrument(skip(state))]
pub async fn icon_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(style): Path<String>,
    Query(params): Query<IconParams>,
) -> Response {
    if state.catalog.style(&style).is_none() {
        return kml_exception(&state, &KmlError::StyleNotFound(style));
    }
    let started = Instant::now();
    let png = params
        .symbolizer()
        .and_then(|symbolizer| Ok(state.renderer.render_icon(&symbolizer)?));
    match png {
        Ok(png) => {
            state.metrics.record_render("icon", started.elapsed()).await;
            bytes_response(OutputFormat::Png, png, None)
        }
        Err(e) => kml_exception(&state, &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LegendParams {
    pub layer: String,
    #[serde(default)]
    pub style: String,
}

/// GET /legend?layer=&style=
#[instrument(skip(state))]
pub async fn legend_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<LegendParams>,
) -> Response {
    let started = Instant::now();
    let png = state.catalog.layer(&params.layer).and_then(|entry| {
        let style = state.catalog.resolve_style(&entry.layer, &params.style)?;
        Ok(state.renderer.render_legend(&entry.layer, style)?)
    });
    match png {
        Ok(png) => {
            state.metrics.record_render("legend", started.elapsed()).await;
            bytes_response(OutputFormat::Png, png, None)
        }
        Err(e) => kml_exception(&state, &e),
    }
}
