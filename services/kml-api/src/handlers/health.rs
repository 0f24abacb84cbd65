//! Health checks, metrics, and the layer listing.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

// ============================================================================
// Health Checks
// ============================================================================

/// GET /health - Basic health check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ready - Ready once at least one layer is configured.
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    if state.catalog.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "No layers configured")
    } else {
        (StatusCode::OK, "Ready")
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// GET /metrics - Prometheus text exposition
pub async fn metrics_handler(prometheus: Option<Extension<PrometheusHandle>>) -> Response {
    let body = prometheus.map(|Extension(handle)| handle.render()).unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// GET /api/metrics - JSON snapshot of the service counters
pub async fn api_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot().await)
}

// ============================================================================
// Layers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub title: String,
    pub kind: kml_common::LayerKind,
    pub default_style: String,
    pub styles: Vec<String>,
    pub bounds: Option<kml_common::Envelope>,
}

/// GET /api/layers
pub async fn layers_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<LayerSummary>> {
    let mut layers: Vec<LayerSummary> = state
        .catalog
        .layers()
        .map(|entry| LayerSummary {
            name: entry.layer.id.to_string(),
            title: entry.layer.title.clone(),
            kind: entry.layer.kind,
            default_style: entry.layer.default_style.clone(),
            styles: entry.layer.styles.clone(),
            bounds: entry.layer.bounds,
        })
        .collect();
    layers.sort_by(|a, b| a.name.cmp(&b.name));
    Json(layers)
}
