//! KML map service library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod handlers;
pub mod layer_config;
pub mod metrics;
pub mod rendering;
pub mod state;

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// All routes with the shared state attached.
pub fn router(state: Arc<AppState>, prometheus: Option<PrometheusHandle>) -> Router {
    let app = Router::new()
        // Map documents
        .route("/wms", get(handlers::wms_handler))
        .route("/wms/", get(handlers::wms_handler))
        .route("/kml", get(handlers::kml_reflect_handler))
        .route("/wms/kml", get(handlers::kml_reflect_handler))
        // Images referenced from documents
        .route("/icon/:style", get(handlers::icon_handler))
        .route("/legend", get(handlers::legend_handler))
        // Health check
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        // Metrics
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        .route("/api/layers", get(handlers::layers_handler))
        .layer(Extension(state));

    let app = match prometheus {
        Some(handle) => app.layer(Extension(handle)),
        None => app,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
