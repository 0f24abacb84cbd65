//! The KML reflector: `/wms/kml` answers with network links (refresh or
//! super-overlay mode) or, in download mode, with the map document itself.

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::Response,
};
use kml_common::KmlResult;
use kml_encoder::kmz::KmzWriter;
use kml_encoder::{
    KmlOptions, KmlWriter, KvpParams, OutputFormat, ReflectLayer, ReflectRequest, Reflector,
    ReflectorMode,
};
use tracing::{info, instrument};

use super::common::{bytes_response, kml_exception};
use super::wms::get_map;
use crate::state::AppState;

#[instrument(skip(state, params))]
pub async fn kml_reflect_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = match KvpParams::from_pairs(params).and_then(KvpParams::into_reflect) {
        Ok(request) => request,
        Err(e) => return kml_exception(&state, &e),
    };
    state.metrics.record_reflect_request(request.mode.as_str());
    info!(layers = ?request.layers, mode = %request.mode, "Reflect");

    if request.mode == ReflectorMode::Download {
        let extent = match download_extent(&state, &request) {
            Ok(extent) => extent,
            Err(e) => return kml_exception(&state, &e),
        };
        return get_map(state.clone(), request.into_get_map(extent), true).await;
    }

    match reflect(&state, &request) {
        Ok(bytes) => bytes_response(request.format, bytes, None),
        Err(e) => kml_exception(&state, &e),
    }
}

fn reflector<'s>(state: &'s AppState, request: &'s ReflectRequest) -> KmlResult<Reflector<'s>> {
    let mut layers = Vec::with_capacity(request.layers.len());
    for (i, name) in request.layers.iter().enumerate() {
        let entry = state.catalog.layer(name)?;
        let style = request.styles.get(i).map(String::as_str).unwrap_or("");
        state.catalog.resolve_style(&entry.layer, style)?;
        layers.push(ReflectLayer {
            layer: &entry.layer,
            style,
        });
    }

    Ok(Reflector {
        base_url: &state.base_url,
        mode: request.mode,
        layers,
        bbox: request.bbox,
        format_options: request.format_options.clone(),
        options: KmlOptions::resolve(&request.format_options, &state.settings)?,
        kmz: request.format == OutputFormat::Kmz,
    })
}

fn download_extent(state: &AppState, request: &ReflectRequest) -> KmlResult<kml_common::Envelope> {
    Ok(reflector(state, request)?.extent())
}

/// The link document, zipped on its own when KMZ was asked for.
fn reflect(state: &AppState, request: &ReflectRequest) -> KmlResult<Vec<u8>> {
    let reflector = reflector(state, request)?;
    let mut w = KmlWriter::new(Vec::new());
    reflector.write(&mut w)?;
    let document = w.into_inner();

    if request.format != OutputFormat::Kmz {
        return Ok(document);
    }
    let mut kmz = KmzWriter::new(Cursor::new(Vec::new()));
    kmz.kml(&document)?;
    Ok(kmz.finish()?.into_inner())
}
