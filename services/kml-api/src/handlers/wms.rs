//! WMS GetMap in KML, KMZ and PNG.
//!
//! KML documents are planned first and streamed after: a bad layer, style
//! or strategy is still answered with a service exception, while the body
//! of a good request starts flowing before the last placemark is encoded.

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::Response,
};
use kml_common::{KmlError, KmlResult, MapLayer, Style};
use kml_encoder::{
    download_filename, DocumentAssembler, EncodeContext, EncodeSummary, GetMapRequest, KvpParams,
    OutputFormat,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use super::common::{
    bytes_response, channel_body, content_disposition, kml_exception, map_request, resolve_layers,
    wms_exception, BodyChunk, ChannelWriter,
};
use crate::state::AppState;

/// Chunks buffered between the encoder thread and the response body.
const STREAM_CHANNEL_DEPTH: usize = 16;

// ============================================================================
// WMS Handler Entry Point
// ============================================================================

#[instrument(skip(state, params))]
pub async fn wms_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = match KvpParams::from_pairs(params).and_then(KvpParams::into_get_map) {
        Ok(request) => request,
        Err(e) => return kml_exception(&state, &e),
    };
    get_map(state, request, false).await
}

/// Answer a GetMap request. `download` marks the response as an
/// attachment.
pub async fn get_map(state: Arc<AppState>, request: GetMapRequest, download: bool) -> Response {
    state.metrics.record_map_request(request.format.extension());
    info!(
        layers = ?request.layers,
        bbox = %request.bbox.to_wms_string(),
        format = request.format.extension(),
        "GetMap"
    );

    let attachment = (download || request.format == OutputFormat::Kmz)
        .then(|| attachment_name(&state, &request));
    match request.format {
        OutputFormat::Kml => stream_kml(state, request, attachment).await,
        OutputFormat::Kmz => buffered(state, request, attachment, encode_kmz).await,
        OutputFormat::Png => buffered(state, request, attachment, render_png).await,
    }
}

fn attachment_name(state: &AppState, request: &GetMapRequest) -> String {
    let layers: Vec<&MapLayer> = request
        .layers
        .iter()
        .filter_map(|name| state.catalog.layer(name).ok())
        .map(|entry| &entry.layer)
        .collect();
    if layers.is_empty() {
        return format!("map.{}", request.format.extension());
    }
    download_filename(&layers, request.format.extension())
}

// ============================================================================
// KML
// ============================================================================

async fn stream_kml(
    state: Arc<AppState>,
    request: GetMapRequest,
    attachment: Option<String>,
) -> Response {
    let (planned_tx, planned_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);

    let task_state = state.clone();
    let started = Instant::now();
    let encoder =
        tokio::task::spawn_blocking(move || write_kml(&task_state, &request, planned_tx, tx));

    match planned_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return kml_exception(&state, &e),
        Err(_) => {
            let e = KmlError::Internal("KML encoder stopped before planning".to_string());
            return kml_exception(&state, &e);
        }
    }

    // The body is already committed; the outcome only reaches logs and metrics.
    let metrics_state = state.clone();
    tokio::spawn(async move {
        match encoder.await {
            Ok(Ok(summary)) => record(&metrics_state, "kml", &summary, started).await,
            Ok(Err(e)) if e.is_client_disconnect() => {
                debug!("Client went away while the document was streaming");
                metrics_state.metrics.record_client_disconnect();
            }
            Ok(Err(e)) => warn!(error = %e, "KML document aborted"),
            Err(e) => warn!(error = %e, "KML encoder task failed"),
        }
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, OutputFormat::Kml.mime_type());
    if let Some(name) = attachment {
        builder = builder.header(header::CONTENT_DISPOSITION, content_disposition(&name));
    }
    builder
        .body(channel_body(rx))
        .unwrap_or_else(|e| {
            wms_exception(
                "NoApplicableCode",
                &e.to_string(),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        })
}

/// Plan, report the plan's outcome, then stream. Runs on a blocking thread.
fn write_kml(
    state: &AppState,
    request: &GetMapRequest,
    planned: oneshot::Sender<KmlResult<()>>,
    tx: mpsc::Sender<BodyChunk>,
) -> KmlResult<EncodeSummary> {
    let prepared = map_request(state, request).and_then(|map| {
        let layers = resolve_layers(
            state,
            &request.layers,
            &request.styles,
            request.filter.as_ref(),
        )?;
        Ok((map, layers))
    });
    let (map, layers) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => return report_plan_failure(planned, e),
    };

    let ctx = EncodeContext::new(&map, &state.settings, state.collaborators());
    let assembler = DocumentAssembler::new(ctx, &layers);
    let plan = match assembler.plan() {
        Ok(plan) => plan,
        Err(e) => return report_plan_failure(planned, e),
    };
    if planned.send(Ok(())).is_err() {
        return Err(KmlError::Stream(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "request dropped before streaming",
        )));
    }

    let abort = tx.clone();
    let result = assembler
        .write(&plan, ChannelWriter::new(tx))
        .and_then(|(mut sink, summary)| {
            sink.flush().map_err(KmlError::Stream)?;
            Ok(summary)
        });
    if let Err(e) = &result {
        if !e.is_client_disconnect() {
            // Ends the body with an error so the client sees a broken transfer.
            let _ = abort.blocking_send(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )));
        }
    }
    result
}

fn report_plan_failure(
    planned: oneshot::Sender<KmlResult<()>>,
    err: KmlError,
) -> KmlResult<EncodeSummary> {
    let message = err.to_string();
    let _ = planned.send(Err(err));
    Err(KmlError::Internal(format!("not planned: {}", message)))
}

// ============================================================================
// KMZ and PNG
// ============================================================================

async fn buffered(
    state: Arc<AppState>,
    request: GetMapRequest,
    attachment: Option<String>,
    encode: fn(&AppState, &GetMapRequest) -> KmlResult<(Vec<u8>, Option<EncodeSummary>)>,
) -> Response {
    let format = request.format;
    let task_state = state.clone();
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || encode(&task_state, &request))
        .await
        .map_err(|e| KmlError::Internal(format!("encoder task failed: {}", e)))
        .and_then(|r| r);

    match result {
        Ok((bytes, summary)) => {
            match summary {
                Some(summary) => record(&state, format.extension(), &summary, started).await,
                None => state.metrics.record_render("map", started.elapsed()).await,
            }
            bytes_response(format, bytes, attachment.as_deref())
        }
        Err(e) => kml_exception(&state, &e),
    }
}

fn encode_kmz(
    state: &AppState,
    request: &GetMapRequest,
) -> KmlResult<(Vec<u8>, Option<EncodeSummary>)> {
    let map = map_request(state, request)?;
    let filter = request.filter.as_ref();
    let layers = resolve_layers(state, &request.layers, &request.styles, filter)?;
    let ctx = EncodeContext::new(&map, &state.settings, state.collaborators());
    let assembler = DocumentAssembler::new(ctx, &layers);
    let plan = assembler.plan()?;
    let (archive, summary) = assembler.write_kmz(
        &plan,
        Cursor::new(Vec::new()),
        &state.renderer,
        &state.renderer,
    )?;
    Ok((archive.into_inner(), Some(summary)))
}

fn render_png(
    state: &AppState,
    request: &GetMapRequest,
) -> KmlResult<(Vec<u8>, Option<EncodeSummary>)> {
    let layers = resolve_layers(state, &request.layers, &request.styles, None)?;
    let pairs: Vec<(&MapLayer, &Style)> = layers.iter().map(|l| (l.layer, l.style)).collect();
    let png = state
        .renderer
        .render_map(&pairs, &request.bbox, request.width, request.height)?;
    Ok((png, None))
}

async fn record(state: &AppState, format: &'static str, summary: &EncodeSummary, started: Instant) {
    let elapsed = started.elapsed();
    for diagnostic in &summary.diagnostics {
        debug!(diagnostic = ?diagnostic, "Feature diagnostic");
    }
    info!(
        format,
        placemarks = summary.placemarks,
        ground_overlays = summary.ground_overlays,
        links_emitted = summary.links_emitted,
        links_skipped = summary.links_skipped,
        diagnostics = summary.diagnostics.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Document encoded"
    );
    state.metrics.record_document(format, summary, elapsed).await;
}
