//! Shared pieces of the map, reflector and icon handlers: exception
//! responses, layer resolution and the streaming body writer.

use std::io::{self, Write};

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use kml_common::{Filter, KmlError, KmlResult};
use kml_encoder::{
    service_exception, FeatureSource, GetMapRequest, KmlOptions, LayerRequest, MapRequest,
    OutputFormat,
};
use tokio::sync::mpsc;
use tracing::warn;

use crate::state::AppState;

/// Bytes collected before a chunk is handed to the response body.
pub const STREAM_CHUNK_SIZE: usize = 16 * 1024;

// ============================================================================
// Exception Helpers
// ============================================================================

/// Generate a WMS-formatted exception response
pub fn wms_exception(code: &str, msg: &str, status: StatusCode) -> Response {
    let body = service_exception(code, msg);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/vnd.ogc.se_xml")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Exception response for an engine error, counted in the metrics.
pub fn kml_exception(state: &AppState, err: &KmlError) -> Response {
    let code = err.service_exception_code();
    state.metrics.record_error(code);
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(error = %err, code, "Request failed");
    }
    wms_exception(code, &err.to_string(), status)
}

/// A complete in-memory response body.
pub fn bytes_response(format: OutputFormat, bytes: Vec<u8>, attachment: Option<&str>) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.mime_type());
    if let Some(name) = attachment {
        builder = builder.header(header::CONTENT_DISPOSITION, content_disposition(name));
    }
    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub fn content_disposition(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename.replace('"', ""))
}

// ============================================================================
// Layer Resolution
// ============================================================================

/// Look up every requested layer with its style. A missing or empty style
/// entry means the layer's default style.
pub fn resolve_layers<'s>(
    state: &'s AppState,
    layers: &[String],
    styles: &[String],
    filter: Option<&Filter>,
) -> KmlResult<Vec<LayerRequest<'s>>> {
    if styles.len() > layers.len() && styles.iter().any(|s| !s.is_empty()) {
        return Err(KmlError::invalid_parameter(
            "STYLES",
            format!("{} styles given for {} layers", styles.len(), layers.len()),
        ));
    }

    layers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let entry = state.catalog.layer(name)?;
            let requested = styles.get(i).map(String::as_str).unwrap_or("");
            let style = state.catalog.resolve_style(&entry.layer, requested)?;
            let default_style = state.catalog.default_style(&entry.layer)?;

            let mut request =
                LayerRequest::new(&entry.layer, style).with_default_style(default_style);
            if let Some(source) = entry.source.as_ref() {
                request = request.with_source(source as &dyn FeatureSource);
            }
            if let Some(filter) = filter {
                request = request.with_filter(filter.clone());
            }
            Ok(request)
        })
        .collect()
}

/// The encoder's view of a GetMap request.
pub fn map_request(state: &AppState, request: &GetMapRequest) -> KmlResult<MapRequest> {
    let options = KmlOptions::resolve(&request.format_options, &state.settings)?;
    Ok(MapRequest {
        bbox: request.bbox,
        width: request.width,
        height: request.height,
        format_options: request.format_options.clone(),
        options,
        base_url: state.base_url.clone(),
        kmz: request.format == OutputFormat::Kmz,
        start_index: request.start_index,
        max_features: request.max_features,
    })
}

// ============================================================================
// Streaming Body
// ============================================================================

pub type BodyChunk = Result<Bytes, io::Error>;

/// A blocking `Write` that feeds an async response body. Once the client
/// has gone every write fails with `BrokenPipe`.
pub struct ChannelWriter {
    tx: mpsc::Sender<BodyChunk>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<BodyChunk>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(STREAM_CHUNK_SIZE),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(STREAM_CHUNK_SIZE),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= STREAM_CHUNK_SIZE {
            self.send_buffer()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}

/// Response body that yields whatever the writer sends.
pub fn channel_body(rx: mpsc::Receiver<BodyChunk>) -> Body {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_writer_chunks_and_flushes() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut writer = ChannelWriter::new(tx);
        writer.write_all(&vec![b'a'; STREAM_CHUNK_SIZE + 10]).unwrap();
        writer.write_all(b"tail").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let first = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(first.len(), STREAM_CHUNK_SIZE + 10);
        assert_eq!(&rx.blocking_recv().unwrap().unwrap()[..], b"tail");
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_channel_writer_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ChannelWriter::new(tx);
        writer.write_all(b"<kml>").unwrap();
        let err = writer.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("topp-states.kmz"),
            "attachment; filename=\"topp-states.kmz\""
        );
    }
}
