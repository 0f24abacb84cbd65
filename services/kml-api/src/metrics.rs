//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use kml_encoder::EncodeSummary;

/// Metrics collector for the KML service.
#[derive(Debug)]
pub struct MetricsCollector {
    pub map_requests: AtomicU64,
    pub reflect_requests: AtomicU64,
    pub request_errors: AtomicU64,
    /// Documents abandoned because the client went away.
    pub client_disconnects: AtomicU64,

    pub placemarks: AtomicU64,
    pub ground_overlays: AtomicU64,
    pub links_emitted: AtomicU64,
    pub links_skipped: AtomicU64,
    pub diagnostics: AtomicU64,

    encode_times: RwLock<TimingStats>,
    render_times: RwLock<TimingStats>,

    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_us as f64 / self.count as f64) / 1000.0
        }
    }

    fn last_ms(&self) -> f64 {
        self.last_us as f64 / 1000.0
    }

    fn max_ms(&self) -> f64 {
        self.max_us as f64 / 1000.0
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            map_requests: AtomicU64::new(0),
            reflect_requests: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            client_disconnects: AtomicU64::new(0),
            placemarks: AtomicU64::new(0),
            ground_overlays: AtomicU64::new(0),
            links_emitted: AtomicU64::new(0),
            links_skipped: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            encode_times: RwLock::new(TimingStats::default()),
            render_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    pub fn record_map_request(&self, format: &'static str) {
        self.map_requests.fetch_add(1, Ordering::Relaxed);
        counter!("kml_map_requests_total", "format" => format).increment(1);
    }

    pub fn record_reflect_request(&self, mode: &'static str) {
        self.reflect_requests.fetch_add(1, Ordering::Relaxed);
        counter!("kml_reflect_requests_total", "mode" => mode).increment(1);
    }

    /// Record a request answered with a service exception.
    pub fn record_error(&self, code: &'static str) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
        counter!("kml_request_errors_total", "code" => code).increment(1);
    }

    pub fn record_client_disconnect(&self) {
        self.client_disconnects.fetch_add(1, Ordering::Relaxed);
        counter!("kml_client_disconnects_total").increment(1);
    }

    /// Record a finished document.
    pub async fn record_document(
        &self,
        format: &'static str,
        summary: &EncodeSummary,
        elapsed: Duration,
    ) {
        let placemarks = summary.placemarks as u64;
        let overlays = summary.ground_overlays as u64;
        let emitted = summary.links_emitted as u64;
        let skipped = summary.links_skipped as u64;
        let diagnostics = summary.diagnostics.len() as u64;

        self.placemarks.fetch_add(placemarks, Ordering::Relaxed);
        self.ground_overlays.fetch_add(overlays, Ordering::Relaxed);
        self.links_emitted.fetch_add(emitted, Ordering::Relaxed);
        self.links_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.diagnostics.fetch_add(diagnostics, Ordering::Relaxed);

        counter!("kml_documents_total", "format" => format).increment(1);
        counter!("kml_placemarks_total").increment(placemarks);
        counter!("kml_ground_overlays_total").increment(overlays);
        counter!("kml_network_links_total", "outcome" => "emitted").increment(emitted);
        counter!("kml_network_links_total", "outcome" => "skipped").increment(skipped);
        counter!("kml_diagnostics_total").increment(diagnostics);

        let duration_us = elapsed.as_micros() as u64;
        histogram!("kml_encode_duration_ms", "format" => format)
            .record(duration_us as f64 / 1000.0);
        self.encode_times.write().await.record(duration_us);
    }

    /// Record a PNG map, legend or icon render.
    pub async fn record_render(&self, kind: &'static str, elapsed: Duration) {
        let duration_us = elapsed.as_micros() as u64;
        counter!("kml_renders_total", "kind" => kind).increment(1);
        histogram!("kml_render_duration_ms", "kind" => kind).record(duration_us as f64 / 1000.0);
        self.render_times.write().await.record(duration_us);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let encode_times = self.encode_times.read().await;
        let render_times = self.render_times.read().await;

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            map_requests: self.map_requests.load(Ordering::Relaxed),
            reflect_requests: self.reflect_requests.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            client_disconnects: self.client_disconnects.load(Ordering::Relaxed),
            placemarks: self.placemarks.load(Ordering::Relaxed),
            ground_overlays: self.ground_overlays.load(Ordering::Relaxed),
            links_emitted: self.links_emitted.load(Ordering::Relaxed),
            links_skipped: self.links_skipped.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            documents: encode_times.count,
            encode_avg_ms: encode_times.avg_ms(),
            encode_last_ms: encode_times.last_ms(),
            encode_max_ms: encode_times.max_ms(),
            renders: render_times.count,
            render_avg_ms: render_times.avg_ms(),
            render_max_ms: render_times.max_ms(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics for JSON serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,

    pub map_requests: u64,
    pub reflect_requests: u64,
    pub request_errors: u64,
    pub client_disconnects: u64,

    // Document contents
    pub placemarks: u64,
    pub ground_overlays: u64,
    pub links_emitted: u64,
    pub links_skipped: u64,
    pub diagnostics: u64,

    pub documents: u64,
    pub encode_avg_ms: f64,
    pub encode_last_ms: f64,
    pub encode_max_ms: f64,

    pub renders: u64,
    pub render_avg_ms: f64,
    pub render_max_ms: f64,
}
