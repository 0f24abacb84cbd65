//! A throwaway configuration directory and the router built from it.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use kml_api::router;
use kml_api::state::AppState;

pub const BASE_URL: &str = "http://localhost:8080";

const SETTINGS: &str = "kmscore: 40\nregionate_feature_limit: 2\n";

const LAYERS: &str = r##"
layers:
  - id: topp:towns
    title: Towns
    kind: vector
    default_style: dots
    styles: [squares]
    source: data/towns.geojson
  - id: nasa:imagery
    title: Imagery
    kind: raster
    default_style: raster
    bounds: { min_x: -10.0, min_y: -10.0, max_x: 10.0, max_y: 10.0 }
    raster_color: "#336699"
"##;

const DOTS: &str = r##"
name: dots
feature_type_styles:
  - rules:
      - symbolizers:
          - type: point
            mark: circle
            fill: { color: "#ff0000" }
            size: 8
"##;

const RASTER: &str = "name: raster\n";

const SQUARES: &str = r##"{
  "styles": {
    "squares": {
      "name": "squares",
      "feature_type_styles": [{
        "rules": [{"symbolizers": [{"type": "point", "mark": "square", "fill": {"color": "#0000ff"}}]}]
      }]
    }
  }
}"##;

const TOWNS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "id": "towns.1", "geometry": {"type": "Point", "coordinates": [10, 10]}, "properties": {"name": "Alpha"}},
    {"type": "Feature", "id": "towns.2", "geometry": {"type": "Point", "coordinates": [20, 20]}, "properties": {"name": "Beta"}},
    {"type": "Feature", "id": "towns.3", "geometry": {"type": "Point", "coordinates": [30, 5]}, "properties": {"name": "Gamma"}}
  ]
}"#;

/// Write the fixture configuration into `dir`.
pub fn write_config(dir: &Path) {
    fs::create_dir_all(dir.join("layers")).unwrap();
    fs::create_dir_all(dir.join("styles")).unwrap();
    fs::create_dir_all(dir.join("data")).unwrap();
    fs::write(dir.join("kml.yaml"), SETTINGS).unwrap();
    fs::write(dir.join("layers/test.yaml"), LAYERS).unwrap();
    fs::write(dir.join("styles/dots.yaml"), DOTS).unwrap();
    fs::write(dir.join("styles/raster.yaml"), RASTER).unwrap();
    fs::write(dir.join("styles/bundle.json"), SQUARES).unwrap();
    fs::write(dir.join("data/towns.geojson"), TOWNS).unwrap();
}

pub struct TestApp {
    _dir: TempDir,
    pub state: Arc<AppState>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        write_config(dir.path());
        let state = Arc::new(AppState::new(dir.path(), BASE_URL).unwrap());
        Self {
            router: router(state.clone(), None),
            state,
            _dir: dir,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap())
        .unwrap_or("")
}

pub fn get_map(layers: &str, bbox: &str, format: &str, extra: &str) -> String {
    format!(
        "/wms?service=WMS&version=1.1.1&request=GetMap&layers={}&styles=&srs=EPSG:4326&bbox={}&width=256&height=256&format={}{}",
        layers, bbox, format, extra
    )
}

pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
