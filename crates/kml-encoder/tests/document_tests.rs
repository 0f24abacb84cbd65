//! End-to-end document encoding over in-memory layers.

mod common;

use std::cell::Cell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use common::*;
use kml_common::style::PointSymbolizer;
use kml_common::{Envelope, Filter, KmlError, LayerKind, MapLayer, WORLD_BOUNDS};
use kml_encoder::source::{FeatureCursor, FeatureQuery, FeatureSource, SourceError};
use kml_encoder::{
    DocumentAssembler, IconRenderer, LayerRequest, MemoryFeatureSource, RenderError, TileRenderer,
};

struct BrokenSource;

impl FeatureSource for BrokenSource {
    fn features(&self, _query: &FeatureQuery) -> Result<FeatureCursor<'_>, SourceError> {
        Err(SourceError::Io("connection refused".to_string()))
    }

    fn bounds(&self) -> Envelope {
        Envelope::null()
    }
}

/// A client that hangs up after `limit` bytes.
struct HangUp {
    limit: usize,
    written: usize,
    late_writes: Rc<Cell<usize>>,
}

impl Write for HangUp {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() > self.limit {
            if self.written > self.limit {
                self.late_writes.set(self.late_writes.get() + 1);
            }
            self.written = self.limit + 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "client hung up"));
        }
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct StubTiles;

impl TileRenderer for StubTiles {
    fn render_tile(
        &self,
        _layer: &MapLayer,
        _style: &str,
        _envelope: &Envelope,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError> {
        Ok(format!("tile {}x{}", width, height).into_bytes())
    }
}

struct StubIcons;

impl IconRenderer for StubIcons {
    fn render_icon(&self, _symbolizer: &PointSymbolizer) -> Result<Vec<u8>, RenderError> {
        Ok(b"icon".to_vec())
    }
}

// ============================================================================
// Vector layers
// ============================================================================

#[test]
fn test_single_vector_layer_as_placemarks() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 1024, "");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert!(kml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(kml.contains(r#"<kml xmlns="http://www.opengis.net/kml/2.2""#));
    assert!(kml.contains("<Folder><name>Towns</name><LookAt>"));
    assert!(!kml.contains("<Document>"));
    assert_eq!(count(&kml, "<Placemark "), 3);
    assert!(kml.contains(r#"<Placemark id="towns.2">"#));
    assert!(kml.ends_with("</Folder></kml>"));
    assert_eq!(summary.placemarks, 3);
    assert_eq!(summary.ground_overlays, 0);
    assert!(summary.diagnostics.is_empty());
    assert_eq!(towns.open_cursors(), 0);
}

#[test]
fn test_kmscore_zero_draws_an_image() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 1024, "kmscore:0");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert_eq!(count(&kml, "<Placemark"), 0);
    assert!(kml.contains("<GroundOverlay><name>Towns</name><drawOrder>0</drawOrder>"));
    assert!(kml.contains("layers=topp:towns"));
    assert!(kml.contains("format=image/png"));
    assert!(kml.contains(
        "<LatLonBox><north>90</north><south>-90</south><east>180</east><west>-180</west></LatLonBox>"
    ));
    assert_eq!(summary.ground_overlays, 1);
}

#[test]
fn test_request_filter_and_paging() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();

    let filtered = vec![LayerRequest::new(&layer, &style)
        .with_source(&towns)
        .with_filter(Filter::Equals {
            property: "name".to_string(),
            value: serde_json::Value::from("Beta"),
        })];
    let (kml, summary) = harness
        .encode(&harness.request(WORLD_BOUNDS, 1024, ""), &filtered)
        .unwrap();
    assert_eq!(summary.placemarks, 1);
    assert!(kml.contains(r#"<Placemark id="towns.2">"#));

    let paged = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let mut request = harness.request(WORLD_BOUNDS, 1024, "");
    request.start_index = 1;
    request.max_features = Some(1);
    let (kml, _) = harness.encode(&request, &paged).unwrap();
    assert_eq!(count(&kml, "<Placemark "), 1);
    assert!(kml.contains(r#"<Placemark id="towns.2">"#));
}

#[test]
fn test_request_box_limits_features() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(Envelope::new(0.0, 0.0, 15.0, 15.0), 512, "");

    let (_, summary) = harness.encode(&request, &layers).unwrap();
    assert_eq!(summary.placemarks, 1);
}

// ============================================================================
// Document structure
// ============================================================================

#[test]
fn test_multiple_layers_with_legend() {
    let harness = Harness::new();
    let towns = towns();
    let town_layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let circles = circle_style();
    let raster_style = polygon_style();
    let layers = vec![
        LayerRequest::new(&town_layer, &circles).with_source(&towns),
        LayerRequest::new(&relief, &raster_style),
    ];
    let request = harness.request(WORLD_BOUNDS, 1024, "legend:true");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert!(kml.contains("<Document><name>Towns, Relief</name><LookAt>"));
    assert!(kml.contains("<Folder><name>Towns</name><Placemark"));
    assert!(kml.contains(
        "<Folder><name>Relief</name><GroundOverlay><name>Relief</name><drawOrder>1</drawOrder>"
    ));
    assert_eq!(count(&kml, "<ScreenOverlay><name>Legend</name>"), 2);
    assert!(kml.contains("/legend?layer=nasa:relief"));
    assert!(kml.contains(r#"<screenXY x="10" y="20" xunits="pixels" yunits="pixels"/>"#));
    assert!(
        kml.find("<ScreenOverlay>").unwrap() > kml.find("<Folder><name>Relief</name>").unwrap()
    );
    assert_eq!(summary.placemarks, 3);
    assert_eq!(summary.ground_overlays, 1);
}

#[test]
fn test_kmltitle_names_the_document() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let request = harness.request(WORLD_BOUNDS, 1024, "kmltitle:Shaded relief");

    let (kml, _) = harness.encode(&request, &layers).unwrap();
    assert!(kml.contains("<Folder><name>Shaded relief</name>"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_no_layers() {
    let harness = Harness::new();
    let request = harness.request(WORLD_BOUNDS, 1024, "");
    let err = harness.encode(&request, &[]).unwrap_err();
    assert!(matches!(err, KmlError::MissingParameter(_)));
}

#[test]
fn test_null_bbox() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let request = harness.request(Envelope::null(), 1024, "");
    assert!(matches!(harness.encode(&request, &layers), Err(KmlError::InvalidBbox(_))));
}

#[test]
fn test_source_failure_happens_before_output() {
    let harness = Harness::new();
    let broken = BrokenSource;
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&broken)];
    let request = harness.request(WORLD_BOUNDS, 1024, "");

    let assembler = DocumentAssembler::new(harness.ctx(&request), &layers);
    let err = assembler.plan().err().unwrap();
    assert!(matches!(err, KmlError::Source(_)));
    assert_eq!(err.service_exception_code(), "NoApplicableCode");
}

#[test]
fn test_client_hang_up_aborts_the_document() {
    let harness = Harness::new();
    let many = MemoryFeatureSource::new(
        (0..40)
            .map(|i| town(&format!("towns.{}", i), "Town", i as f64, 10.0))
            .collect(),
    );
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&many)];
    let request = harness.request(WORLD_BOUNDS, 1024, "kmscore:100");

    let assembler = DocumentAssembler::new(harness.ctx(&request), &layers);
    let plan = assembler.plan().unwrap();
    let late_writes = Rc::new(Cell::new(0));
    let sink = HangUp {
        limit: 4096,
        written: 0,
        late_writes: Rc::clone(&late_writes),
    };

    let err = assembler.write(&plan, sink).err().unwrap();

    assert!(matches!(err, KmlError::Stream(_)), "{:?}", err);
    assert!(err.is_client_disconnect());
    assert_eq!(late_writes.get(), 0);
    assert_eq!(many.open_cursors(), 0);
}

#[test]
fn test_unknown_regionating_strategy() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 1024, "regionateBy:alphabetical");

    assert!(matches!(
        harness.encode(&request, &layers),
        Err(KmlError::UnknownRegionatingStrategy(name)) if name == "alphabetical"
    ));
}

// ============================================================================
// KMZ
// ============================================================================

#[test]
fn test_kmz_packages_images_and_icons() {
    let harness = Harness::new();
    let towns = towns();
    let town_layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let circles = circle_style();
    let raster_style = polygon_style();
    let layers = vec![
        LayerRequest::new(&town_layer, &circles).with_source(&towns),
        LayerRequest::new(&relief, &raster_style),
    ];
    let mut request = harness.request(WORLD_BOUNDS, 512, "");
    request.kmz = true;

    let assembler = DocumentAssembler::new(harness.ctx(&request), &layers);
    let plan = assembler.plan().unwrap();
    let (sink, summary) = assembler
        .write_kmz(&plan, Cursor::new(Vec::new()), &StubTiles, &StubIcons)
        .unwrap();
    assert_eq!(summary.images.len(), 1);

    let mut archive = zip::ZipArchive::new(Cursor::new(sink.into_inner())).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.contains(&"wms.kml".to_string()));
    assert!(names.contains(&"images/layer_1.png".to_string()));
    assert_eq!(names.iter().filter(|n| n.starts_with("icons/")).count(), 1);

    let mut kml = String::new();
    archive.by_name("wms.kml").unwrap().read_to_string(&mut kml).unwrap();
    assert!(kml.contains("<href>images/layer_1.png</href>"));
    assert!(kml.contains("<href>icons/default_"));

    let mut image = String::new();
    archive.by_name("images/layer_1.png").unwrap().read_to_string(&mut image).unwrap();
    assert_eq!(image, "tile 512x512");
}
