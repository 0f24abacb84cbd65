//! Super-overlay documents: tile folders, regions and network links.

mod common;

use std::sync::Mutex;

use common::*;
use kml_common::{Envelope, LayerKind, WORLD_BOUNDS};
use kml_encoder::source::{FeatureCursor, SourceError};
use kml_encoder::{FeatureQuery, FeatureSource, KmlSettings, LayerRequest, MemoryFeatureSource};

/// Records the box of every count it answers.
struct CountingSource {
    inner: MemoryFeatureSource,
    counted: Mutex<Vec<String>>,
}

impl CountingSource {
    fn new(inner: MemoryFeatureSource) -> Self {
        Self {
            inner,
            counted: Mutex::new(Vec::new()),
        }
    }

    fn counted(&self) -> Vec<String> {
        self.counted.lock().unwrap().clone()
    }
}

impl FeatureSource for CountingSource {
    fn features(&self, query: &FeatureQuery) -> Result<FeatureCursor<'_>, SourceError> {
        self.inner.features(query)
    }

    fn count(&self, query: &FeatureQuery) -> Result<usize, SourceError> {
        self.counted.lock().unwrap().push(query.bbox.to_wms_string());
        self.inner.count(query)
    }

    fn bounds(&self) -> Envelope {
        self.inner.bounds()
    }
}

const WORLD_REGION: &str = "<Region><LatLonAltBox><north>90</north><south>-90</south>\
                            <east>180</east><west>-180</west></LatLonAltBox>";

// ============================================================================
// Raster layers
// ============================================================================

#[test]
fn test_world_tile_links_to_hemispheres() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert!(kml.contains(&format!(
        "<Folder><name>0:-180,-90,180,90</name>{}<Lod><minLodPixels>128</minLodPixels><maxLodPixels>-1</maxLodPixels></Lod></Region>",
        WORLD_REGION
    )));
    // The image gives way once the hemispheres load.
    assert!(kml.contains(&format!(
        "<GroundOverlay><name>Relief</name>{}<Lod><minLodPixels>128</minLodPixels><maxLodPixels>512</maxLodPixels></Lod></Region><drawOrder>0</drawOrder>",
        WORLD_REGION
    )));
    assert!(kml.contains("width=256&amp;height=256"));

    assert_eq!(count(&kml, "<NetworkLink>"), 2);
    assert!(kml.contains("<NetworkLink><name>1:-180,-90,0,90</name><Region>"));
    assert!(kml.contains("<NetworkLink><name>1:0,-90,180,90</name><Region>"));
    assert!(kml.contains("bbox=0,-90,180,90"));
    assert!(kml.contains("format_options=SUPEROVERLAY:true"));
    assert!(kml.contains("<viewRefreshMode>onRegion</viewRefreshMode>"));

    assert_eq!(summary.ground_overlays, 1);
    assert_eq!(summary.links_emitted, 2);
    assert_eq!(summary.links_skipped, 0);
}

#[test]
fn test_finer_request_is_split_inline() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let request = harness.request(WORLD_BOUNDS, 512, "superoverlay:true");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert!(kml.contains("<Folder><name>1:-180,-90,0,90</name>"));
    assert!(kml.contains("<Folder><name>1:0,-90,180,90</name>"));
    assert!(kml.contains("<NetworkLink><name>2:0,0,90,90</name>"));
    assert_eq!(summary.ground_overlays, 3);
    assert_eq!(summary.links_emitted, 8);
}

#[test]
fn test_small_request_across_the_meridian_stays_bounded() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let bbox = Envelope::new(-0.5, 51.0, 0.5, 52.0);
    let request = harness.request(bbox, 256, "superoverlay:true");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    // The world, then one tile per hemisphere on each of four levels.
    assert_eq!(summary.ground_overlays, 9);
    // Siblings away from the request, and the children of the deepest tiles.
    assert_eq!(summary.links_emitted, 26);
    assert_eq!(count(&kml, "<GroundOverlay>"), 9);
    assert_eq!(count(&kml, "<NetworkLink>"), 26);
    assert!(kml.contains("<Folder><name>4:-22.5,45,0,67.5</name>"));
    assert!(kml.contains("<Folder><name>4:0,45,22.5,67.5</name>"));
    assert!(kml.contains("<NetworkLink><name>2:-180,0,-90,90</name>"));
    assert!(kml.contains("<NetworkLink><name>5:-11.25,45,0,56.25</name>"));
    assert!(!kml.contains("<Folder><name>5:"));
    assert!(kml.len() < 64 * 1024);
}

#[test]
fn test_kmz_links_ask_for_kmz() {
    let harness = Harness::new();
    let relief = map_layer("nasa:relief", "Relief", LayerKind::Raster);
    let style = polygon_style();
    let layers = vec![LayerRequest::new(&relief, &style)];
    let mut request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true");
    request.kmz = true;

    let (kml, _) = harness.encode(&request, &layers).unwrap();
    assert!(kml.contains("format=application/vnd.google-earth.kmz"));
    // Tile images stay live requests.
    assert!(kml.contains("format=image/png"));
}

// ============================================================================
// Vector layers
// ============================================================================

#[test]
fn test_overview_sparse_tile_is_drawn_as_placemarks() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert_eq!(summary.placemarks, 3);
    assert_eq!(summary.ground_overlays, 0);
    assert_eq!(summary.links_emitted, 0);
    assert_eq!(count(&kml, "<NetworkLink>"), 0);
    assert_eq!(towns.open_cursors(), 0);
}

#[test]
fn test_overview_dense_tile_skips_empty_children() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true;kmscore:0");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert_eq!(summary.placemarks, 0);
    assert_eq!(summary.ground_overlays, 1);
    assert_eq!(summary.links_emitted, 1);
    assert_eq!(summary.links_skipped, 1);
    assert!(kml.contains("<NetworkLink><name>1:0,-90,180,90</name>"));
    assert!(!kml.contains("<NetworkLink><name>1:-180,-90,0,90</name>"));
    assert!(kml.contains("format_options=KMSCORE:0;SUPEROVERLAY:true"));
}

#[test]
fn test_overview_empty_tile_has_no_content() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(
        Envelope::new(-170.0, -80.0, -160.0, -70.0),
        256,
        "superoverlay:true",
    );

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert_eq!(summary.placemarks + summary.ground_overlays + summary.links_emitted, 0);
    assert!(kml.contains("<Region>"));
}

#[test]
fn test_hybrid_regionates_placemarks_over_images() {
    let harness = Harness::new();
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true;superoverlay_mode:hybrid");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert_eq!(summary.ground_overlays, 1);
    assert_eq!(summary.placemarks, 3);
    assert_eq!(summary.links_emitted, 1);
    assert_eq!(summary.links_skipped, 1);
    assert!(kml.find("</GroundOverlay>").unwrap() < kml.find("<Placemark").unwrap());
}

#[test]
fn test_hybrid_respects_feature_limit() {
    let harness = Harness::with_settings(KmlSettings {
        regionate_feature_limit: 2,
        ..Default::default()
    });
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(
        WORLD_BOUNDS,
        256,
        "superoverlay:true;superoverlay_mode:hybrid;regionateBy:random",
    );

    let (_, summary) = harness.encode(&request, &layers).unwrap();
    assert_eq!(summary.placemarks, 2);
}

#[test]
fn test_cached_mode_links_into_tile_cache() {
    let harness = Harness::with_settings(KmlSettings {
        tile_cache_url: Some("http://cache.example/gwc/kml".to_string()),
        ..Default::default()
    });
    let towns = towns();
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 256, "superoverlay:true;superoverlay_mode:cached");

    let (kml, summary) = harness.encode(&request, &layers).unwrap();

    assert!(kml.contains(
        "<NetworkLink><name>Towns</name><open>1</open><visibility>1</visibility><Link><href>http://cache.example/gwc/kml/topp:towns.png.kml</href></Link></NetworkLink>"
    ));
    assert_eq!(summary.links_emitted, 1);
    assert_eq!(summary.placemarks, 0);
}

#[test]
fn test_overview_counts_each_tile_once() {
    let harness = Harness::new();
    let towns = CountingSource::new(towns());
    let layer = map_layer("topp:towns", "Towns", LayerKind::Vector);
    let style = circle_style();
    let layers = vec![LayerRequest::new(&layer, &style).with_source(&towns)];
    let request = harness.request(WORLD_BOUNDS, 512, "superoverlay:true;kmscore:0");

    let (_, summary) = harness.encode(&request, &layers).unwrap();
    assert_eq!(summary.ground_overlays, 2);

    let tiles: Vec<String> = towns
        .counted()
        .into_iter()
        .filter(|b| *b != WORLD_BOUNDS.to_wms_string())
        .collect();
    let mut distinct = tiles.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(tiles.len(), distinct.len(), "{:?}", tiles);
    assert!(tiles.contains(&"0,-90,180,90".to_string()));
}
