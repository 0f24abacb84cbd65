//! Loading the configuration directory.

mod common;

use std::fs;

use kml_api::layer_config::{load_settings, Catalog};
use kml_common::{KmlError, LayerKind};
use kml_encoder::KmlSettings;
use tempfile::TempDir;

use common::write_config;

#[test]
fn test_catalog_loads_layers_styles_and_features() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());

    let catalog = Catalog::load_from_directory(dir.path()).unwrap();
    assert_eq!(catalog.len(), 2);

    let towns = catalog.layer("topp:towns").unwrap();
    assert_eq!(towns.layer.kind, LayerKind::Vector);
    assert_eq!(towns.source.as_ref().unwrap().len(), 3);
    // Bounds come from the features when not configured.
    let bounds = towns.layer.bounds.unwrap();
    assert_eq!((bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y), (10.0, 5.0, 30.0, 20.0));

    let imagery = catalog.layer("NASA:Imagery").unwrap();
    assert!(imagery.source.is_none());

    assert!(catalog.style("squares").is_some());
    assert_eq!(catalog.default_style(&towns.layer).unwrap().name, "dots");
}

#[test]
fn test_resolve_style() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());
    let catalog = Catalog::load_from_directory(dir.path()).unwrap();
    let towns = &catalog.layer("topp:towns").unwrap().layer;

    assert_eq!(catalog.resolve_style(towns, "").unwrap().name, "dots");
    assert_eq!(catalog.resolve_style(towns, "squares").unwrap().name, "squares");
    assert!(matches!(catalog.resolve_style(towns, "raster"), Err(KmlError::StyleNotFound(_))));
    assert!(matches!(catalog.layer("topp:roads"), Err(KmlError::LayerNotFound(_))));
}

#[test]
fn test_missing_default_style_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());
    fs::remove_file(dir.path().join("styles/dots.yaml")).unwrap();

    let err = Catalog::load_from_directory(dir.path()).unwrap_err();
    assert!(err.to_string().contains("undefined default style dots"));
}

#[test]
fn test_malformed_geojson_names_the_file() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path());
    fs::write(dir.path().join("data/towns.geojson"), "{\"type\": \"Point\"}").unwrap();

    let err = Catalog::load_from_directory(dir.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("topp:towns"));
}

#[test]
fn test_settings_defaults_and_validation() {
    let dir = TempDir::new().unwrap();
    let defaults = load_settings(dir.path()).unwrap();
    assert_eq!(defaults.kmscore, KmlSettings::default().kmscore);

    fs::write(dir.path().join("kml.yaml"), "kmscore: 25\nextrude: false\n").unwrap();
    let settings = load_settings(dir.path()).unwrap();
    assert_eq!(settings.kmscore, 25);
    assert!(!settings.extrude);
    assert_eq!(settings.coordinate_decimals, 6);

    fs::write(dir.path().join("kml.yaml"), "kmscore: 150\n").unwrap();
    assert!(load_settings(dir.path()).is_err());
}
