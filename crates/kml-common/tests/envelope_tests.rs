//! Tests for Envelope operations.

use kml_common::envelope::{BboxParseError, Envelope, WORLD_BOUNDS};

// ============================================================================
// Constructor tests
// ============================================================================

#[test]
fn test_envelope_new() {
    let env = Envelope::new(-180.0, -90.0, 180.0, 90.0);
    assert_eq!(env, WORLD_BOUNDS);
}

#[test]
fn test_envelope_new_normalises_corners() {
    let env = Envelope::new(10.0, 10.0, 0.0, 0.0);
    assert_eq!(env, Envelope::new(0.0, 0.0, 10.0, 10.0));
    assert_eq!(env.width(), 10.0);
}

// ============================================================================
// from_wms_string tests
// ============================================================================

#[test]
fn test_parse_wms_bbox_floating() {
    let env = Envelope::from_wms_string("-125.5,24.75,-66.25,50.125").unwrap();
    assert!((env.min_x - (-125.5)).abs() < 0.001);
    assert!((env.max_y - 50.125).abs() < 0.001);
}

#[test]
fn test_parse_wms_bbox_scientific_notation() {
    let env = Envelope::from_wms_string("1e-6,2e-6,1e6,2e6").unwrap();
    assert!((env.min_x - 1e-6).abs() < 1e-10);
    assert!((env.max_x - 1e6).abs() < 0.001);
}

#[test]
fn test_parse_wms_bbox_whitespace_is_trimmed() {
    let env = Envelope::from_wms_string(" 0, 0, 100, 100 ").unwrap();
    assert_eq!(env, Envelope::new(0.0, 0.0, 100.0, 100.0));
}

#[test]
fn test_parse_wms_bbox_invalid_format() {
    assert!(matches!(
        Envelope::from_wms_string("0,0,100"),
        Err(BboxParseError::InvalidFormat(_))
    ));
    assert!(matches!(
        Envelope::from_wms_string(""),
        Err(BboxParseError::InvalidFormat(_))
    ));
}

#[test]
fn test_parse_wms_bbox_invalid_number() {
    assert!(matches!(
        Envelope::from_wms_string("abc,0,100,100"),
        Err(BboxParseError::InvalidNumber(_))
    ));
    assert!(matches!(
        Envelope::from_wms_string("NaN,0,100,100"),
        Err(BboxParseError::InvalidNumber(_))
    ));
}

#[test]
fn test_parse_wms_bbox_inverted() {
    assert!(matches!(
        Envelope::from_wms_string("10,0,0,10"),
        Err(BboxParseError::Inverted(_))
    ));
}

// ============================================================================
// Null envelope tests
// ============================================================================

#[test]
fn test_null_envelope() {
    let null = Envelope::null();
    assert!(null.is_null());
    assert_eq!(null.width(), 0.0);
    assert_eq!(null.height(), 0.0);
    assert_eq!(null.centre(), None);
    assert!(!null.intersects(&WORLD_BOUNDS));
    assert!(!WORLD_BOUNDS.contains(&null));
}

#[test]
fn test_point_envelope_is_not_null() {
    let point = Envelope::of_point(5.0, 5.0);
    assert!(!point.is_null());
    assert_eq!(point.width(), 0.0);
    assert_eq!(point.centre(), Some((5.0, 5.0)));
}

#[test]
fn test_expand_to_include_envelope() {
    let mut env = Envelope::null();
    env.expand_to_include_envelope(&Envelope::new(0.0, 0.0, 1.0, 1.0));
    env.expand_to_include_envelope(&Envelope::null());
    env.expand_to_include_envelope(&Envelope::new(-1.0, 2.0, 0.5, 3.0));
    assert_eq!(env, Envelope::new(-1.0, 0.0, 1.0, 3.0));
}

#[test]
fn test_expand_ignores_nan() {
    let mut env = Envelope::of_point(1.0, 1.0);
    env.expand_to_include(f64::NAN, 50.0);
    assert_eq!(env, Envelope::of_point(1.0, 1.0));
}

// ============================================================================
// Intersection tests
// ============================================================================

#[test]
fn test_intersects_symmetric() {
    let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
    let b = Envelope::new(5.0, 5.0, 15.0, 15.0);
    assert!(a.intersects(&b));
    assert!(b.intersects(&a));
}

#[test]
fn test_intersects_shared_edge() {
    let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
    let b = Envelope::new(10.0, 0.0, 20.0, 10.0);
    assert!(a.intersects(&b));
}

#[test]
fn test_intersection_with_self() {
    let env = Envelope::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(env.intersection(&env), Some(env));
}

// ============================================================================
// Contains tests
// ============================================================================

#[test]
fn test_contains_point_on_edges() {
    let env = Envelope::new(0.0, 0.0, 10.0, 10.0);
    assert!(env.contains_point(0.0, 5.0));
    assert!(env.contains_point(10.0, 10.0));
    assert!(!env.contains_point(-1.0, 5.0));
    assert!(!env.contains_point(5.0, 11.0));
}

#[test]
fn test_contains_envelope() {
    let outer = Envelope::new(0.0, 0.0, 100.0, 100.0);
    let inner = Envelope::new(25.0, 25.0, 75.0, 75.0);
    assert!(outer.contains(&inner));
    assert!(!inner.contains(&outer));
}

#[test]
fn test_to_wms_string() {
    let env = Envelope::new(-125.0, 24.0, -66.0, 50.5);
    assert_eq!(env.to_wms_string(), "-125,24,-66,50.5");
}
