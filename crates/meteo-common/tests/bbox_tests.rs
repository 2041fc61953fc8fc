//! Tests for lon/lat BoundingBox operations.

use meteo_common::bbox::{BboxParseError, BoundingBox};

// ============================================================================
// Parsing tests
// ============================================================================

#[test]
fn test_parse_bbox_floating() {
    let bbox = BoundingBox::from_str_list("-125.5,24.75,-66.25,50.125").unwrap();
    assert!((bbox.lonmin - (-125.5)).abs() < 0.001);
    assert!((bbox.latmin - 24.75).abs() < 0.001);
    assert!((bbox.lonmax - (-66.25)).abs() < 0.001);
    assert!((bbox.latmax - 50.125).abs() < 0.001);
}

#[test]
fn test_parse_bbox_whitespace() {
    let bbox = BoundingBox::from_str_list(" 0 , 40 , 10 , 50 ").unwrap();
    assert_eq!(bbox, BoundingBox::new(0.0, 40.0, 10.0, 50.0));
}

#[test]
fn test_parse_bbox_too_few() {
    let result = BoundingBox::from_str_list("0,0,10");
    assert!(matches!(result, Err(BboxParseError::InvalidFormat(_))));
}

#[test]
fn test_parse_bbox_invalid_number() {
    let result = BoundingBox::from_str_list("0,abc,10,10");
    assert!(matches!(result, Err(BboxParseError::InvalidNumber(_))));
}

#[test]
fn test_parse_bbox_inverted_latitudes() {
    assert!(BoundingBox::from_str_list("0,50,10,40").is_err());
}

// ============================================================================
// Dimension tests
// ============================================================================

#[test]
fn test_bbox_extents() {
    let bbox = BoundingBox::new(-5.0, 42.0, 8.0, 51.0);
    assert!((bbox.width() - 13.0).abs() < 1e-12);
    assert!((bbox.height() - 9.0).abs() < 1e-12);
    assert!(!bbox.crosses_antimeridian());
}

// ============================================================================
// Containment tests
// ============================================================================

#[test]
fn test_bbox_contains_point_inside_and_edges() {
    let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert!(bbox.contains_point(5.0, 5.0));
    assert!(bbox.contains_point(0.0, 0.0));
    assert!(bbox.contains_point(10.0, 10.0));
    assert!(!bbox.contains_point(10.1, 5.0));
    assert!(!bbox.contains_point(5.0, -0.1));
}

#[test]
fn test_bbox_contains_point_modulo_360() {
    let bbox = BoundingBox::new(-10.0, 40.0, 10.0, 50.0);
    assert!(bbox.contains_point(355.0, 45.0));
    assert!(!bbox.contains_point(180.0, 45.0));
}

#[test]
fn test_bbox_intersects() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
    let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
}
