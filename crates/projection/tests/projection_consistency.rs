//! Consistency of projections against known cartographic properties.

use projection::lambert::{cone_constant, secant_latitudes_from_cone};
use projection::{distance, great_circle_points, ConformalProjection, LambertConformal, Mercator};
use test_utils::{assert_approx_eq, assert_coords_approx_eq};

const R: f64 = 6_371_229.0;

#[test]
fn test_lambert_grid_spacing_matches_map_factor() {
    let proj = LambertConformal::tangent(2.0, 46.5, R).unwrap();
    // One kilometre on the map along the reference meridian is one kilometre
    // on the sphere at the tangency latitude.
    let (x, y) = proj.project(2.0, 46.5);
    let (lon, lat) = proj.unproject(x, y + 1000.0);
    let d = distance((2.0, 46.5), (lon, lat), R);
    assert_approx_eq!(d, 1000.0, 1e-3);
}

#[test]
fn test_secant_cone_roundtrip_through_rpk() {
    let rpk = cone_constant(45.0, 55.0);
    let (l1, l2) = secant_latitudes_from_cone(45.0, rpk).unwrap();
    let proj = LambertConformal::secant(10.0, l1, l2, R).unwrap();
    assert!(proj.is_secant());
    assert_approx_eq!(proj.cone_constant(), rpk, 1e-10);
    assert_approx_eq!(proj.map_factor(45.0), proj.map_factor(55.0), 1e-6);
}

#[test]
fn test_mercator_section_points_follow_equator() {
    let proj = ConformalProjection::Mercator(Mercator::new(0.0, 0.0, R).unwrap());
    for (lon, lat) in great_circle_points((-10.0, 0.0), (10.0, 0.0), 5) {
        let (x, y) = proj.project(lon, lat);
        assert_coords_approx_eq!(proj.unproject(x, y), (lon, lat), 1e-9);
        assert_approx_eq!(y, 0.0, 1e-6);
    }
}
