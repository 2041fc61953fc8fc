//! End-to-end geometry scenarios: zones, transforms, interpolation, derived geometries.

use geometry::{
    interpolate, nearest_points, Dimensions, GaussGrid, Geometry, GeometryError, GeometryName,
    InterpolationMethod, LamZones, ProjectionParams, RectangularGrid, Structure, Subzone,
    VCoordinate,
};
use meteo_common::bbox::BoundingBox;
use test_utils::fixtures::{gauss, lam, lonlat};
use test_utils::{assert_approx_eq, assert_coords_approx_eq, create_affine_grid, create_gauss_grid};

fn lambert_lam() -> Geometry {
    Geometry::projected(
        GeometryName::Lambert,
        Dimensions::lam(lam::X, lam::Y, LamZones::from_ci(lam::X_CIZONE, lam::Y_CIZONE, lam::IWIDTH, lam::IWIDTH)),
        RectangularGrid {
            x_resolution: lam::RESOLUTION_M,
            y_resolution: lam::RESOLUTION_M,
            input_lon: lam::CENTER.0,
            input_lat: lam::CENTER.1,
            input_position: (2.0, 2.0),
            lamzone: Some(Subzone::CIE),
        },
        ProjectionParams::tangent(lam::REFERENCE.0, lam::REFERENCE.1),
    )
    .unwrap()
}

fn extended_lonlat() -> Geometry {
    Geometry::regular_lonlat(
        Dimensions::lam(8, 7, LamZones::from_ci(5, 5, 1, 1)),
        RectangularGrid {
            x_resolution: 0.1,
            y_resolution: 0.1,
            input_lon: 1.0,
            input_lat: 44.0,
            input_position: (0.0, 0.0),
            lamzone: Some(Subzone::CIE),
        },
    )
    .unwrap()
}

fn global(spec: lonlat::GridSpec) -> Geometry {
    Geometry::regular_lonlat(
        Dimensions::rectangular(spec.width, spec.height),
        RectangularGrid {
            x_resolution: spec.dx,
            y_resolution: spec.dy,
            input_lon: spec.first_lon,
            input_lat: spec.first_lat,
            input_position: (0.0, 0.0),
            lamzone: None,
        },
    )
    .unwrap()
}

fn tiny_gauss() -> Geometry {
    let rows = gauss::LON_NUMBER_BY_LAT.to_vec();
    Geometry::reduced_gauss(
        rows.clone(),
        GaussGrid {
            latitudes: projection::gaussian_latitudes(rows.len()),
            pole_lon: 0.0,
            pole_lat: 90.0,
            dilatation_coef: 1.0,
        },
    )
    .unwrap()
}

// ============================================================================
// Zones
// ============================================================================

#[test]
fn test_resolution_of_single_latitude_gauss() {
    let g = Geometry::reduced_gauss(
        vec![4],
        GaussGrid {
            latitudes: vec![0.0],
            pole_lon: 0.0,
            pole_lat: 90.0,
            dilatation_coef: 1.0,
        },
    )
    .unwrap();
    assert!(matches!(g.resolution_ll(0.0, 0.0), Err(GeometryError::Unsupported(_))));
    assert!(tiny_gauss().resolution_ll(0.0, 0.0).unwrap() > 0.0);
}

#[test]
fn test_zone_nesting_with_extension() {
    let g = extended_lonlat();
    let cie = g.gimme_corners_ij(Some(Subzone::CIE)).unwrap();
    let ci = g.gimme_corners_ij(Some(Subzone::CI)).unwrap();
    let c = g.gimme_corners_ij(Some(Subzone::C)).unwrap();
    assert!(c.is_within(&ci));
    assert!(ci.is_within(&cie));
    assert_eq!(cie.ur, (7, 6));
    assert_eq!(ci.ur, (4, 4));
    assert_eq!((c.ll, c.ur), ((1, 1), (3, 3)));
    assert_eq!(g.gridpoints_number(Some(Subzone::C)).unwrap(), 9);
    assert_eq!(g.subzone_indices(Some(Subzone::C)).unwrap()[0], 8 + 1);
}

#[test]
fn test_subzone_on_global_grid_is_undefined() {
    let g = global(lonlat::GLOBAL_45DEG);
    assert!(matches!(
        g.gimme_corners_ij(Some(Subzone::C)),
        Err(GeometryError::UndefinedSubzone { .. })
    ));
    assert!(tiny_gauss().gimme_corners_ij(Some(Subzone::CI)).is_err());
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn test_lambert_roundtrip_and_center() {
    let g = lambert_lam();
    assert_coords_approx_eq!(g.getcenter().unwrap(), lam::CENTER, 1e-9);
    let (lon, lat) = g.ij2ll(0.0, 4.0).unwrap();
    let (i, j) = g.ll2ij(lon, lat).unwrap();
    assert_coords_approx_eq!((i, j), (0.0, 4.0), 1e-6);
    // 2.5 km spacing around the reference point
    assert_approx_eq!(g.resolution_ll(lam::CENTER.0, lam::CENTER.1).unwrap(), lam::RESOLUTION_M, 1.0);
}

#[test]
fn test_gauss_point_lookup() {
    let g = tiny_gauss();
    assert_eq!(g.packed_size(), gauss::size());
    let (lon, lat) = g.ij2ll(3.0, 1.0).unwrap();
    assert_approx_eq!(lon, 90.0, 1e-9);
    let (i, j) = g.ll2ij(lon + 1.0, lat - 0.5).unwrap();
    assert_eq!((i, j), (3.0, 1.0));
}

// ============================================================================
// Interpolation
// ============================================================================

#[test]
fn test_linear_interpolation_exact_on_affine_field() {
    let g = extended_lonlat();
    let data = create_affine_grid(8, 7, 10.0, 2.0, -3.0);
    for (i, j) in [(0.0, 0.0), (2.5, 1.5), (6.25, 5.75)] {
        let (lon, lat) = g.ij2ll(i, j).unwrap();
        let v = interpolate(&g, &data, lon, lat, InterpolationMethod::Linear).unwrap();
        assert_approx_eq!(v, 10.0 + 2.0 * i - 3.0 * j, 1e-9);
    }
}

#[test]
fn test_cubic_exact_on_gridpoints() {
    let g = lambert_lam();
    let data = create_affine_grid(lam::X, lam::Y, 0.0, 1.0, 10.0);
    let (lon, lat) = g.ij2ll(3.0, 1.0).unwrap();
    let v = interpolate(&g, &data, lon, lat, InterpolationMethod::Cubic).unwrap();
    assert_approx_eq!(v, 13.0, 1e-6);
}

#[test]
fn test_outside_domain_is_an_error() {
    let g = extended_lonlat();
    let data = create_affine_grid(8, 7, 0.0, 1.0, 1.0);
    let err = interpolate(&g, &data, 20.0, 44.0, InterpolationMethod::Nearest).unwrap_err();
    assert!(matches!(err, GeometryError::OutsideDomain { .. }));
    assert!(!g.point_is_inside_domain_ll(20.0, 44.0));
    assert!(g.point_is_inside_domain_ll(1.3, 44.2));
}

#[test]
fn test_global_interpolation_wraps() {
    let g = global(lonlat::GLOBAL_45DEG);
    let data = create_affine_grid(8, 5, 0.0, 1.0, 0.0);
    // halfway between the last column (315E, value 7) and the first (0E, value 0)
    let v = interpolate(&g, &data, 337.5, 0.0, InterpolationMethod::Linear).unwrap();
    assert_approx_eq!(v, 3.5, 1e-9);
    let points = nearest_points(&g, -22.5, 0.0, InterpolationMethod::Linear).unwrap();
    assert!(points.contains(&(7, 2)) && points.contains(&(0, 2)));
}

#[test]
fn test_gauss_interpolation_at_gridpoint() {
    let g = tiny_gauss();
    let data = create_gauss_grid(&gauss::LON_NUMBER_BY_LAT);
    let (lon, lat) = g.ij2ll(5.0, 2.0).unwrap();
    for method in [InterpolationMethod::Nearest, InterpolationMethod::Linear] {
        let v = interpolate(&g, &data, lon, lat, method).unwrap();
        assert_approx_eq!(v, 205.0, 1e-6);
    }
    assert_eq!(nearest_points(&g, lon, lat, InterpolationMethod::Linear).unwrap().len(), 4);
}

// ============================================================================
// Derived geometries
// ============================================================================

#[test]
fn test_section_endpoints_and_structure() {
    let g = lambert_lam().with_vcoordinate(VCoordinate::single(100, 850.0));
    let section = g
        .make_section_geometry((1.98, 44.99), (2.02, 45.01), Some(5), None)
        .unwrap();
    let (lons, lats) = section.get_lonlat_grid(None).unwrap();
    assert_eq!(lons.len(), 5);
    assert_coords_approx_eq!((lons[0], lats[0]), (1.98, 44.99), 1e-9);
    assert_coords_approx_eq!((lons[4], lats[4]), (2.02, 45.01), 1e-9);
    assert_eq!(section.structure(), Structure::H1D);
    assert_eq!(section.vcoordinate, g.vcoordinate);
    assert!(g.make_section_geometry((0.0, 0.0), (1.0, 1.0), Some(3), Some(100.0)).is_err());
}

#[test]
fn test_point_geometry_keeps_vertical() {
    let g = tiny_gauss().with_vcoordinate(VCoordinate::single(100, 500.0).with_levels(vec![500.0, 850.0]));
    let p = g.make_profile_geometry(10.0, 20.0).unwrap();
    assert_eq!(p.structure(), Structure::V1D);
    assert_eq!(p.vcoordinate.levels, vec![500.0, 850.0]);
}

#[test]
fn test_zoom_index_range() {
    let g = global(lonlat::GLOBAL_1DEG);
    let bbox = BoundingBox::new(10.0, 40.0, 20.0, 50.0);
    let (imin, imax, jmin, jmax) = g.bbox_index_range(&bbox).unwrap();
    assert_eq!((imin, imax), (10, 20));
    assert_eq!((jmin, jmax), (40, 50));
    let sub = g.subarray_geometry(imin, imax, jmin, jmax).unwrap();
    assert_eq!((sub.dimensions.x, sub.dimensions.y), (11, 11));
    assert_coords_approx_eq!(sub.ij2ll(0.0, 0.0).unwrap(), (10.0, 50.0), 1e-9);
}

#[test]
fn test_reshape_pads_gauss_rows() {
    let g = tiny_gauss();
    let data = create_gauss_grid(&gauss::LON_NUMBER_BY_LAT);
    let rows = g.reshape_data(&data, 1, f64::NAN).unwrap();
    assert_eq!(rows[0].len(), 4);
    assert_eq!(rows[0][0].len(), 12);
    assert!(rows[0][0][8].is_nan());
    assert_eq!(g.flatten_level(&rows[0]).unwrap(), data);
}

#[test]
fn test_geometry_json_roundtrip() {
    let g = lambert_lam();
    let json = serde_json::to_string(&g).unwrap();
    let back: Geometry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, g);
}
