//! Field scenarios: statistics, extraction, spectral round trips, vectors.

use chrono::Duration;
use field::{ExternalDistance, Field, FieldId, FormatFid, GeoField, VectorField};
use geometry::{
    Dimensions, Geometry, GeometryName, InterpolationMethod, LamZones, ProjectionParams, RectangularGrid,
    Structure, Subzone, VCoordinate,
};
use meteo_common::bbox::BoundingBox;
use meteo_common::constants::surface;
use meteo_common::validity::parse_datetime;
use meteo_common::FieldValidity;
use spectral::SpectralGeometry;
use test_utils::fixtures::{fields, lam, lonlat, time};
use test_utils::{assert_approx_eq, create_affine_grid, create_constant_grid, create_temperature_grid};

fn validity() -> FieldValidity {
    FieldValidity::new(parse_datetime(time::BASIS).unwrap(), Duration::hours(6))
}

fn lonlat_lam() -> Geometry {
    Geometry::regular_lonlat(
        Dimensions::lam(lam::X, lam::Y, LamZones::from_ci(lam::X_CIZONE, lam::Y_CIZONE, lam::IWIDTH, lam::IWIDTH)),
        RectangularGrid {
            x_resolution: lam::RESOLUTION_DEG,
            y_resolution: lam::RESOLUTION_DEG,
            input_lon: lam::CENTER.0,
            input_lat: lam::CENTER.1,
            input_position: (2.0, 2.0),
            lamzone: Some(Subzone::CIE),
        },
    )
    .unwrap()
}

fn lambert_lam(x: usize, y: usize) -> Geometry {
    Geometry::projected(
        GeometryName::Lambert,
        Dimensions::lam(x, y, LamZones::from_ci(lam::X_CIZONE, lam::Y_CIZONE, lam::IWIDTH, lam::IWIDTH)),
        RectangularGrid {
            x_resolution: lam::RESOLUTION_M,
            y_resolution: lam::RESOLUTION_M,
            input_lon: lam::CENTER.0,
            input_lat: lam::CENTER.1,
            input_position: ((x - 1) as f64 / 2.0, (y - 1) as f64 / 2.0),
            lamzone: Some(Subzone::CIE),
        },
        ProjectionParams::tangent(lam::REFERENCE.0, lam::REFERENCE.1),
    )
    .unwrap()
}

fn h2d(name: &str, geometry: Geometry, values: Vec<f64>) -> GeoField {
    GeoField::new(FieldId::named("FA", name), geometry, validity(), values).unwrap()
}

// ============================================================================
// Statistics and zoom
// ============================================================================

#[test]
fn test_core_zone_stats_match_zoom() {
    let field = h2d(fields::FA_T2M, lonlat_lam(), create_affine_grid(5, 5, 270.0, 1.0, 5.0));
    let c_stats = field.stats(Some(Subzone::C)).unwrap();
    // C zone is the inner 3x3 block
    assert_approx_eq!(c_stats.min, 276.0, 1e-9);
    assert_approx_eq!(c_stats.max, 288.0, 1e-9);
    assert_approx_eq!(c_stats.mean, 282.0, 1e-9);

    let corners = field.geometry.gimme_corners_ll(Some(Subzone::C)).unwrap();
    let bbox = BoundingBox::new(corners.ll.0, corners.ll.1, corners.ur.0, corners.ur.1);
    let zoom = field.extract_zoom(&bbox).unwrap();
    assert_eq!((zoom.geometry.dimensions.x, zoom.geometry.dimensions.y), (3, 3));
    assert_eq!(zoom.stats(None).unwrap(), c_stats);
}

#[test]
fn test_masked_values_are_ignored() {
    let mut values = create_constant_grid(5, 5, 2.0);
    values[0] = 1e20;
    values[1] = f64::NAN;
    let field = h2d("MASKED", lonlat_lam(), values);
    let s = field.stats(None).unwrap();
    assert_eq!(s.max, 2.0);
    assert_eq!(s.nonzero, 23);
}

// ============================================================================
// Extraction
// ============================================================================

#[test]
fn test_profile_extraction_on_lam() {
    let geometry = lambert_lam(lam::X, lam::Y).with_vcoordinate(
        VCoordinate::hybrid_pressure(vec![0.0, 100.0, 500.0, 0.0], vec![0.0, 0.0, 0.5, 1.0]).unwrap(),
    );
    let mut values = Vec::new();
    for level in 0..3 {
        values.extend(create_affine_grid(5, 5, 100.0 * level as f64, 1.0, 10.0));
    }
    let field = GeoField::new(FieldId::named("FA", "S*TEMPERATURE"), geometry.clone(), validity(), values).unwrap();
    assert!(matches!(Field::from_geo(field.clone()), Field::D3(_)));

    let profile = geometry.make_profile_geometry(lam::CENTER.0, lam::CENTER.1).unwrap();
    let extracted = field
        .extract_subdomain(&profile, InterpolationMethod::Nearest, false)
        .unwrap();
    assert_eq!(extracted.structure(), Structure::V1D);
    assert_eq!(extracted.values(), &[22.0, 122.0, 222.0]);
    assert_eq!(extracted.geometry.vcoordinate.levels, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_section_extraction_linear() {
    let field = h2d("LINEAR", lonlat_lam(), create_affine_grid(5, 5, 0.0, 1.0, 1.0));
    let section = field
        .geometry
        .make_section_geometry((1.25, 44.5), (2.75, 44.5), Some(4), None)
        .unwrap();
    let extracted = field
        .extract_subdomain(&section, InterpolationMethod::Linear, false)
        .unwrap();
    assert_eq!(extracted.values().len(), 4);
    assert_approx_eq!(extracted.values()[0], 0.5 + 1.0, 1e-2);
    assert!(field
        .extract_subdomain(
            &field.geometry.make_point_geometry(40.0, 0.0).unwrap(),
            InterpolationMethod::Linear,
            false
        )
        .is_err());
}

#[test]
fn test_exclude_extralevels() {
    let vcoord = VCoordinate {
        typeoffirstfixedsurface: surface::HYBRID_HEIGHT,
        levels: vec![1.0, 2.0, 3.0, 4.0],
        ..VCoordinate::unknown()
    };
    let geometry = lonlat_lam().with_vcoordinate(vcoord);
    let values: Vec<f64> = (0..4).flat_map(|k| vec![k as f64; 25]).collect();
    let mut field = GeoField::new(FieldId::named("LFI", "THT"), geometry, validity(), values).unwrap();
    field.exclude_extralevels().unwrap();
    assert_eq!(field.geometry.vcoordinate.levels, vec![2.0, 3.0]);
    assert_eq!(field.level(0, 0).unwrap()[0], 1.0);
    assert_eq!(field.level(0, 1).unwrap()[0], 2.0);
}

#[test]
fn test_getvalue_with_external_distance() {
    let geometry = lonlat_lam();
    let field = h2d("VALUES", geometry.clone(), create_affine_grid(5, 5, 0.0, 1.0, 10.0));
    // land-sea mask: only column 2 is sea
    let mask: Vec<f64> = (0..25).map(|k| if k % 5 == 2 { 0.0 } else { 1.0 }).collect();
    let mask = h2d("LSM", geometry.clone(), mask);
    let (lon, lat) = geometry.ij2ll(1.4, 1.0).unwrap();
    let plain = field
        .getvalue_ll(&[lon], &[lat], InterpolationMethod::Nearest, None)
        .unwrap();
    assert_eq!(plain, vec![vec![11.0]]);
    let sea = field
        .getvalue_ll(
            &[lon],
            &[lat],
            InterpolationMethod::Nearest,
            Some(ExternalDistance {
                target_value: 0.0,
                field: &mask,
            }),
        )
        .unwrap();
    assert_eq!(sea, vec![vec![12.0]]);
    assert_eq!(field.getvalue_ij(3, 4, 0, 0).unwrap(), 43.0);
}

#[test]
fn test_global_shift_center() {
    let spec = lonlat::GLOBAL_45DEG;
    let geometry = Geometry::regular_lonlat(
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
    .unwrap();
    let mut field = h2d("GLOBAL", geometry, create_affine_grid(8, 5, 0.0, 1.0, 0.0));
    field.global_shift_center(90.0).unwrap();
    assert_eq!(&field.values()[..8], &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 0.0, 1.0]);
    assert_approx_eq!(field.geometry.ij2ll(0.0, 0.0).unwrap().0, 90.0, 1e-9);
    assert!(field.global_shift_center(10.0).is_err());
}

// ============================================================================
// Spectral
// ============================================================================

#[test]
fn test_spectral_roundtrip() {
    let geometry = lambert_lam(8, 6);
    let mut field = h2d(fields::FA_SURFACE_TEMPERATURE, geometry, create_temperature_grid(8, 6));
    assert!(field.compute_xy_spderivatives().is_err());
    field.sp2gp().unwrap();
    assert!(!field.is_spectral());

    let sg = SpectralGeometry::bi_fourier(3, 2).unwrap();
    field.gp2sp(sg.clone()).unwrap();
    assert!(field.is_spectral());
    let coefficients = field.values().to_vec();
    assert!(field.stats(None).is_err());

    let (dx, dy) = field.compute_xy_spderivatives().unwrap();
    assert_eq!(dx.values().len(), 48);
    assert_eq!(dy.fid.get("FA"), Some(&FormatFid::name("d(SURFTEMPERATURE)/dy")));

    field.sp2gp().unwrap();
    assert_eq!(field.values().len(), 48);
    field.gp2sp(sg).unwrap();
    for (a, b) in field.values().iter().zip(&coefficients) {
        assert_approx_eq!(*a, *b, 1e-9);
    }
    assert!(field.gp2sp(SpectralGeometry::fourier(2).unwrap()).is_ok());
}

#[test]
fn test_failed_sp2gp_keeps_spectral_state() {
    let sg = SpectralGeometry::bi_fourier(3, 2).unwrap();
    let coefficients = vec![1.0; 5];
    let mut field = GeoField::new_spectral(
        FieldId::named("FA", "SPECSURFGEOPOTEN"),
        lambert_lam(8, 6),
        validity(),
        sg.clone(),
        coefficients.clone(),
    )
    .unwrap();
    assert!(field.sp2gp().is_err());
    assert_eq!(field.spectral_geometry, Some(sg));
    assert_eq!(field.values(), coefficients.as_slice());
}

#[test]
fn test_spectral_space_must_match_geometry() {
    let mut field = h2d("T", lambert_lam(8, 6), create_temperature_grid(8, 6));
    assert!(field.gp2sp(SpectralGeometry::fourier(2).unwrap()).is_err());
    assert!(!field.is_spectral());
}

// ============================================================================
// Arithmetic and vectors
// ============================================================================

#[test]
fn test_arithmetic_composes_fids() {
    let a = h2d("A", lonlat_lam(), create_constant_grid(5, 5, 3.0));
    let b = h2d("B", lonlat_lam(), create_constant_grid(5, 5, 2.0));
    let sum = a.plus(&b).unwrap();
    assert_eq!(sum.fid.get("FA"), Some(&FormatFid::name("(A+B)")));
    assert!(sum.values().iter().all(|v| *v == 5.0));
    let scaled = sum.divided_by(2.0).unwrap();
    assert_eq!(scaled.fid.to_string(), "((A+B)/2)");
    let other = h2d("C", lambert_lam(5, 5), create_constant_grid(5, 5, 1.0));
    assert!(a.minus(&other).is_err());
}

#[test]
fn test_vector_module_and_direction() {
    let g = lonlat_lam();
    let u = h2d("U", g.clone(), vec![-5.0; 25]);
    let v = h2d("V", g.clone(), vec![0.0; 25]);
    let wind = VectorField::new(FieldId::named("FA", "CLSVENT"), u, v).unwrap();
    assert!(wind.to_module().unwrap().values().iter().all(|x| (*x - 5.0).abs() < 1e-12));
    assert!(wind.compute_direction().unwrap().values().iter().all(|x| (*x - 90.0).abs() < 1e-9));

    let north = VectorField::new(
        FieldId::named("FA", "CLSVENT"),
        h2d("U", g.clone(), vec![0.0; 25]),
        h2d("V", g, vec![-3.0; 25]),
    )
    .unwrap();
    assert!(north.compute_direction().unwrap().values().iter().all(|x| x.abs() < 1e-9));
}
