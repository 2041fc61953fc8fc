//! End-to-end scenarios: files written by one driver, reopened through the
//! generic entry points, and fields extracted from them.

use std::path::Path;

use chrono::Duration;
use serde_json::Value;
use tempfile::tempdir;

use field::{Field, FieldId, FormatFid, GeoField, MiscField, MiscValue};
use geometry::{
    Dimensions, Geometry, GeometryName, LamZones, ProjectionParams, RectangularGrid, Structure, Subzone,
    VCoordinate,
};
use meteo_common::constants::surface;
use meteo_common::validity::parse_datetime;
use meteo_common::{EngineConfig, FaCompression, FieldValidity, FieldValidityList, OpenMode};
use resources::{
    fid_converter, guess, resource, ExtractOptions, FaOptions, FaResource, FieldDict, Format, FormatResource,
    GribResource, LfaResource, LfiResource, MergePolicy, NetCdfResource, ProfileTarget, ResourceError,
    SectionTarget, Seed,
};
use test_utils::{assert_approx_eq, create_affine_grid, create_profile, fixtures};

// ============================================================================
// Fixtures
// ============================================================================

fn validity() -> FieldValidityList {
    let basis = parse_datetime(fixtures::time::BASIS).unwrap();
    FieldValidityList::new(FieldValidity::new(basis, Duration::hours(6)))
}

/// 5x5 Lambert LAM with a 3x3 C zone around its center.
fn lam_geometry() -> Geometry {
    let (lon, lat) = fixtures::lam::CENTER;
    let zones = LamZones::from_ci(
        fixtures::lam::X_CIZONE,
        fixtures::lam::Y_CIZONE,
        fixtures::lam::IWIDTH,
        fixtures::lam::IWIDTH,
    );
    let grid = RectangularGrid {
        x_resolution: fixtures::lam::RESOLUTION_M,
        y_resolution: fixtures::lam::RESOLUTION_M,
        input_lon: lon,
        input_lat: lat,
        input_position: (2.0, 2.0),
        lamzone: Some(Subzone::CI),
    };
    let (ref_lon, ref_lat) = fixtures::lam::REFERENCE;
    Geometry::projected(
        GeometryName::Lambert,
        Dimensions::lam(fixtures::lam::X, fixtures::lam::Y, zones),
        grid,
        ProjectionParams::tangent(ref_lon, ref_lat),
    )
    .unwrap()
}

fn lonlat_geometry(vc: VCoordinate) -> Geometry {
    let spec = fixtures::lonlat::FRANCE_10X10;
    let grid = RectangularGrid {
        x_resolution: spec.dx,
        y_resolution: spec.dy.abs(),
        input_lon: spec.first_lon,
        input_lat: spec.first_lat.min(spec.last_point().1),
        input_position: (0.0, 0.0),
        lamzone: None,
    };
    Geometry::regular_lonlat(Dimensions::rectangular(spec.width, spec.height), grid)
        .unwrap()
        .with_vcoordinate(vc)
}

/// FA file holding a two-level hybrid-pressure temperature and the surface temperature.
fn write_fa_profile(path: &Path, temperatures: &[f64]) -> Geometry {
    let nlev = temperatures.len();
    let a: Vec<f64> = (0..=nlev).map(|k| if k == 0 || k == nlev { 0.0 } else { 5000.0 }).collect();
    let b: Vec<f64> = (0..=nlev).map(|k| k as f64 / nlev as f64).collect();
    let vc = VCoordinate::hybrid_pressure(a, b).unwrap();
    let geometry = lam_geometry().with_vcoordinate(vc.clone());
    let options = FaOptions {
        geometry: Some(geometry.clone()),
        validity: Some(validity()),
        ..FaOptions::default()
    };
    let mut fa = FaResource::open_with(path, OpenMode::Write, options).unwrap();
    let npoints = geometry.dimensions.x * geometry.dimensions.y;
    for (k, t) in temperatures.iter().enumerate() {
        let level = (k + 1) as f64;
        let name = format!("S{:03}TEMPERATURE", k + 1);
        let field_geometry = geometry.with_vcoordinate(vc.clone().with_levels(vec![level]));
        let geo = GeoField::new(FieldId::named("FA", name), field_geometry, validity(), vec![*t; npoints]).unwrap();
        fa.writefield(&Field::H2D(geo)).unwrap();
    }
    let surface_geometry = geometry.with_vcoordinate(VCoordinate::single(surface::GROUND, 0.0));
    let surf = GeoField::new(
        FieldId::named("FA", fixtures::fields::FA_SURFACE_TEMPERATURE),
        surface_geometry,
        validity(),
        vec![290.0; npoints],
    )
    .unwrap();
    fa.writefield(&Field::H2D(surf)).unwrap();
    fa.close().unwrap();
    geometry
}

// ============================================================================
// FA
// ============================================================================

#[test]
fn test_fa_profile_by_lonlat_and_by_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    let temperatures = create_profile(2, 280.0, 10.0);
    write_fa_profile(&path, &temperatures);

    let mut r = resource(&path, OpenMode::Read, None).unwrap();
    assert_eq!(r.as_dyn().format(), Format::Fa);
    let (lon, lat) = fixtures::lam::CENTER;
    let options = ExtractOptions::default();

    let by_lonlat = r
        .as_dyn_mut()
        .extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &options)
        .unwrap();
    assert_eq!(by_lonlat.structure(), Structure::V1D);
    assert_eq!(by_lonlat.geometry.vcoordinate.levels, vec![1.0, 2.0]);
    for (got, expected) in by_lonlat.values().iter().zip(&temperatures) {
        assert_approx_eq!(*got, *expected, 0.01);
    }

    let point = r.as_dyn().geometry().unwrap().make_profile_geometry(lon, lat).unwrap();
    let by_geometry = r
        .as_dyn_mut()
        .extractprofile("S*TEMPERATURE", ProfileTarget::Geometry(point), &options)
        .unwrap();
    assert_eq!(by_geometry.values(), by_lonlat.values());
}

#[test]
fn test_fa_seed_union_has_no_duplicates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    write_fa_profile(&path, &[280.0, 270.0]);

    let r = FaResource::open(&path, OpenMode::Read).unwrap();
    let seed = Seed::from(["S*TEMPERATURE", "S001*", "SURF*"]);
    let found = r.find_fields_in_resource(&seed, &[]).unwrap();
    let names: Vec<&str> = found.iter().filter_map(FormatFid::as_name).collect();
    assert_eq!(names, vec!["S001TEMPERATURE", "S002TEMPERATURE", "SURFTEMPERATURE"]);

    let err = r.find_fields_in_resource(&Seed::from("NOTHING*"), &[]).unwrap_err();
    assert!(matches!(err, ResourceError::NotFound(_)));
}

#[test]
fn test_fa_validity_and_sortfields() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    write_fa_profile(&path, &[280.0, 270.0]);

    let r = FaResource::open(&path, OpenMode::Read).unwrap();
    let v = r.validity().unwrap().first().clone();
    assert_eq!(v.term, Duration::hours(6));
    let groups = r.sortfields().unwrap();
    assert_eq!(groups["3D TEMPERATURE"].len(), 2);
    assert!(groups["2D fields"].contains(&FormatFid::name(fixtures::fields::FA_SURFACE_TEMPERATURE)));
}

/// Two-level hybrid-pressure coordinate, half levels at 0, 5000 + Ps/2 and Ps.
fn hybrid_vcoordinate(nlev: usize) -> VCoordinate {
    let a: Vec<f64> = (0..=nlev).map(|k| if k == 0 || k == nlev { 0.0 } else { 5000.0 }).collect();
    let b: Vec<f64> = (0..=nlev).map(|k| k as f64 / nlev as f64).collect();
    VCoordinate::hybrid_pressure(a, b).unwrap()
}

fn put(fa: &mut FaResource, name: &str, geometry: &Geometry, vcoordinate: VCoordinate, values: Vec<f64>) {
    let geo = GeoField::new(
        FieldId::named("FA", name),
        geometry.with_vcoordinate(vcoordinate),
        validity(),
        values,
    )
    .unwrap();
    fa.writefield(&Field::H2D(geo)).unwrap();
}

/// Surface pressure decreasing eastwards: 100000 Pa on the first column, 1000 Pa less per column.
fn surface_pressure_at(i: usize) -> f64 {
    100_000.0 - 1000.0 * i as f64
}

/// FA file with what vertical conversions need: hybrid and isobaric
/// temperature and humidity, ln(Ps) and surface geopotential at 100 m.
fn write_fa_column(path: &Path, with_departure: bool) -> Geometry {
    let vc = hybrid_vcoordinate(2);
    let geometry = lam_geometry().with_vcoordinate(vc.clone());
    let options = FaOptions {
        geometry: Some(geometry.clone()),
        validity: Some(validity()),
        ..FaOptions::default()
    };
    let mut fa = FaResource::open_with(path, OpenMode::Write, options).unwrap();
    let (x, y) = (geometry.dimensions.x, geometry.dimensions.y);
    let npoints = x * y;
    let hybrid = |level: f64| vc.clone().with_levels(vec![level]);
    let ground = VCoordinate::single(surface::GROUND, 0.0);

    for (level, t) in [(1.0, 250.0), (2.0, 280.0)] {
        put(&mut fa, &format!("S{:03}TEMPERATURE", level as usize), &geometry, hybrid(level), vec![t; npoints]);
        put(&mut fa, &format!("S{:03}HUMI.SPECIFI", level as usize), &geometry, hybrid(level), vec![0.0; npoints]);
        if with_departure {
            put(&mut fa, &format!("S{:03}PRESS.DEPART", level as usize), &geometry, hybrid(level), vec![0.0; npoints]);
        }
    }
    for (hpa, t) in [(500.0, 250.0), (850.0, 280.0)] {
        let isobaric = VCoordinate::single(surface::ISOBARIC, hpa);
        let pa = (hpa * 100.0) as usize;
        put(&mut fa, &format!("P{:05}TEMPERATURE", pa), &geometry, isobaric.clone(), vec![t; npoints]);
        put(&mut fa, &format!("P{:05}HUMI.SPECIFI", pa), &geometry, isobaric, vec![0.0; npoints]);
    }
    let lnps: Vec<f64> = (0..y).flat_map(|_| (0..x).map(|i| surface_pressure_at(i).ln())).collect();
    put(&mut fa, "SURFPRESSION", &geometry, ground.clone(), lnps);
    let g0 = EngineConfig::global().physics.g0;
    put(&mut fa, "SURFGEOPOTENTIEL", &geometry, ground, vec![100.0 * g0; npoints]);
    fa.close().unwrap();
    geometry
}

#[test]
fn test_fa_profile_in_pressure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    write_fa_column(&path, false);

    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let (lon, lat) = fixtures::lam::CENTER;
    let options = ExtractOptions::default().with_vertical_coordinate(surface::ISOBARIC);
    let profile = r
        .extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &options)
        .unwrap();
    let vc = &profile.geometry.vcoordinate;
    assert_eq!(vc.typeoffirstfixedsurface, surface::ISOBARIC);
    assert!(vc.column_levels.is_none());
    // arithmetic mean of the half levels around each mass level
    let ps = surface_pressure_at(2);
    assert_approx_eq!(vc.levels[0], (5000.0 + 0.5 * ps) / 200.0, 0.05);
    assert_approx_eq!(vc.levels[1], (5000.0 + 1.5 * ps) / 200.0, 0.05);
    assert_approx_eq!(profile.values()[1], 280.0, 0.01);
}

#[test]
fn test_fa_section_levels_follow_surface_pressure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    let geometry = write_fa_column(&path, false);
    let end1 = geometry.ij2ll(1.0, 2.0).unwrap();
    let end2 = geometry.ij2ll(3.0, 2.0).unwrap();

    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let target = SectionTarget::Ends {
        end1,
        end2,
        points_number: Some(5),
        resolution: None,
    };
    let options = ExtractOptions::default().with_vertical_coordinate(surface::ISOBARIC);
    let section = r.extractsection("S*TEMPERATURE", target, &options).unwrap();
    let vc = &section.geometry.vcoordinate;
    let columns = vc.column_levels.as_ref().unwrap();
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[1].len(), 5);

    let first = (5000.0 + 1.5 * surface_pressure_at(1)) / 200.0;
    let last = (5000.0 + 1.5 * surface_pressure_at(3)) / 200.0;
    assert_approx_eq!(columns[1][0], first, 0.1);
    assert_approx_eq!(columns[1][4], last, 0.1);
    assert!(vc.levels[1] < first && vc.levels[1] > last);
    assert_eq!(vc.point_levels(4).unwrap()[1], columns[1][4]);
}

#[test]
fn test_fa_profile_in_altitude_from_hybrid_levels() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    write_fa_column(&path, false);

    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let (lon, lat) = fixtures::lam::CENTER;
    let options = ExtractOptions::default().with_vertical_coordinate(surface::ALTITUDE);
    let profile = r
        .extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &options)
        .unwrap();
    let levels = &profile.geometry.vcoordinate.levels;
    assert_eq!(profile.geometry.vcoordinate.typeoffirstfixedsurface, surface::ALTITUDE);
    assert!(levels[1] > 100.0);
    assert!(levels[0] > levels[1]);
}

#[test]
fn test_fa_isobaric_heights_use_the_file_vertical_mean() {
    let physics = EngineConfig::global().physics.clone();
    let ln_ratio = (850.0f64 / 500.0).ln();
    let (lon, lat) = fixtures::lam::CENTER;
    let options = ExtractOptions::default().with_vertical_coordinate(surface::HEIGHT);
    let dir = tempdir().unwrap();

    // hydrostatic file: arithmetic mean of R T over the layer
    let path = dir.path().join("ICMSHHYDR+0006");
    write_fa_column(&path, false);
    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let profile = r
        .extractprofile("P*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &options)
        .unwrap();
    let levels = &profile.geometry.vcoordinate.levels;
    assert_eq!(profile.geometry.vcoordinate.typeoffirstfixedsurface, surface::HEIGHT);
    assert_approx_eq!(levels[1], 0.0, 1e-6);
    assert_approx_eq!(levels[0], physics.rd * 265.0 / physics.g0 * ln_ratio, 0.5);

    // non-hydrostatic file: geometric mean
    let path = dir.path().join("ICMSHNHYD+0006");
    write_fa_column(&path, true);
    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let profile = r
        .extractprofile("P*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &options)
        .unwrap();
    let expected = physics.rd * (250.0f64 * 280.0).sqrt() / physics.g0 * ln_ratio;
    assert_approx_eq!(profile.geometry.vcoordinate.levels[0], expected, 0.5);
}

#[test]
fn test_fa_tied_level_types_are_ambiguous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    // one hybrid level against one surface field
    write_fa_profile(&path, &[280.0]);

    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let (lon, lat) = fixtures::lam::CENTER;
    let err = r
        .extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &ExtractOptions::default())
        .unwrap_err();
    assert!(matches!(err, ResourceError::AmbiguousLevelType(_)));
}

#[test]
fn test_fa_write_mode_checks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    let geometry = lam_geometry();
    let options = FaOptions {
        geometry: Some(geometry.clone()),
        validity: Some(validity()),
        ..FaOptions::default()
    };
    let mut fa = FaResource::open_with(&path, OpenMode::Write, options).unwrap();
    let npoints = geometry.dimensions.x * geometry.dimensions.y;
    let ground = VCoordinate::single(surface::GROUND, 0.0);
    put(&mut fa, fixtures::fields::FA_SURFACE_TEMPERATURE, &geometry, ground.clone(), vec![280.0; npoints]);

    let other = lonlat_geometry(ground);
    let misplaced = GeoField::new(
        FieldId::named("FA", "SURFALBEDO"),
        other,
        validity(),
        vec![0.2; fixtures::lonlat::FRANCE_10X10.size()],
    )
    .unwrap();
    assert!(matches!(fa.writefield(&Field::H2D(misplaced)), Err(ResourceError::Usage(_))));

    let name = FormatFid::name(fixtures::fields::FA_SURFACE_TEMPERATURE);
    assert!(matches!(fa.readfield(&name), Err(ResourceError::Usage(_))));
    fa.close().unwrap();
}

#[test]
fn test_fa_rewrite_keeps_explicit_compression() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ICMSHTEST+0006");
    let geometry = lam_geometry().with_vcoordinate(VCoordinate::single(surface::GROUND, 0.0));
    let npoints = geometry.dimensions.x * geometry.dimensions.y;
    let field = Field::H2D(
        GeoField::new(
            FieldId::named("FA", fixtures::fields::FA_SURFACE_TEMPERATURE),
            geometry.clone(),
            validity(),
            vec![285.0; npoints],
        )
        .unwrap(),
    );
    let options = FaOptions {
        geometry: Some(geometry),
        validity: Some(validity()),
        ..FaOptions::default()
    };
    let mut fa = FaResource::open_with(&path, OpenMode::Write, options).unwrap();
    fa.writefield(&field).unwrap();
    let unpacked = FaCompression {
        kngrib: 0,
        ..FaCompression::default()
    };
    fa.writefield_with(&field, Some(unpacked)).unwrap();
    // a later rewrite without compression keeps the explicit one
    fa.writefield(&field).unwrap();
    fa.close().unwrap();

    let mut r = FaResource::open(&path, OpenMode::Read).unwrap();
    let encoding = r.fieldencoding(fixtures::fields::FA_SURFACE_TEMPERATURE).unwrap();
    assert_eq!(encoding.kngrib, 0);
}

// ============================================================================
// Field dictionaries
// ============================================================================

const USER_TABLE: &str = "\
name;type;nature;dimension;typeOfFirstFixedSurface;level;discipline;parameterCategory;parameterNumber;typeOfStatisticalProcessing;productDefinitionTemplateNumber
SURFTEMPERATURE;Misc;int;0;;;;;;;
MYFIELD;H2D;float;2;1;0;0;0;200;;
";

fn builtin_and_user(policy: &str) -> (FieldDict, FieldDict, MergePolicy) {
    let builtin = "main\n".to_string()
        + "name;type;nature;dimension;typeOfFirstFixedSurface;level;discipline;parameterCategory;parameterNumber;typeOfStatisticalProcessing;productDefinitionTemplateNumber\n"
        + "SURFTEMPERATURE;H2D;float;2;1;0;0;0;0;;\n";
    let (_, builtin) = FieldDict::parse(&builtin).unwrap();
    let (policy, user) = FieldDict::parse(&format!("{}\n{}", policy, USER_TABLE)).unwrap();
    (builtin, user, policy)
}

#[test]
fn test_dictionary_merge_policies() {
    let (builtin, user, policy) = builtin_and_user("underwrite");
    let merged = builtin.merge(user, policy);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.find("SURFTEMPERATURE").unwrap().field_type, resources::FieldType::H2D);
    assert!(merged.find("MYFIELD").is_some());

    let (builtin, user, policy) = builtin_and_user("overwrite");
    let merged = builtin.merge(user, policy);
    assert_eq!(merged.find("SURFTEMPERATURE").unwrap().field_type, resources::FieldType::Misc);

    let (builtin, user, policy) = builtin_and_user("main");
    assert_eq!(policy, MergePolicy::Main);
    let merged = builtin.merge(user.clone(), policy);
    assert_eq!(merged, user);
}

// ============================================================================
// GRIB2
// ============================================================================

#[test]
fn test_grib_round_trip_and_guess() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fields.grib2");
    let geometry = lonlat_geometry(VCoordinate::single(surface::ISOBARIC, 850.0));
    let spec = fixtures::lonlat::FRANCE_10X10;
    let values = create_affine_grid(spec.width, spec.height, 250.0, 0.5, 0.25);

    let mut keys = std::collections::BTreeMap::new();
    keys.insert("shortName".to_string(), Value::from("t"));
    let fid = FieldId::new("GRIB", FormatFid::Keys(keys));
    {
        let mut w = GribResource::open(&path, OpenMode::Write).unwrap();
        let geo = GeoField::new(fid, geometry.clone(), validity(), values.clone()).unwrap();
        w.writefield(&Field::H2D(geo)).unwrap();
        w.close().unwrap();
    }

    assert_eq!(guess(&path), Some(Format::Grib));
    let mut r = resource(&path, OpenMode::Read, None).unwrap();
    let fids = r.as_dyn().listfields().unwrap();
    assert_eq!(fids.len(), 1);
    let keys = fids[0].as_keys().unwrap();
    assert_eq!(keys.get("shortName"), Some(&Value::from("t")));

    let field = r.as_dyn_mut().readfield(&fids[0]).unwrap();
    let geo = field.as_geo().unwrap();
    assert!(geo.geometry.same_horizontal_grid(&geometry));
    assert_eq!(geo.geometry.vcoordinate.levels, vec![850.0]);
    assert_eq!(geo.validity.first().term, Duration::hours(6));
    for (got, expected) in geo.values().iter().zip(&values) {
        assert_approx_eq!(*got, *expected, 0.01);
    }

    let nc = fid_converter(&fids[0], "GRIB", "netCDF", true).unwrap();
    assert!(nc.as_name().is_some_and(|n| n.ends_with("-t") || n.contains("-t-")));
}

// ============================================================================
// netCDF
// ============================================================================

#[test]
fn test_netcdf_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fields.nc");
    let geometry = lonlat_geometry(VCoordinate::single(surface::HEIGHT, 2.0));
    let spec = fixtures::lonlat::FRANCE_10X10;
    let values = create_affine_grid(spec.width, spec.height, 280.0, 0.1, -0.2);
    {
        let mut w = NetCdfResource::open(&path, OpenMode::Write).unwrap();
        let geo = GeoField::new(
            FieldId::named("netCDF", fixtures::fields::NETCDF_VARIABLE),
            geometry.clone(),
            validity(),
            values.clone(),
        )
        .unwrap();
        w.writefield(&Field::H2D(geo)).unwrap();
        let comment = MiscField::new(FieldId::named("netCDF", "run"), MiscValue::Str("test".into()));
        w.writefield(&Field::Misc(comment)).unwrap();
        w.close().unwrap();
    }

    assert_eq!(guess(&path), Some(Format::NetCdf));
    let mut r = NetCdfResource::open(&path, OpenMode::Read).unwrap();
    let listed = r.listfields().unwrap();
    assert!(listed.contains(&FormatFid::name(fixtures::fields::NETCDF_VARIABLE)));
    assert!(listed.contains(&FormatFid::name("run")));

    let field = r.readfield(&FormatFid::name(fixtures::fields::NETCDF_VARIABLE)).unwrap();
    let geo = field.as_geo().unwrap();
    assert!(geo.geometry.same_horizontal_grid(&geometry));
    assert_eq!(geo.validity.first().term, Duration::hours(6));
    assert_eq!(geo.values(), values.as_slice());

    let run = r.readfield(&FormatFid::name("run")).unwrap();
    assert_eq!(run.as_misc(), Some(&MiscValue::Str("test".into())));
}

// ============================================================================
// LFI and LFA
// ============================================================================

#[test]
fn test_lfi_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mesonh.lfi");
    let grid = RectangularGrid {
        x_resolution: 1000.0,
        y_resolution: 1000.0,
        input_lon: 0.0,
        input_lat: 0.0,
        input_position: (0.0, 0.0),
        lamzone: None,
    };
    let geometry = Geometry::academic(Dimensions::rectangular(6, 5), grid)
        .unwrap()
        .with_vcoordinate(VCoordinate::single(surface::GROUND, 0.0));
    let values: Vec<f64> = (0..30).map(|v| 100.0 + v as f64).collect();
    {
        let mut w = LfiResource::open(&path, OpenMode::Write).unwrap();
        let geo = GeoField::new(FieldId::named("LFI", "ZS"), geometry, validity(), values.clone()).unwrap();
        w.writefield(&Field::H2D(geo)).unwrap();
        w.close().unwrap();
    }

    let mut r = LfiResource::open(&path, OpenMode::Read).unwrap();
    assert!(r.header().is_some_and(|h| h.cartesian));
    assert_eq!(r.validity().unwrap().first().term, Duration::hours(6));
    let field = r.readfield(&FormatFid::name("ZS")).unwrap();
    assert_eq!(field.as_geo().unwrap().values(), values.as_slice());
    assert!(r.sortfields().unwrap().contains_key("Header"));
}

#[test]
fn test_lfa_through_generic_entry_points() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("list.lfa");
    {
        let mut w = resource(&path, OpenMode::Write, Some(Format::Lfa)).unwrap();
        let misc = MiscField::new(FieldId::named("LFA", "NSTEPS"), MiscValue::IntArray(vec![0, 6, 12]));
        w.as_dyn_mut().writefield(&Field::Misc(misc)).unwrap();
        w.as_dyn_mut().close().unwrap();
    }
    assert_eq!(guess(&path), Some(Format::Lfa));
    let mut r = LfaResource::open(&path, OpenMode::Read).unwrap();
    let field = r.readfield(&FormatFid::name("NSTEPS")).unwrap();
    assert_eq!(field.as_misc(), Some(&MiscValue::IntArray(vec![0, 6, 12])));

    let geo = GeoField::new(
        FieldId::named("LFA", "GRID"),
        lonlat_geometry(VCoordinate::single(surface::GROUND, 0.0)),
        validity(),
        vec![0.0; fixtures::lonlat::FRANCE_10X10.size()],
    )
    .unwrap();
    let mut w = LfaResource::open(&dir.path().join("other.lfa"), OpenMode::Write).unwrap();
    assert!(matches!(w.writefield(&Field::H2D(geo)), Err(ResourceError::Unsupported(_))));
}

// ============================================================================
// Sample model output
// ============================================================================

#[test]
fn test_arome_sample() {
    let path = test_utils::require_test_file!("arome_sample.fa");
    assert_eq!(guess(&path), Some(Format::Fa));
    let mut r = resource(&path, OpenMode::Read, None).unwrap();
    let (lon, lat) = r.as_dyn().geometry().unwrap().getcenter().unwrap();
    let profile = r
        .as_dyn_mut()
        .extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(lon, lat), &ExtractOptions::default())
        .unwrap();
    assert_eq!(profile.structure(), Structure::V1D);
    assert!(profile.values().iter().all(|t| (150.0..350.0).contains(t)));
    assert!(r.as_dyn_mut().what(true).unwrap().contains("### FORMAT: FA"));
}
