//! Spectral transforms on real geometries and spectrum files.

use geometry::{Dimensions, Geometry, GeometryName, LamZones, ProjectionParams, RectangularGrid, Subzone};
use meteo_common::config::CoefficientOrder;
use spectral::{
    read_spectrum, space_for, GpDims, ReferenceTransforms, SpectralGeometry, SpectralSpace, Spectrum,
    TransformService,
};
use test_utils::fixtures::lam;
use test_utils::{assert_approx_eq, create_temperature_grid};

fn lambert_lam() -> Geometry {
    Geometry::projected(
        GeometryName::Lambert,
        Dimensions::lam(8, 6, LamZones::from_ci(lam::X_CIZONE, lam::Y_CIZONE, lam::IWIDTH, lam::IWIDTH)),
        RectangularGrid {
            x_resolution: lam::RESOLUTION_M,
            y_resolution: lam::RESOLUTION_M,
            input_lon: lam::CENTER.0,
            input_lat: lam::CENTER.1,
            input_position: (3.5, 2.5),
            lamzone: Some(Subzone::CIE),
        },
        ProjectionParams::tangent(lam::REFERENCE.0, lam::REFERENCE.1),
    )
    .unwrap()
}

#[test]
fn test_bifourier_projection_is_idempotent() {
    let g = lambert_lam();
    assert_eq!(space_for(&g), SpectralSpace::BiFourier);
    let dims = GpDims::from_geometry(&g).unwrap();
    assert_eq!((dims.x, dims.y, dims.x_cizone), (8, 6, lam::X_CIZONE));

    let sg = SpectralGeometry::bi_fourier(3, 2).unwrap();
    let data = create_temperature_grid(8, 6);
    for order in [CoefficientOrder::Model, CoefficientOrder::Fa] {
        let sp = sg.gp2sp(&data, &dims, order).unwrap();
        assert_eq!(sp.len(), sg.spectral_size(&dims, order).unwrap());
        // filtered field is already in the truncation
        let filtered = sg.sp2gp(&sp, &dims, order).unwrap();
        let again = sg.gp2sp(&filtered, &dims, order).unwrap();
        for (a, b) in sp.iter().zip(&again) {
            assert_approx_eq!(*a, *b, 1e-9);
        }
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        assert_approx_eq!(sp[0], mean, 1e-9);
    }
}

#[test]
fn test_derivatives_of_constant_vanish() {
    let g = lambert_lam();
    let dims = GpDims::from_geometry(&g).unwrap();
    let sg = SpectralGeometry::bi_fourier(3, 2).unwrap();
    let sp = sg.gp2sp(&vec![280.0; 48], &dims, CoefficientOrder::Model).unwrap();
    let (dx, dy) = sg.compute_xy_spderivatives(&sp, &dims, CoefficientOrder::Model).unwrap();
    assert!(dx.iter().chain(&dy).all(|v| v.abs() < 1e-12));
}

#[test]
fn test_legendre_without_service_fails() {
    let sg = SpectralGeometry::legendre(21).unwrap();
    let dims = GpDims {
        x: 64,
        y: 32,
        lat_number: 32,
        lon_number_by_lat: vec![64; 32],
        ..Default::default()
    };
    let service = ReferenceTransforms;
    assert!(sg.sp2gp_with(&service, &[0.0; 10], &dims, CoefficientOrder::Model).is_err());
    assert!(service.name() == "reference");
}

#[test]
fn test_spectrum_dump_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t2m.spectrum");
    let spectrum = Spectrum::new(vec![4.0, 2.0, 0.5])
        .with_name("CLSTEMPERATURE")
        .with_resolution(2500.0)
        .with_mean2(81225.0);
    spectrum.dump(&path).unwrap();

    let back = read_spectrum(&path).unwrap();
    assert_eq!(back.name.as_deref(), Some("CLSTEMPERATURE"));
    assert_eq!(back.resolution, Some(2500.0));
    assert_eq!(back.mean2, Some(81225.0));
    assert_eq!(back.variances, spectrum.variances);
}

#[test]
fn test_spectrum_resolution_is_recovered_from_wavelengths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noname.spectrum");
    std::fs::write(
        &path,
        "meteo.spectra.Spectrum\n# lambda variance\n1 16000 1.0\n2 8000 0.5\n3 5333.333333333333 0.25\n",
    )
    .unwrap();
    let back = read_spectrum(&path).unwrap();
    assert_eq!(back.mean2, None);
    assert_approx_eq!(back.resolution.unwrap(), 2000.0, 1e-6);

    std::fs::write(&path, "not a spectrum\n").unwrap();
    assert!(read_spectrum(&path).is_err());
}
