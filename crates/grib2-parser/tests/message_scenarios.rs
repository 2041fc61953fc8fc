//! End-to-end GRIB2 scenarios: encode, write, read back, decode.

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use grib2_parser::{
    is_grib2, EarthShape, FixedSurface, Grib2Message, Grib2Reader, Grib2Writer, GridDefinition, GridTemplate,
    Identification, LatLonGrid, ProductDefinition, SCAN_J_POSITIVE,
};
use test_utils::fixtures::lonlat;
use test_utils::{assert_approx_eq, create_temperature_grid, temp_test_dir};

fn identification() -> Identification {
    Identification {
        center: 85,
        sub_center: 0,
        table_version: 14,
        local_table_version: 0,
        significance_of_reference_time: 1,
        reference_time: Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        production_status: 2,
        data_type: 2,
    }
}

fn france_grid() -> GridDefinition {
    let spec = lonlat::FRANCE_10X10;
    let (last_lon, last_lat) = spec.last_point();
    GridDefinition {
        num_data_points: spec.size() as u32,
        earth: EarthShape::sphere(6_371_229.0),
        resolution_flags: 0x30,
        scanning_mode: SCAN_J_POSITIVE,
        template: GridTemplate::LatLon(LatLonGrid {
            ni: spec.width as u32,
            nj: spec.height as u32,
            la1: spec.first_lat,
            lo1: spec.first_lon,
            la2: last_lat,
            lo2: last_lon,
            di: spec.dx,
            dj: spec.dy,
        }),
    }
}

fn t850(term_hours: i64) -> ProductDefinition {
    ProductDefinition {
        parameter_category: 0,
        parameter_number: 0,
        type_of_generating_process: 2,
        background_process: 255,
        generating_process_identifier: 254,
        forecast_time: Duration::hours(term_hours),
        first_surface: FixedSurface::from_value(100, 85000.0),
        second_surface: FixedSurface::missing(),
        statistics: None,
        vertical_coordinates: Vec::new(),
    }
}

fn message(term_hours: i64, values: &[f64]) -> Grib2Message {
    Grib2Message::from_values(0, identification(), france_grid(), t850(term_hours), values, 16, 2).unwrap()
}

#[test]
fn test_write_then_read_several_messages() {
    let dir = temp_test_dir();
    let path = dir.path().join("t850.grib2");
    let values = create_temperature_grid(10, 10);

    let mut writer = Grib2Writer::open(&path, false).unwrap();
    for term in [0, 6, 12] {
        writer.write(&message(term, &values)).unwrap();
    }
    writer.flush().unwrap();
    assert_eq!(writer.count(), 3);
    assert!(is_grib2(&path));

    let messages: Vec<_> = Grib2Reader::open(&path).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(
        messages[2].validity_time(),
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    );
    // longitudes are stored in [0, 360)
    let GridTemplate::LatLon(grid) = &messages[0].grid.template else {
        panic!("expected a regular lat/lon grid");
    };
    assert_eq!((grid.ni, grid.nj), (10, 10));
    assert_approx_eq!(grid.lo1, 358.0, 1e-9);
    assert_approx_eq!(grid.la2, 51.0, 1e-9);
    for (decoded, original) in messages[1].values().unwrap().iter().zip(&values) {
        assert_approx_eq!(*decoded, *original, 0.01);
    }
}

#[test]
fn test_missing_values_survive_encoding() {
    let mut values = create_temperature_grid(10, 10);
    values[3] = f64::NAN;
    values[42] = f64::INFINITY;
    let encoded = message(0, &values).encode();
    let decoded = Grib2Message::parse(&encoded).unwrap().values().unwrap();
    assert!(decoded[3].is_nan());
    assert!(decoded[42].is_nan());
    assert_eq!(decoded.iter().filter(|v| v.is_nan()).count(), 2);
}

#[test]
fn test_gzip_stream_and_leading_garbage() {
    let values = create_temperature_grid(10, 10);
    let mut stream = b"garbage".to_vec();
    stream.extend(message(3, &values).encode());

    let dir = temp_test_dir();
    let path = dir.path().join("t850.grib2.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&stream).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let messages: Vec<_> = Grib2Reader::open(&path).unwrap().collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].as_ref().unwrap().product.forecast_time, Duration::hours(3));
}

#[test]
fn test_truncated_stream_reports_error() {
    let encoded = message(0, &create_temperature_grid(10, 10)).encode();
    let truncated = Bytes::copy_from_slice(&encoded[..encoded.len() - 10]);
    let results: Vec<_> = Grib2Reader::new(truncated).collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[test]
fn test_value_count_must_match_grid() {
    let result = Grib2Message::from_values(0, identification(), france_grid(), t850(0), &[1.0; 5], 16, 0);
    assert!(result.is_err());
}
