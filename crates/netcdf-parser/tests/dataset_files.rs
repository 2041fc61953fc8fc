//! File-level netCDF scenarios.

use netcdf_parser::{is_netcdf, read_dataset, write_dataset, ClassicFormat, Dataset, NcValues, NetCdfError};
use test_utils::{create_temperature_grid, temp_test_dir};

fn grid_dataset() -> Dataset {
    let mut ds = Dataset::new();
    ds.add_dimension("Y", 4, false).unwrap();
    ds.add_dimension("X", 5, false).unwrap();
    ds.set_attribute("Conventions", NcValues::text("CF-1.6"));
    ds.put_variable("temperature", &["Y", "X"], vec![], NcValues::Double(create_temperature_grid(5, 4)))
        .unwrap();
    ds
}

#[test]
fn test_write_then_read_file() {
    let dir = temp_test_dir();
    let path = dir.path().join("grid.nc");
    let ds = grid_dataset();
    write_dataset(&path, &ds, ClassicFormat::Offset64).unwrap();
    assert!(is_netcdf(&path));

    let read = read_dataset(&path).unwrap();
    assert_eq!(read, ds);
    let t = read.variable("temperature").unwrap();
    assert_eq!(read.shape(t), vec![4, 5]);
    assert_eq!(read.dimension_names(t), vec!["Y".to_string(), "X".to_string()]);
    assert_eq!(read.attribute("Conventions").and_then(NcValues::as_text).unwrap(), "CF-1.6");
}

#[test]
fn test_foreign_files() {
    let dir = temp_test_dir();
    let text = dir.path().join("notes.txt");
    std::fs::write(&text, b"not a dataset").unwrap();
    assert!(!is_netcdf(&text));
    assert!(matches!(read_dataset(&text), Err(NetCdfError::InvalidFormat(_))));

    let hdf5 = dir.path().join("nc4.nc");
    std::fs::write(&hdf5, b"\x89HDF\r\n\x1a\n and more").unwrap();
    assert!(is_netcdf(&hdf5));
    if cfg!(not(feature = "native")) {
        assert!(matches!(read_dataset(&hdf5), Err(NetCdfError::Unsupported(_))));
    }
}
