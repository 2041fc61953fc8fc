//! Archive lifecycle: write, reopen, append, rename, delete.

use lfi_parser::words::{bytes_to_str, str_to_bytes};
use lfi_parser::{is_lfa, is_lfi, LfaData, LfaFile, LfiError, LfiFile};
use meteo_common::config::LfaConfig;
use meteo_common::OpenMode;
use test_utils::temp_test_dir;

// ============================================================================
// LFI
// ============================================================================

#[test]
fn test_lfi_reopen_preserves_articles() {
    let dir = temp_test_dir();
    let path = dir.path().join("sample.lfi");
    {
        let mut lfi = LfiFile::open(&path, OpenMode::Write).unwrap();
        lfi.write_i64s("IMAX", &[50]).unwrap();
        lfi.write_f64s("XHAT", &(0..52).map(|i| i as f64 * 2500.0).collect::<Vec<_>>())
            .unwrap();
        lfi.write("CARTESIAN", &str_to_bytes("F")).unwrap();
    }
    assert!(is_lfi(&path));
    assert!(!is_lfa(&path));

    let mut lfi = LfiFile::open(&path, OpenMode::Read).unwrap();
    assert_eq!(lfi.listnames(), vec!["IMAX", "XHAT", "CARTESIAN"]);
    assert_eq!(lfi.read_i64s("IMAX").unwrap(), vec![50]);
    assert_eq!(lfi.article_length("XHAT").unwrap(), 52);
    assert_eq!(lfi.read_f64s("XHAT").unwrap()[51], 127500.0);
    assert_eq!(bytes_to_str(&lfi.read("CARTESIAN").unwrap()).unwrap(), "F");
    assert!(matches!(lfi.read("JMAX"), Err(LfiError::NotFound(_))));
    assert!(matches!(lfi.write_i64s("JMAX", &[1]), Err(LfiError::Mode { .. })));
}

#[test]
fn test_lfi_append_rename_delete() {
    let dir = temp_test_dir();
    let path = dir.path().join("append.lfi");
    {
        let mut lfi = LfiFile::open(&path, OpenMode::Write).unwrap();
        lfi.write_f64s("A", &[1.0; 600]).unwrap();
        lfi.write_f64s("B", &[2.0; 3]).unwrap();
    }
    {
        let mut lfi = LfiFile::open(&path, OpenMode::Append).unwrap();
        lfi.write_f64s("C", &[3.0; 4]).unwrap();
        lfi.rename("A", "ALPHA").unwrap();
        lfi.delete("B").unwrap();
        assert!(lfi.rename("C", "ALPHA").is_err());
        lfi.close().unwrap();
        assert!(!lfi.is_open());
    }
    let mut lfi = LfiFile::open(&path, OpenMode::Read).unwrap();
    assert_eq!(lfi.listnames(), vec!["ALPHA", "C"]);
    assert_eq!(lfi.read_f64s("ALPHA").unwrap(), vec![1.0; 600]);
    assert_eq!(lfi.read_f64s("C").unwrap(), vec![3.0; 4]);
}

#[test]
fn test_lfi_detects_corruption() {
    let dir = temp_test_dir();
    let path = dir.path().join("corrupt.lfi");
    {
        let mut lfi = LfiFile::open(&path, OpenMode::Write).unwrap();
        lfi.write_f64s("DATA", &[1.0, 2.0]).unwrap();
    }
    let mut bytes = std::fs::read(&path).unwrap();
    // first data word lives in record 1
    bytes[lfi_parser::RECORD_WORDS * 8] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();
    let mut lfi = LfiFile::open(&path, OpenMode::Read).unwrap();
    assert!(matches!(lfi.read("DATA"), Err(LfiError::Checksum { .. })));
}

#[test]
fn test_lfi_rejects_foreign_files() {
    let dir = temp_test_dir();
    let path = dir.path().join("foreign.bin");
    std::fs::write(&path, b"GRIB....").unwrap();
    assert!(!is_lfi(&path));
    assert!(matches!(
        LfiFile::open(&path, OpenMode::Read),
        Err(LfiError::InvalidFormat(_))
    ));
}

// ============================================================================
// LFA
// ============================================================================

#[test]
fn test_lfa_roundtrip_and_limits() {
    let dir = temp_test_dir();
    let path = dir.path().join("list.lfa");
    let limits = LfaConfig {
        max_num_fields: 2,
        maxstrlen: 8,
    };
    {
        let mut lfa = LfaFile::open_with(&path, OpenMode::Write, limits.clone()).unwrap();
        lfa.write("NLEV", LfaData::Int(vec![90])).unwrap();
        lfa.write("STATIONS", LfaData::Char(vec!["PARIS".into(), "NICE".into()]))
            .unwrap();
        assert!(matches!(
            lfa.write("EXTRA", LfaData::Real(vec![1.0])),
            Err(LfiError::Limit(_))
        ));
        // replacing does not count against the limit
        lfa.write("NLEV", LfaData::Int(vec![105])).unwrap();
        assert!(lfa.read("NLEV").is_err());
    }
    assert!(is_lfa(&path));

    let lfa = LfaFile::open_with(&path, OpenMode::Read, limits.clone()).unwrap();
    assert_eq!(lfa.listfields(), vec!["NLEV", "STATIONS"]);
    assert_eq!(lfa.fieldtype("STATIONS"), Some(('C', 2)));
    assert_eq!(lfa.read("NLEV").unwrap(), &LfaData::Int(vec![105]));
    drop(lfa);

    let mut lfa = LfaFile::open_with(&path, OpenMode::Append, limits).unwrap();
    assert!(matches!(
        lfa.write("STATIONS", LfaData::Char(vec!["TOULOUSE-BLAGNAC".into()])),
        Err(LfiError::Limit(_))
    ));
}
