//! Locating sample files and scratch directories for tests.
//!
//! Real model output is too large to ship with the sources. Tests that use
//! it look it up with [`find_test_file`] and are skipped when it is absent.

use std::path::PathBuf;

/// Workspace root, two levels above this crate.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .nth(2)
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// First existing `name` under `$TEST_DATA_DIR`, `crates/resources/testdata/`
/// or the workspace `testdata/` directory.
pub fn find_test_file(name: &str) -> Option<PathBuf> {
    let root = workspace_root();
    std::env::var_os("TEST_DATA_DIR")
        .map(PathBuf::from)
        .into_iter()
        .chain([root.join("crates/resources/testdata"), root.join("testdata")])
        .map(|dir| dir.join(name))
        .find(|path| path.exists())
}

/// Scratch directory removed on drop.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("meteo_test_")
        .tempdir()
        .expect("Failed to create temporary test directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_holds_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }

    #[test]
    fn test_missing_file() {
        assert_eq!(find_test_file("no_such_sample.fa"), None);
    }

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        assert!(dir.path().exists());
        assert!(dir.path().to_string_lossy().contains("meteo_test_"));
    }
}
