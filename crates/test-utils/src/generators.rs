//! Test data generators for creating synthetic meteorological fields.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite. All grids are row-major.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f64);
        }
    }
    data
}

/// Creates a grid that is an affine function of the indices: `a + b*col + c*row`.
///
/// Bilinear interpolation reproduces such fields exactly.
pub fn create_affine_grid(width: usize, height: usize, a: f64, b: f64, c: f64) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push(a + b * col as f64 + c * row as f64);
        }
    }
    data
}

/// Creates a test grid with temperature-like values in Kelvin.
///
/// Values range from 250K to 310K, increasing toward the bottom-right.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f64 / width.max(1) as f64;
            let y_factor = row as f64 / height.max(1) as f64;
            data.push(250.0 + x_factor * 30.0 + y_factor * 30.0);
        }
    }
    data
}

/// Creates a grid with a single constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f64) -> Vec<f64> {
    vec![value; width * height]
}

/// Creates a test grid with masked cells at the given positions.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `masked` - (col, row) positions to fill with `mask`
/// * `mask` - Missing-value marker
pub fn create_grid_with_mask(
    width: usize,
    height: usize,
    masked: &[(usize, usize)],
    mask: f64,
) -> Vec<f64> {
    let mut data = create_test_grid(width, height);
    for &(col, row) in masked {
        if col < width && row < height {
            data[row * width + col] = mask;
        }
    }
    data
}

/// Creates ragged Gaussian-grid data: value = `row * 100 + col`.
pub fn create_gauss_grid(lon_number_by_lat: &[usize]) -> Vec<f64> {
    let mut data = Vec::with_capacity(lon_number_by_lat.iter().sum());
    for (row, n) in lon_number_by_lat.iter().enumerate() {
        for col in 0..*n {
            data.push((row * 100 + col) as f64);
        }
    }
    data
}

/// Creates a vertical profile of `nlev` levels, `surface` at the bottom
/// and decreasing by `lapse` per level upward (top first).
pub fn create_profile(nlev: usize, surface: f64, lapse: f64) -> Vec<f64> {
    (0..nlev)
        .map(|k| surface - lapse * (nlev - 1 - k) as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(3, 2);
        assert_eq!(grid, vec![0.0, 1000.0, 2000.0, 1.0, 1001.0, 2001.0]);
    }

    #[test]
    fn test_create_affine_grid() {
        let grid = create_affine_grid(2, 2, 1.0, 2.0, 10.0);
        assert_eq!(grid, vec![1.0, 3.0, 11.0, 13.0]);
    }

    #[test]
    fn test_temperature_range() {
        let grid = create_temperature_grid(10, 10);
        assert!(grid.iter().all(|t| (250.0..=310.0).contains(t)));
    }

    #[test]
    fn test_grid_with_mask() {
        let grid = create_grid_with_mask(3, 3, &[(1, 1), (5, 5)], 1e20);
        assert_eq!(grid[4], 1e20);
        assert_eq!(grid.iter().filter(|v| **v == 1e20).count(), 1);
    }

    #[test]
    fn test_gauss_grid() {
        let grid = create_gauss_grid(&[2, 3]);
        assert_eq!(grid, vec![0.0, 1.0, 100.0, 101.0, 102.0]);
    }

    #[test]
    fn test_profile() {
        assert_eq!(create_profile(3, 290.0, 5.0), vec![280.0, 285.0, 290.0]);
    }
}
