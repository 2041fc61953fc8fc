//! Gaussian latitudes of global spectral grids.

use std::f64::consts::PI;

/// Gaussian latitudes in degrees, north to south.
///
/// Roots of the Legendre polynomial of degree `lat_number`, found by Newton
/// iteration from the usual cosine first guess.
pub fn gaussian_latitudes(lat_number: usize) -> Vec<f64> {
    let n = lat_number;
    let mut lats = vec![0.0; n];
    for k in 0..(n + 1) / 2 {
        let mut x = (PI * (k as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre_with_derivative(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let lat = x.clamp(-1.0, 1.0).asin().to_degrees();
        lats[k] = lat;
        lats[n - 1 - k] = -lat;
    }
    lats
}

/// `P_n(x)` and `P_n'(x)` by the three-term recurrence.
fn legendre_with_derivative(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Number of longitudes per latitude of an octahedral-like reduced grid.
///
/// Rows hold `max_lon_number * cos(lat)` points rounded up to an even
/// count, with at least 4 points.
pub fn reduced_lon_numbers(latitudes_deg: &[f64], max_lon_number: usize) -> Vec<usize> {
    latitudes_deg
        .iter()
        .map(|lat| {
            let n = (max_lon_number as f64 * lat.to_radians().cos()).ceil() as usize;
            let n = n + n % 2;
            n.clamp(4, max_lon_number.max(4))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_latitudes() {
        // roots of P2: +-1/sqrt(3)
        let lats = gaussian_latitudes(2);
        let expected = (1.0 / 3f64.sqrt()).asin().to_degrees();
        assert!((lats[0] - expected).abs() < 1e-12);
        assert!((lats[1] + expected).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_and_sorted() {
        let lats = gaussian_latitudes(9);
        assert!(lats[4].abs() < 1e-12);
        for w in lats.windows(2) {
            assert!(w[0] > w[1]);
        }
        for k in 0..9 {
            assert!((lats[k] + lats[8 - k]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_reduced_rows() {
        let lats = gaussian_latitudes(4);
        let rows = reduced_lon_numbers(&lats, 16);
        assert_eq!(rows.len(), 4);
        assert!(rows[0] < rows[1]);
        assert_eq!(rows[1], rows[2]);
    }
}
