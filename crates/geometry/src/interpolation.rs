//! Horizontal interpolation of gridpoint values at a lon/lat point.
//!
//! Rectangular grids use nearest, bilinear and Catmull-Rom bicubic
//! kernels on fractional indices; global lon-lat grids wrap around in X.
//! Reduced Gaussian grids interpolate along each row in longitude, then
//! across rows in latitude.

use meteo_common::bbox::normalize_lon;
use meteo_common::constants::MASK_OUTSIDE;

use crate::error::{GeometryError, Result};
use crate::geometry::{nearest_latitude_row, Geometry};
use crate::types::{Grid, InterpolationMethod};

fn is_missing(v: f64) -> bool {
    !v.is_finite() || v.abs() >= MASK_OUTSIDE
}

/// Column index along X, wrapped on global grids and clamped otherwise.
fn column(k: i64, width: usize, wrap: bool) -> usize {
    if wrap {
        k.rem_euclid(width as i64) as usize
    } else {
        k.clamp(0, width as i64 - 1) as usize
    }
}

/// Nearest neighbor interpolation.
pub fn nearest_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64, wrap: bool) -> f64 {
    let col = column(x.round() as i64, width, wrap);
    let row = y.round().clamp(0.0, (height - 1) as f64) as usize;
    data[row * width + col]
}

/// Bilinear interpolation between the four surrounding points.
///
/// Returns NaN if any corner is missing.
pub fn bilinear_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64, wrap: bool) -> f64 {
    let xi = x.floor() as i64;
    let yi = y.floor().clamp(0.0, (height - 1) as f64) as usize;
    let x0 = column(xi, width, wrap);
    let x1 = column(xi + 1, width, wrap);
    let y1 = (yi + 1).min(height - 1);

    let xf = if x0 == x1 { 0.0 } else { x - xi as f64 };
    let yf = (y - yi as f64).clamp(0.0, 1.0);

    let v00 = data[yi * width + x0];
    let v10 = data[yi * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    if [v00, v10, v01, v11].iter().any(|v| is_missing(*v)) {
        return f64::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic interpolation on the 16 surrounding points.
///
/// Falls back to bilinear when one of them is missing.
pub fn cubic_interpolate(data: &[f64], width: usize, height: usize, x: f64, y: f64, wrap: bool) -> f64 {
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    let xf = x - xi as f64;
    let yf = y - yi as f64;

    let mut values = [[0.0f64; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        let py = (yi + j as i64 - 1).clamp(0, height as i64 - 1) as usize;
        for (i, v) in row.iter_mut().enumerate() {
            let px = column(xi + i as i64 - 1, width, wrap);
            *v = data[py * width + px];
            if is_missing(*v) {
                return bilinear_interpolate(data, width, height, x, y, wrap);
            }
        }
    }

    let mut row_values = [0.0f64; 4];
    for (r, row) in row_values.iter_mut().zip(values.iter()) {
        *r = cubic_1d(row[0], row[1], row[2], row[3], xf);
    }
    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Cubic Lagrange polynomial through 4 (unevenly spaced) nodes.
fn lagrange_cubic(nodes: [f64; 4], values: [f64; 4], t: f64) -> f64 {
    let mut sum = 0.0;
    for k in 0..4 {
        let mut w = 1.0;
        for m in 0..4 {
            if m != k {
                w *= (t - nodes[m]) / (nodes[k] - nodes[m]);
            }
        }
        sum += w * values[k];
    }
    sum
}

// ============================================================================
// Geometry-aware entry points
// ============================================================================

/// Fractional indices of (lon, lat) on a rectangular grid, checked against the domain.
fn rectangular_position(geometry: &Geometry, lon: f64, lat: f64) -> Result<(f64, f64)> {
    let (x, y) = geometry.ll2ij(lon, lat)?;
    if geometry.is_global() {
        let ymax = (geometry.dimensions.y - 1) as f64;
        return Ok((x, y.clamp(0.0, ymax)));
    }
    if !geometry.index_is_inside(x, y) {
        return Err(GeometryError::OutsideDomain { lon, lat });
    }
    Ok((x, y))
}

/// Interpolate one level of storage-order `data` at (lon, lat).
pub fn interpolate(
    geometry: &Geometry,
    data: &[f64],
    lon: f64,
    lat: f64,
    method: InterpolationMethod,
) -> Result<f64> {
    if data.len() != geometry.packed_size() {
        return Err(GeometryError::inconsistent(format!(
            "{} values for {} gridpoints",
            data.len(),
            geometry.packed_size()
        )));
    }
    match &geometry.grid {
        Grid::Rectangular(_) => {
            let (x, y) = rectangular_position(geometry, lon, lat)?;
            let (w, h) = (geometry.dimensions.x, geometry.dimensions.y);
            let wrap = geometry.is_global();
            Ok(match method {
                InterpolationMethod::Nearest => nearest_interpolate(data, w, h, x, y, wrap),
                InterpolationMethod::Linear => bilinear_interpolate(data, w, h, x, y, wrap),
                InterpolationMethod::Cubic => cubic_interpolate(data, w, h, x, y, wrap),
            })
        }
        Grid::Gauss(_) => gauss_interpolate(geometry, data, lon, lat, method),
        Grid::Unstructured(_) => match method {
            InterpolationMethod::Nearest => {
                let (i, j) = geometry.ll2ij(lon, lat)?;
                Ok(data[geometry.flat_index(i as usize, j as usize)?])
            }
            _ => Err(GeometryError::unsupported(format!(
                "{} interpolation on an unstructured geometry",
                method
            ))),
        },
    }
}

/// Gridpoints `(i, j)` involved in interpolating at (lon, lat).
///
/// Nearest first for `Nearest`; the 4 (linear) or 16 (cubic) surrounding
/// points otherwise, without duplicates.
pub fn nearest_points(
    geometry: &Geometry,
    lon: f64,
    lat: f64,
    method: InterpolationMethod,
) -> Result<Vec<(usize, usize)>> {
    let mut points: Vec<(usize, usize)> = Vec::with_capacity(method.points_number());
    let mut push = |p: (usize, usize)| {
        if !points.contains(&p) {
            points.push(p);
        }
    };
    match &geometry.grid {
        Grid::Rectangular(_) => {
            let (x, y) = rectangular_position(geometry, lon, lat)?;
            let (w, h) = (geometry.dimensions.x, geometry.dimensions.y);
            let wrap = geometry.is_global();
            let row = |k: i64| k.clamp(0, h as i64 - 1) as usize;
            match method {
                InterpolationMethod::Nearest => {
                    push((column(x.round() as i64, w, wrap), row(y.round() as i64)))
                }
                _ => {
                    let span: i64 = if method == InterpolationMethod::Linear { 0 } else { 1 };
                    let (xi, yi) = (x.floor() as i64, y.floor() as i64);
                    for dj in -span..=1 + span {
                        for di in -span..=1 + span {
                            push((column(xi + di, w, wrap), row(yi + dj)));
                        }
                    }
                }
            }
        }
        Grid::Gauss(g) => {
            let rows = geometry.lon_number_by_lat()?;
            let (lon_c, lat_c) = geometry.gauss_to_computational(g, lon, lat);
            match method {
                InterpolationMethod::Nearest => {
                    let (i, j) = geometry.ll2ij(lon, lat)?;
                    push((i as usize, j as usize));
                }
                _ => {
                    let per_row = if method == InterpolationMethod::Linear { 2 } else { 4 };
                    for j in bracketing_rows(&g.latitudes, lat_c, method) {
                        let n = rows[j];
                        let x = normalize_lon(lon_c, 0.0) * n as f64 / 360.0;
                        let first = x.floor() as i64 - if per_row == 4 { 1 } else { 0 };
                        for k in 0..per_row {
                            push((column(first + k, n, true), j));
                        }
                    }
                }
            }
        }
        Grid::Unstructured(_) => {
            if method != InterpolationMethod::Nearest {
                return Err(GeometryError::unsupported(format!(
                    "{} interpolation on an unstructured geometry",
                    method
                )));
            }
            let (i, j) = geometry.ll2ij(lon, lat)?;
            push((i as usize, j as usize));
        }
    }
    Ok(points)
}

/// Rows used around latitude `lat`: the 2 (linear) or 4 (cubic) rows
/// bracketing it, or the nearest row beyond the outermost latitudes.
fn bracketing_rows(latitudes: &[f64], lat: f64, method: InterpolationMethod) -> Vec<usize> {
    let n = latitudes.len();
    if n < 2 || lat >= latitudes[0] || lat <= latitudes[n - 1] {
        return vec![nearest_latitude_row(latitudes, lat)];
    }
    // latitudes run north to south
    let j0 = latitudes.iter().rposition(|l| *l >= lat).unwrap_or(0);
    let j1 = (j0 + 1).min(n - 1);
    if method == InterpolationMethod::Cubic && j0 >= 1 && j1 + 1 < n {
        vec![j0 - 1, j0, j1, j1 + 1]
    } else {
        vec![j0, j1]
    }
}

/// Interpolate along Gaussian row `j` at computational longitude `lon_c`.
fn gauss_row_value(
    geometry: &Geometry,
    data: &[f64],
    j: usize,
    lon_c: f64,
    method: InterpolationMethod,
) -> Result<f64> {
    let n = geometry.lon_number_by_lat()?[j];
    let offset = geometry.flat_index(0, j)?;
    let row = &data[offset..offset + n];
    let x = normalize_lon(lon_c, 0.0) * n as f64 / 360.0;
    Ok(match method {
        InterpolationMethod::Nearest => nearest_interpolate(row, n, 1, x, 0.0, true),
        InterpolationMethod::Linear => bilinear_interpolate(row, n, 1, x, 0.0, true),
        InterpolationMethod::Cubic => cubic_interpolate(row, n, 1, x, 0.0, true),
    })
}

fn gauss_interpolate(
    geometry: &Geometry,
    data: &[f64],
    lon: f64,
    lat: f64,
    method: InterpolationMethod,
) -> Result<f64> {
    let g = geometry.gauss_grid()?;
    if method == InterpolationMethod::Nearest {
        let (i, j) = geometry.ll2ij(lon, lat)?;
        return Ok(data[geometry.flat_index(i as usize, j as usize)?]);
    }
    let (lon_c, lat_c) = geometry.gauss_to_computational(g, lon, lat);
    let rows = bracketing_rows(&g.latitudes, lat_c, method);
    let mut values = Vec::with_capacity(rows.len());
    for j in &rows {
        values.push(gauss_row_value(geometry, data, *j, lon_c, method)?);
    }
    if values.iter().any(|v| is_missing(*v)) {
        return Ok(f64::NAN);
    }
    Ok(match rows.as_slice() {
        [_] => values[0],
        [j0, j1] => {
            let (l0, l1) = (g.latitudes[*j0], g.latitudes[*j1]);
            let t = (l0 - lat_c) / (l0 - l1);
            values[0] * (1.0 - t) + values[1] * t
        }
        _ => {
            let nodes = [
                g.latitudes[rows[0]],
                g.latitudes[rows[1]],
                g.latitudes[rows[2]],
                g.latitudes[rows[3]],
            ];
            lagrange_cubic(nodes, [values[0], values[1], values[2], values[3]], lat_c)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_interpolate() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

        assert_eq!(nearest_interpolate(&data, 3, 3, 0.0, 0.0, false), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 1.0, 1.0, false), 5.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.4, 0.4, false), 1.0);
        assert_eq!(nearest_interpolate(&data, 3, 3, 0.6, 0.6, false), 5.0);
    }

    #[test]
    fn test_bilinear_interpolate() {
        let data = vec![1.0, 2.0, 3.0, 4.0];

        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 0.0, false), 1.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 0.0, false), 2.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 0.0, 1.0, false), 3.0);
        assert_eq!(bilinear_interpolate(&data, 2, 2, 1.0, 1.0, false), 4.0);

        let center = bilinear_interpolate(&data, 2, 2, 0.5, 0.5, false);
        assert!((center - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_wraps_on_global_rows() {
        let data = vec![0.0, 10.0, 20.0, 30.0];
        let v = bilinear_interpolate(&data, 4, 1, 3.5, 0.0, true);
        assert!((v - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_bilinear_with_missing() {
        let data = vec![1.0, f64::NAN, 3.0, 4.0];
        assert!(bilinear_interpolate(&data, 2, 2, 0.5, 0.5, false).is_nan());
        let masked = vec![1.0, MASK_OUTSIDE, 3.0, 4.0];
        assert!(bilinear_interpolate(&masked, 2, 2, 0.5, 0.5, false).is_nan());
    }

    #[test]
    fn test_cubic_exact_on_gridpoints() {
        let data: Vec<f64> = (0..16).map(|k| (k * k) as f64).collect();
        for j in 0..4 {
            for i in 0..4 {
                let v = cubic_interpolate(&data, 4, 4, i as f64, j as f64, false);
                assert!((v - data[j * 4 + i]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_lagrange_reproduces_cubic() {
        let f = |t: f64| 2.0 * t * t * t - t + 1.0;
        let nodes = [60.0, 30.0, 0.0, -30.0];
        let values = nodes.map(f);
        assert!((lagrange_cubic(nodes, values, 12.5) - f(12.5)).abs() < 1e-6);
    }

    #[test]
    fn test_bracketing_rows_poles() {
        let lats = vec![60.0, 20.0, -20.0, -60.0];
        assert_eq!(bracketing_rows(&lats, 75.0, InterpolationMethod::Linear), vec![0]);
        assert_eq!(bracketing_rows(&lats, 0.0, InterpolationMethod::Linear), vec![1, 2]);
        assert_eq!(bracketing_rows(&lats, 0.0, InterpolationMethod::Cubic), vec![0, 1, 2, 3]);
        assert_eq!(bracketing_rows(&lats, 40.0, InterpolationMethod::Cubic), vec![0, 1]);
    }
}
