//! Pure-Rust reference transforms for bi-Fourier and 1-D Fourier spaces.
//!
//! Coefficient layout (bi-Fourier): the half plane of wavenumber pairs
//! `(m, n)` with `m > 0`, or `m == 0` and `n >= 0`, inside the ellipse
//! `(m / in_x)^2 + (n / in_y)^2 <= 1`, each stored as `(re, im)`. Model
//! order loops `m` outermost, FA order loops `n` outermost. The field is
//!
//! ```text
//! f(i, j) = c(0,0) + 2 Re sum c(m,n) exp(2 pi i (m i / X + n j / Y))
//! ```
//!
//! over the whole (C+I+E) grid, which is bi-periodic. 1-D Fourier stores
//! `(re, im)` for `n = 0..=in_y`.

use nalgebra::Complex;
use std::f64::consts::PI;

use crate::error::{Result, SpectralError};
use crate::service::{GridpointOutput, LamTransform, TransformService};

/// Direct (separable) discrete Fourier transforms.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTransforms;

/// Does `(m, n)` lie inside the truncation ellipse?
fn in_ellipse(m: i64, n: i64, in_x: usize, in_y: usize) -> bool {
    let ratio = |k: i64, limit: usize| -> f64 {
        match (k, limit) {
            (0, _) => 0.0,
            (_, 0) => f64::INFINITY,
            (k, l) => k as f64 / l as f64,
        }
    };
    let (rx, ry) = (ratio(m, in_x), ratio(n, in_y));
    rx * rx + ry * ry <= 1.0 + 1e-12
}

/// Wavenumber pairs of an elliptic truncation, in storage order.
pub fn elliptic_waves(in_x: usize, in_y: usize, fa_order: bool) -> Vec<(i64, i64)> {
    let (mx, ny) = (in_x as i64, in_y as i64);
    let half_plane = |m: i64, n: i64| m > 0 || (m == 0 && n >= 0);
    let mut waves = Vec::new();
    if fa_order {
        for n in -ny..=ny {
            for m in 0..=mx {
                if half_plane(m, n) && in_ellipse(m, n, in_x, in_y) {
                    waves.push((m, n));
                }
            }
        }
    } else {
        for m in 0..=mx {
            for n in -ny..=ny {
                if half_plane(m, n) && in_ellipse(m, n, in_x, in_y) {
                    waves.push((m, n));
                }
            }
        }
    }
    waves
}

fn twiddle(k: i64, index: usize, period: usize, sign: f64) -> Complex<f64> {
    let angle = sign * 2.0 * PI * (k as f64) * (index as f64) / period as f64;
    Complex::new(angle.cos(), angle.sin())
}

impl ReferenceTransforms {
    fn check_grid(request: &LamTransform) -> Result<()> {
        if request.x == 0 || request.y == 0 {
            return Err(SpectralError::invalid("empty gridpoint grid"));
        }
        Ok(())
    }

    /// Evaluate coefficients (already as complex per wave) on the grid.
    fn synthesize(waves: &[(i64, i64)], coefs: &[Complex<f64>], x: usize, y: usize, in_x: usize) -> Vec<f64> {
        // g[m][j] = sum_n c(m,n) e^{2 pi i n j / Y}
        let mut g = vec![vec![Complex::new(0.0, 0.0); y]; in_x + 1];
        for ((m, n), c) in waves.iter().zip(coefs) {
            let row = &mut g[*m as usize];
            for (j, v) in row.iter_mut().enumerate() {
                *v += c * twiddle(*n, j, y, 1.0);
            }
        }
        let c00 = waves
            .iter()
            .zip(coefs)
            .find(|((m, n), _)| *m == 0 && *n == 0)
            .map_or(0.0, |(_, c)| c.re);
        let mut out = vec![0.0; x * y];
        for j in 0..y {
            // m = 0 holds only n >= 0: add the conjugate half
            let base = 2.0 * g[0][j].re - c00;
            for i in 0..x {
                let mut value = base;
                for (m, gm) in g.iter().enumerate().skip(1) {
                    value += 2.0 * (gm[j] * twiddle(m as i64, i, x, 1.0)).re;
                }
                out[j * x + i] = value;
            }
        }
        out
    }

    fn to_complex(data: &[f64]) -> Vec<Complex<f64>> {
        data.chunks(2).map(|c| Complex::new(c[0], c[1])).collect()
    }
}

impl TransformService for ReferenceTransforms {
    fn name(&self) -> &str {
        "reference"
    }

    fn lam_spectral_size(&self, request: &LamTransform) -> Result<usize> {
        Ok(2 * elliptic_waves(request.in_x, request.in_y, request.fa_order).len())
    }

    fn spec2gpt_lam(&self, request: &LamTransform, data: &[f64], derivatives: bool) -> Result<GridpointOutput> {
        Self::check_grid(request)?;
        let waves = elliptic_waves(request.in_x, request.in_y, request.fa_order);
        SpectralError::check_size(2 * waves.len(), data.len())?;
        let mut coefs = Self::to_complex(data);
        if let Some(c) = waves.iter().position(|w| *w == (0, 0)) {
            coefs[c].im = 0.0;
        }
        let (x, y) = (request.x, request.y);
        let values = Self::synthesize(&waves, &coefs, x, y, request.in_x);
        if !derivatives {
            return Ok(GridpointOutput {
                values,
                ..Default::default()
            });
        }
        let derive = |k: &dyn Fn(i64, i64) -> f64| -> Vec<f64> {
            let dc: Vec<Complex<f64>> = waves
                .iter()
                .zip(&coefs)
                .map(|((m, n), c)| c * Complex::new(0.0, k(*m, *n)))
                .collect();
            Self::synthesize(&waves, &dc, x, y, request.in_x)
        };
        let lx = x as f64 * request.x_resolution;
        let ly = y as f64 * request.y_resolution;
        let d_dx = derive(&|m, _| 2.0 * PI * m as f64 / lx);
        let d_dy = derive(&|_, n| 2.0 * PI * n as f64 / ly);
        Ok(GridpointOutput {
            values,
            d_dx: Some(d_dx),
            d_dy: Some(d_dy),
        })
    }

    fn gpt2spec_lam(&self, request: &LamTransform, data: &[f64]) -> Result<Vec<f64>> {
        Self::check_grid(request)?;
        let (x, y) = (request.x, request.y);
        SpectralError::check_size(x * y, data.len())?;
        // h[m][j] = sum_i f(i,j) e^{-2 pi i m i / X}
        let mut h = vec![vec![Complex::new(0.0, 0.0); y]; request.in_x + 1];
        for (m, hm) in h.iter_mut().enumerate() {
            for (j, v) in hm.iter_mut().enumerate() {
                for i in 0..x {
                    *v += twiddle(m as i64, i, x, -1.0) * data[j * x + i];
                }
            }
        }
        let norm = (x * y) as f64;
        let waves = elliptic_waves(request.in_x, request.in_y, request.fa_order);
        let mut out = Vec::with_capacity(2 * waves.len());
        for (m, n) in waves {
            let mut c = Complex::new(0.0, 0.0);
            for (j, hv) in h[m as usize].iter().enumerate() {
                c += hv * twiddle(n, j, y, -1.0);
            }
            c /= norm;
            if m == 0 && n == 0 {
                c.im = 0.0;
            }
            out.push(c.re);
            out.push(c.im);
        }
        Ok(out)
    }

    fn spec2gpt_fft1d(&self, in_y: usize, data: &[f64], points: usize) -> Result<Vec<f64>> {
        SpectralError::check_size(2 * (in_y + 1), data.len())?;
        let coefs = Self::to_complex(data);
        Ok((0..points)
            .map(|j| {
                let mut value = coefs[0].re;
                for (n, c) in coefs.iter().enumerate().skip(1) {
                    value += 2.0 * (c * twiddle(n as i64, j, points, 1.0)).re;
                }
                value
            })
            .collect())
    }

    fn gpt2spec_fft1d(&self, in_y: usize, data: &[f64]) -> Result<Vec<f64>> {
        let points = data.len();
        if points == 0 {
            return Err(SpectralError::invalid("empty gridpoint profile"));
        }
        let mut out = Vec::with_capacity(2 * (in_y + 1));
        for n in 0..=in_y {
            let mut c = Complex::new(0.0, 0.0);
            for (j, v) in data.iter().enumerate() {
                c += twiddle(n as i64, j, points, -1.0) * *v;
            }
            c /= points as f64;
            if n == 0 {
                c.im = 0.0;
            }
            out.push(c.re);
            out.push(c.im);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(x: usize, y: usize, in_x: usize, in_y: usize) -> LamTransform {
        LamTransform {
            x,
            y,
            x_cizone: x,
            y_cizone: y,
            in_x,
            in_y,
            knummaxresol: 10,
            fa_order: false,
            x_resolution: 1000.0,
            y_resolution: 1000.0,
        }
    }

    #[test]
    fn test_elliptic_waves_orders_are_permutations() {
        let mut model = elliptic_waves(3, 2, false);
        let mut fa = elliptic_waves(3, 2, true);
        assert_eq!(model.len(), fa.len());
        assert_ne!(model, fa);
        model.sort();
        fa.sort();
        assert_eq!(model, fa);
        assert_eq!(elliptic_waves(0, 0, false), vec![(0, 0)]);
    }

    #[test]
    fn test_constant_field() {
        let t = ReferenceTransforms;
        let r = request(8, 6, 3, 2);
        let sp = t.gpt2spec_lam(&r, &vec![5.0; 48]).unwrap();
        assert!((sp[0] - 5.0).abs() < 1e-12);
        assert!(sp[2..].iter().all(|c| c.abs() < 1e-12));
        let gp = t.spec2gpt_lam(&r, &sp, false).unwrap();
        assert!(gp.values.iter().all(|v| (v - 5.0).abs() < 1e-12));
    }

    #[test]
    fn test_single_wave_and_derivative() {
        let t = ReferenceTransforms;
        let r = request(8, 4, 2, 1);
        let (x, lx) = (8usize, 8000.0);
        let data: Vec<f64> = (0..32)
            .map(|k| (2.0 * PI * (k % x) as f64 / x as f64).cos())
            .collect();
        let sp = t.gpt2spec_lam(&r, &data).unwrap();
        let gp = t.spec2gpt_lam(&r, &sp, true).unwrap();
        for (a, b) in gp.values.iter().zip(&data) {
            assert!((a - b).abs() < 1e-10);
        }
        let d_dx = gp.d_dx.unwrap();
        for k in 0..32 {
            let expected = -(2.0 * PI / lx) * (2.0 * PI * (k % x) as f64 / x as f64).sin();
            assert!((d_dx[k] - expected).abs() < 1e-12);
        }
        assert!(gp.d_dy.unwrap().iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_fft1d_roundtrip() {
        let t = ReferenceTransforms;
        let data: Vec<f64> = (0..10).map(|j| 1.0 + (2.0 * PI * j as f64 / 10.0).sin()).collect();
        let sp = t.gpt2spec_fft1d(2, &data).unwrap();
        let gp = t.spec2gpt_fft1d(2, &sp, 10).unwrap();
        for (a, b) in gp.iter().zip(&data) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_size_mismatch() {
        let t = ReferenceTransforms;
        let r = request(4, 4, 1, 1);
        assert!(matches!(
            t.spec2gpt_lam(&r, &[1.0, 0.0], false),
            Err(SpectralError::InconsistentSize { .. })
        ));
        assert!(t.spec2gpt_gauss(&Default::default(), &[], false).is_err());
    }
}
