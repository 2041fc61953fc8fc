//! Variance spectra.
//!
//! A spectrum quantifies a signal's variance by scale: the squared mean
//! (wavenumber 0) and the variances of wavenumbers `1..=N`. Limited-area
//! spectra come from a 2-D discrete cosine transform (Denis et al. 2002),
//! global ones from spherical-harmonic coefficients.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use meteo_common::config::CoefficientOrder;

use crate::error::{Result, SpectralError};

const FILE_ID: &str = "meteo.spectra.Spectrum";
const FILE_COLUMNS: [&str; 3] = ["#", "lambda", "variance"];

/// Variance spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Variances of wavenumbers `1..=len`.
    pub variances: Vec<f64>,
    pub name: Option<String>,
    /// Gridpoint spacing of the field, in arbitrary units.
    pub resolution: Option<f64>,
    /// Squared mean (variance of wavenumber 0).
    pub mean2: Option<f64>,
}

/// Second operand of spectrum arithmetic.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Spectrum(&'a Spectrum),
    Scalar(f64),
}

impl<'a> From<&'a Spectrum> for Operand<'a> {
    fn from(s: &'a Spectrum) -> Self {
        Self::Spectrum(s)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }

    fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }
}

impl Spectrum {
    pub fn new(variances: Vec<f64>) -> Self {
        Self {
            variances,
            name: None,
            resolution: None,
            mean2: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_mean2(mut self, mean2: f64) -> Self {
        self.mean2 = Some(mean2);
        self
    }

    /// Wavenumbers `1..=N`.
    pub fn wavenumbers(&self) -> Vec<usize> {
        (1..=self.variances.len()).collect()
    }

    /// Wavelengths `2 * resolution * K / k` with `K = N + 1`.
    pub fn wavelengths(&self) -> Result<Vec<f64>> {
        let resolution = self
            .resolution
            .ok_or_else(|| SpectralError::spectrum("wavelengths need a resolution"))?;
        let big_k = (self.variances.len() + 1) as f64;
        Ok(self
            .wavenumbers()
            .into_iter()
            .map(|k| 2.0 * resolution * big_k / k as f64)
            .collect())
    }

    fn combine(&self, other: Operand<'_>, op: Op) -> Result<Spectrum> {
        let (variances, other_mean2, other_name) = match other {
            Operand::Spectrum(o) => {
                let same_resolution = match (self.resolution, o.resolution) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                };
                if o.variances.len() != self.variances.len() || !same_resolution {
                    return Err(SpectralError::spectrum(
                        "operations between spectra require that they share dimension and resolution",
                    ));
                }
                let v = self
                    .variances
                    .iter()
                    .zip(&o.variances)
                    .map(|(a, b)| op.apply(*a, *b))
                    .collect();
                (v, o.mean2, o.name.clone())
            }
            Operand::Scalar(x) => {
                let v = self.variances.iter().map(|a| op.apply(*a, x)).collect();
                (v, Some(x), Some(x.to_string()))
            }
        };
        let mean2 = match (self.mean2, other_mean2) {
            (Some(a), Some(b)) => Some(op.apply(a, b)),
            _ => None,
        };
        let name = match (&self.name, &other_name) {
            (None, None) => None,
            (a, b) => Some(format!(
                "{}{}{}",
                a.as_deref().unwrap_or("None"),
                op.symbol(),
                b.as_deref().unwrap_or("None")
            )),
        };
        Ok(Spectrum {
            variances,
            name,
            resolution: self.resolution,
            mean2,
        })
    }

    pub fn plus<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Spectrum> {
        self.combine(other.into(), Op::Add)
    }

    pub fn minus<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Spectrum> {
        self.combine(other.into(), Op::Sub)
    }

    pub fn times<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Spectrum> {
        self.combine(other.into(), Op::Mul)
    }

    pub fn divided_by<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Spectrum> {
        self.combine(other.into(), Op::Div)
    }

    /// Formatted text: id line, `key = value` header, then a column table.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", FILE_ID);
        if let Some(name) = &self.name {
            let _ = writeln!(out, "name = {}", name);
        }
        if let Some(resolution) = self.resolution {
            let _ = writeln!(out, "resolution = {}", resolution);
        }
        let _ = writeln!(out, "{:>6} {:>24} {:>24}", FILE_COLUMNS[0], FILE_COLUMNS[1], FILE_COLUMNS[2]);
        if let Some(mean2) = self.mean2 {
            let _ = writeln!(out, "{:>6} {:>24} {:>24e}", 0, "-", mean2);
        }
        let wavelengths = self.wavelengths().ok();
        for (k, v) in self.variances.iter().enumerate() {
            let lambda = wavelengths
                .as_ref()
                .map_or("-".to_string(), |w| format!("{:e}", w[k]));
            let _ = writeln!(out, "{:>6} {:>24} {:>24e}", k + 1, lambda, v);
        }
        out
    }

    pub fn write<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(self.to_text().as_bytes())?;
        Ok(())
    }

    /// Write the spectrum to a file.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write(std::io::BufWriter::new(file))
    }
}

/// Read a spectrum written by [`Spectrum::dump`].
pub fn read_spectrum(path: impl AsRef<Path>) -> Result<Spectrum> {
    let path = path.as_ref();
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut lines = reader.lines();
    let mut next_line = || -> Result<String> {
        lines
            .next()
            .transpose()?
            .ok_or_else(|| SpectralError::spectrum(format!("{}: truncated spectrum file", path.display())))
    };

    if next_line()?.trim_end() != FILE_ID {
        return Err(SpectralError::spectrum(format!(
            "file {} does not contain a Spectrum",
            path.display()
        )));
    }
    let mut name = None;
    let mut resolution = None;
    let mut line = next_line()?;
    while !line.trim_start().starts_with('#') {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "name" => name = Some(value.trim().to_string()),
                "resolution" => {
                    resolution = Some(value.trim().parse::<f64>().map_err(|e| {
                        SpectralError::spectrum(format!("invalid resolution '{}': {}", value.trim(), e))
                    })?)
                }
                _ => {}
            }
        }
        line = next_line()?;
    }
    if line.split_whitespace().collect::<Vec<_>>() != FILE_COLUMNS {
        return Err(SpectralError::spectrum(format!("unexpected columns '{}'", line.trim())));
    }

    let mut rows: Vec<(usize, String, f64)> = Vec::new();
    while let Ok(line) = next_line() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        if cols.len() != 3 {
            return Err(SpectralError::spectrum(format!("malformed row '{}'", line.trim())));
        }
        let k = cols[0]
            .parse::<usize>()
            .map_err(|e| SpectralError::spectrum(format!("invalid wavenumber '{}': {}", cols[0], e)))?;
        let v = cols[2]
            .parse::<f64>()
            .map_err(|e| SpectralError::spectrum(format!("invalid variance '{}': {}", cols[2], e)))?;
        rows.push((k, cols[1].to_string(), v));
    }
    let mut mean2 = None;
    match rows.first() {
        Some((0, _, v)) => {
            mean2 = Some(*v);
            rows.remove(0);
        }
        Some((1, _, _)) => {}
        _ => return Err(SpectralError::spectrum("first wavenumber must be 0 or 1")),
    }
    if resolution.is_none() {
        if let Some((k, lambda, _)) = rows.last() {
            if let Ok(lambda) = lambda.parse::<f64>() {
                resolution = Some(lambda * *k as f64 / (2.0 * (*k as f64 + 1.0)));
            }
        }
    }
    Ok(Spectrum {
        variances: rows.into_iter().map(|(_, _, v)| v).collect(),
        name,
        resolution,
        mean2,
    })
}

/// Sort spectra by name, in reverse lexical order.
pub fn sort_spectra(mut spectra: Vec<Spectrum>) -> Vec<Spectrum> {
    spectra.sort_by(|a, b| b.name.cmp(&a.name));
    spectra
}

/// Orthonormal DCT-II along one axis of a row-major `rows x cols` array.
fn dct_ortho(data: &[f64], rows: usize, cols: usize, along_rows: bool) -> Vec<f64> {
    let n = if along_rows { cols } else { rows };
    let mut out = vec![0.0; data.len()];
    let scale0 = (1.0 / n as f64).sqrt();
    let scale = (2.0 / n as f64).sqrt();
    let lines = if along_rows { rows } else { cols };
    for line in 0..lines {
        let at = |k: usize| if along_rows { line * cols + k } else { k * cols + line };
        for k in 0..n {
            let mut sum = 0.0;
            for i in 0..n {
                sum += data[at(i)] * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos();
            }
            out[at(k)] = sum * if k == 0 { scale0 } else { scale };
        }
    }
    out
}

/// DCT variance spectrum of a row-major 2-D array (`rows x cols`).
///
/// Returns `min(rows, cols)` values: the squared-mean term first, then
/// variances binned on elliptic wavenumbers.
pub fn dct_spectrum(data: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
    SpectralError::check_size(rows * cols, data.len())?;
    if rows == 0 || cols == 0 {
        return Err(SpectralError::spectrum("empty array"));
    }
    let y = dct_ortho(&dct_ortho(data, rows, cols, false), rows, cols, true);

    let (n, m) = (rows, cols);
    let (n2, m2) = ((n * n) as f64, (m * m) as f64);
    let mn = (m * n) as f64;
    let big_k = m.min(n);
    let mut variance = vec![0.0; big_k];
    variance[0] = y[0] * y[0] / mn;
    for j in 0..n {
        let j2 = (j * j) as f64;
        for i in 0..m {
            let var = y[j * m + i] * y[j * m + i] / mn;
            let k = ((i * i) as f64 / m2 + j2 / n2).sqrt() * big_k as f64;
            let k_inf = k.floor() as usize;
            let k_sup = k_inf + 1;
            let weight_sup = k - k_inf as f64;
            let weight_inf = 1.0 - weight_sup;
            if (0.0..1.0).contains(&k) && big_k > 1 {
                variance[1] += weight_sup * var;
            }
            if k >= 1.0 && k < (big_k - 1) as f64 {
                variance[k_inf] += weight_inf * var;
                variance[k_sup] += weight_sup * var;
            }
            if k >= (big_k - 1) as f64 && k < big_k as f64 && k >= 1.0 {
                variance[k_inf] += weight_inf * var;
            }
        }
    }
    Ok(variance)
}

/// Spectrum of a limited-area gridpoint field.
pub fn lam_spectrum(data: &[f64], rows: usize, cols: usize, name: Option<&str>, resolution: Option<f64>) -> Result<Spectrum> {
    let variance = dct_spectrum(data, rows, cols)?;
    Ok(Spectrum {
        variances: variance[1..].to_vec(),
        name: name.map(str::to_string),
        resolution,
        mean2: Some(variance[0]),
    })
}

/// Spectrum of spherical-harmonic coefficients by total wavenumber.
///
/// Coefficients are `(re, im)` pairs of the triangular truncation `max`:
/// model order loops `m` then `n in m..=max`, FA order `n` then `m in 0..=n`.
/// Zonal (`m = 0`) terms count once, the others twice.
pub fn global_spectrum(
    coefficients: &[f64],
    max: usize,
    order: CoefficientOrder,
    name: Option<&str>,
    resolution: Option<f64>,
) -> Result<Spectrum> {
    let expected = (max + 1) * (max + 2);
    SpectralError::check_size(expected, coefficients.len())?;
    let mut pairs = coefficients.chunks(2);
    let mut by_n = vec![0.0; max + 1];
    let mut visit = |m: usize, n: usize, pairs: &mut std::slice::Chunks<'_, f64>| {
        if let Some(c) = pairs.next() {
            let weight = if m == 0 { 1.0 } else { 2.0 };
            by_n[n] += weight * (c[0] * c[0] + c[1] * c[1]);
        }
    };
    match order {
        CoefficientOrder::Model => {
            for m in 0..=max {
                for n in m..=max {
                    visit(m, n, &mut pairs);
                }
            }
        }
        CoefficientOrder::Fa => {
            for n in 0..=max {
                for m in 0..=n {
                    visit(m, n, &mut pairs);
                }
            }
        }
    }
    Ok(Spectrum {
        variances: by_n[1..].to_vec(),
        name: name.map(str::to_string),
        resolution,
        mean2: Some(by_n[0]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavelengths() {
        let s = Spectrum::new(vec![1.0, 2.0, 3.0]).with_resolution(2.5);
        assert_eq!(s.wavenumbers(), vec![1, 2, 3]);
        assert_eq!(s.wavelengths().unwrap(), vec![20.0, 10.0, 20.0 / 3.0]);
        assert!(Spectrum::new(vec![1.0]).wavelengths().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Spectrum::new(vec![1.0, 2.0]).with_name("a").with_mean2(4.0);
        let b = Spectrum::new(vec![3.0, 5.0]).with_name("b").with_mean2(1.0);
        let sum = a.plus(&b).unwrap();
        assert_eq!(sum.variances, vec![4.0, 7.0]);
        assert_eq!(sum.mean2, Some(5.0));
        assert_eq!(sum.name.as_deref(), Some("a+b"));
        assert_eq!(a.divided_by(2.0).unwrap().variances, vec![0.5, 1.0]);
        assert!(a.minus(&Spectrum::new(vec![1.0])).is_err());
    }

    #[test]
    fn test_constant_field_has_no_variance() {
        let v = dct_spectrum(&[3.0; 20], 4, 5).unwrap();
        assert_eq!(v.len(), 4);
        assert!((v[0] - 9.0).abs() < 1e-9);
        assert!(v[1..].iter().all(|x| x.abs() < 1e-12));
    }

    #[test]
    fn test_dct_preserves_total_variance() {
        let data: Vec<f64> = (0..36).map(|k| ((k * 7) % 11) as f64).collect();
        let v = dct_spectrum(&data, 6, 6).unwrap();
        let mean = data.iter().sum::<f64>() / 36.0;
        let total: f64 = data.iter().map(|x| x * x).sum::<f64>() / 36.0;
        let spectral: f64 = v.iter().sum();
        // energy beyond the last bin is dropped
        assert!((v[0] - mean * mean).abs() < 1e-9);
        assert!(spectral <= total + 1e-9);
    }

    #[test]
    fn test_global_spectrum_orders_agree() {
        // max = 1: model order (0,0) (0,1) (1,1); FA order (0,0) (0,1) (1,1)
        let coefs = vec![2.0, 0.0, 1.0, 0.0, 0.5, 0.5];
        let s = global_spectrum(&coefs, 1, CoefficientOrder::Model, Some("T"), None).unwrap();
        assert_eq!(s.mean2, Some(4.0));
        assert_eq!(s.variances, vec![1.0 + 2.0 * 0.5]);
        let fa = global_spectrum(&coefs, 1, CoefficientOrder::Fa, Some("T"), None).unwrap();
        assert_eq!(fa, s);
    }

    #[test]
    fn test_sort_spectra() {
        let spectra = vec![
            Spectrum::new(vec![]).with_name("b"),
            Spectrum::new(vec![]).with_name("c"),
            Spectrum::new(vec![]).with_name("a"),
        ];
        let names: Vec<_> = sort_spectra(spectra).into_iter().filter_map(|s| s.name).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }
}
