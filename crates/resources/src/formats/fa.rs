//! FA files: the ARPEGE/AROME model format.
//!
//! An FA file is an LFI archive whose first articles form a header (the
//! horizontal geometry, the hybrid-pressure grid, the date) followed by
//! one article per field. Field names are unique and carry their level
//! (`S090TEMPERATURE`); the FA field dictionary tells H2D fields from
//! Misc ones and gives their generic identifiers.
//!
//! Gridpoint and spectral fields are simple-packed (`KNGRIB > 0`) or
//! stored as raw 64-bit reals (`KNGRIB = 0`). The compression of each field
//! read is remembered and reused when a field of that name is rewritten.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use tracing::{debug, info, warn};

use field::{Field, FieldId, FormatFid, GenericFid, GeoField, MiscField, MiscValue};
use geometry::{
    Dimensions, GaussGrid, Geoid, Geometry, GeometryName, GridPosition, LamZones, ProjectionParams,
    RectangularGrid, Subzone, VCoordinate,
};
use lfi_parser::{words, LfiError, LfiFile};
use meteo_common::constants::{processtype, surface};
use meteo_common::packing::{make_bitmap, read_bitmap};
use meteo_common::{EngineConfig, FaCompression, FieldValidity, FieldValidityList, OpenMode, SimplePacking};
use spectral::{SpectralGeometry, SpectralSpace, Truncation};

use crate::error::{ResourceError, Result};
use crate::fa_names::{level_from_name, mocage_term_hours, parameter_of, satellite_channel, uv_markers};
use crate::field_dict::{field_dict, DictEntry, DictFormat, FieldType, Nature};
use crate::resource::{list_section, Format, FormatResource};

/// Header articles, in file order.
pub const HEADER_ARTICLES: [&str; 7] = [
    "DATE-DES-DONNEES",
    "CADRE-DIMENSIONS",
    "CADRE-FOCONSTANT",
    "CADRE-SINLATITUD",
    "CADRE-NBLONGITUD",
    "CADRE-NOZPAIRSPE",
    "CADRE-FORPOSIHYB",
];

/// Second-precision date article.
pub const DATX_ARTICLE: &str = "DATX-DES-DONNEES";

const DATE_WORDS: usize = 11;
const DATX_WORDS: usize = 22;
const FIELD_HEADER_WORDS: usize = 7;
const EPSILON: f64 = 1e-10;

/// Surface types of the fields grouped by parameter in [`FaResource::sortfields`].
const PROFILE_SURFACES: [u16; 5] = [
    surface::HYBRID_PRESSURE,
    surface::ISOBARIC,
    surface::HEIGHT,
    surface::POTENTIAL_VORTICITY,
    surface::ISOTHERMAL,
];

fn corrupt(msg: impl Into<String>) -> ResourceError {
    ResourceError::Lfi(LfiError::invalid_data(msg))
}

// ============================================================================
// Header
// ============================================================================

/// Raw FA header ("cadre").
///
/// Rectangular grids have `ktyptr <= 0` (minus the X truncation for LAM,
/// `-11` for regular lon-lat); Gaussian grids have `ktyptr` 1, or 2 when
/// rotated. `psinla[0] = -1` marks a "new" header; "old" headers store the
/// LAM projection parameters elsewhere and are only read.
#[derive(Debug, Clone, PartialEq)]
pub struct FaHeader {
    pub ktyptr: i64,
    pub pslapo: f64,
    pub pclopo: f64,
    pub pslopo: f64,
    pub pcodil: f64,
    pub ktronc: i64,
    pub knlati: usize,
    pub knxlon: usize,
    pub knlopa: Vec<i64>,
    pub knozpa: Vec<i64>,
    pub psinla: Vec<f64>,
    pub prefer: f64,
    pub pahybr: Vec<f64>,
    pub pbhybr: Vec<f64>,
}

impl FaHeader {
    /// Header of a new file holding fields on `geometry`.
    pub fn from_geometry(geometry: &Geometry, spectral_geometry: Option<&SpectralGeometry>) -> Result<Self> {
        if let Some(p) = &geometry.projection {
            if p.rotation.abs() > EPSILON || p.is_secant() {
                return Err(ResourceError::usage(
                    "FA only holds tangent projections without rotation",
                ));
            }
        }
        let mut header = match geometry.name {
            GeometryName::ReducedGauss | GeometryName::RotatedReducedGauss => {
                Self::gauss_cadre(geometry, spectral_geometry)?
            }
            GeometryName::RegularLonlat => Self::lonlat_cadre(geometry)?,
            GeometryName::Lambert
            | GeometryName::Mercator
            | GeometryName::PolarStereographic
            | GeometryName::Academic => Self::lam_cadre(geometry, spectral_geometry)?,
            GeometryName::Unstructured => {
                return Err(ResourceError::unsupported(
                    "unstructured geometries cannot be written to FA",
                ))
            }
        };
        header.set_vertical(&geometry.vcoordinate);
        Ok(header)
    }

    fn empty(ktyptr: i64, knlati: usize, knxlon: usize) -> Self {
        Self {
            ktyptr,
            pslapo: 0.0,
            pclopo: 0.0,
            pslopo: 0.0,
            pcodil: 0.0,
            ktronc: 0,
            knlati,
            knxlon,
            knlopa: vec![0; 8],
            knozpa: vec![0],
            psinla: vec![0.0; 18],
            prefer: EngineConfig::global().fa.reference_pressure,
            pahybr: vec![0.0, 0.0],
            pbhybr: vec![0.0, 1.0],
        }
    }

    fn lam_cadre(geometry: &Geometry, spectral_geometry: Option<&SpectralGeometry>) -> Result<Self> {
        let d = &geometry.dimensions;
        let grid = geometry.rectangular_grid()?;
        let (in_x, in_y) = match spectral_geometry.map(|sg| &sg.truncation) {
            Some(Truncation::Elliptic { in_x, in_y }) => (*in_x as i64, *in_y as i64),
            Some(Truncation::Triangular { .. }) => {
                return Err(ResourceError::usage("a LAM geometry needs an elliptic truncation"))
            }
            // linear grid
            None => (((d.x as i64) - 1) / 2, ((d.y as i64) - 1) / 2),
        };

        let mut h = Self::empty(-in_x, d.y, d.x);
        h.ktronc = in_y;
        h.knlopa[0] = (in_x.min(in_y).min(11) - 1).max(0);
        let ci = geometry.gimme_corners_ij(Some(Subzone::CI))?;
        h.knlopa[1] = match d.zones {
            Some(z) if z.x_cizone != d.x || z.y_cizone != d.y => 1,
            _ => 0,
        };
        h.knlopa[2] = 1 + ci.ll.0 as i64;
        h.knlopa[3] = 1 + ci.ur.0 as i64;
        h.knlopa[4] = 1 + ci.ll.1 as i64;
        h.knlopa[5] = 1 + ci.ur.1 as i64;
        h.knlopa[6] = d.zones.map_or(0, |z| z.x_iwidth as i64);
        h.knlopa[7] = d.zones.map_or(0, |z| z.y_iwidth as i64);

        h.psinla[0] = -1.0;
        h.psinla[6] = grid.x_resolution;
        h.psinla[7] = grid.y_resolution;
        h.psinla[8] = grid.x_resolution * d.x as f64;
        h.psinla[9] = grid.y_resolution * d.y as f64;
        h.psinla[10] = 2.0 * std::f64::consts::PI / h.psinla[8];
        h.psinla[11] = 2.0 * std::f64::consts::PI / h.psinla[9];
        match &geometry.projection {
            None => h.pcodil = -1.0,
            Some(p) => {
                let (ci_x, ci_y) = (ci.width() as f64, ci.height() as f64);
                let center = geometry.ij2ll(
                    ci.ll.0 as f64 + (ci_x - 1.0) / 2.0,
                    ci.ll.1 as f64 + (ci_y - 1.0) / 2.0,
                )?;
                h.psinla[1] = p.reference_lat.to_radians().sin();
                h.psinla[2] = p.reference_lon.to_radians();
                h.psinla[3] = p.reference_lat.to_radians();
                h.psinla[4] = center.0.to_radians();
                h.psinla[5] = center.1.to_radians();
                let ll = geometry.ij2ll(ci.ll.0 as f64, ci.ll.1 as f64)?;
                let ur = geometry.ij2ll(ci.ur.0 as f64, ci.ur.1 as f64)?;
                h.psinla[12] = ll.0.to_radians();
                h.psinla[13] = ll.1.to_radians();
                h.psinla[14] = ur.0.to_radians();
                h.psinla[15] = ur.1.to_radians();
            }
        }
        Ok(h)
    }

    fn lonlat_cadre(geometry: &Geometry) -> Result<Self> {
        let d = &geometry.dimensions;
        let grid = geometry.rectangular_grid()?;
        let (lon, lat) = geometry.getcenter()?;
        let mut h = Self::empty(-11, d.y, d.x);
        h.ktronc = 11;
        h.knlopa[0] = 10;
        h.knlopa[2] = 1;
        h.knlopa[3] = d.x as i64;
        h.knlopa[4] = 1;
        h.knlopa[5] = d.y as i64;
        h.knlopa[6] = 8;
        h.knlopa[7] = 8;
        h.psinla[0] = -1.0;
        h.psinla[1] = -9.0;
        h.psinla[2] = lon.to_radians();
        h.psinla[3] = lat.to_radians();
        h.psinla[4] = lon.to_radians();
        h.psinla[5] = lat.to_radians();
        h.psinla[6] = grid.x_resolution.to_radians();
        h.psinla[7] = grid.y_resolution.to_radians();
        h.psinla[8] = h.psinla[6] * d.x as f64;
        h.psinla[9] = h.psinla[7] * d.y as f64;
        Ok(h)
    }

    fn gauss_cadre(geometry: &Geometry, spectral_geometry: Option<&SpectralGeometry>) -> Result<Self> {
        let grid = geometry.gauss_grid()?;
        let rows = geometry.lon_number_by_lat()?;
        if rows.len() % 2 != 0 {
            return Err(ResourceError::usage(format!(
                "FA Gaussian grids have an even number of latitudes, got {}",
                rows.len()
            )));
        }
        let half = rows.len() / 2;
        let maxlon = geometry.dimensions.max_lon_number();
        let rotated = geometry.name == GeometryName::RotatedReducedGauss;
        let mut h = Self::empty(if rotated { 2 } else { 1 }, rows.len(), maxlon);

        h.pcodil = grid.dilatation_coef;
        if rotated {
            h.pslapo = grid.pole_lat.to_radians().sin();
            h.pclopo = grid.pole_lon.to_radians().cos();
            h.pslopo = grid.pole_lon.to_radians().sin();
        }
        let zonal = match spectral_geometry.map(|sg| &sg.truncation) {
            Some(Truncation::Triangular {
                max,
                max_zonal_wavenumber_by_lat,
            }) => {
                h.ktronc = *max as i64;
                max_zonal_wavenumber_by_lat.clone()
            }
            Some(Truncation::Elliptic { .. }) => {
                return Err(ResourceError::usage("a Gaussian geometry needs a triangular truncation"))
            }
            None => {
                h.ktronc = 2 * ((((maxlon as i64) - 1) / 2) / 2);
                None
            }
        };
        h.knlopa = rows[..half].iter().map(|n| *n as i64).collect();
        h.knozpa = match zonal {
            Some(z) => z.iter().take(half).map(|k| *k as i64).collect(),
            None => rows[..half]
                .iter()
                .map(|n| h.ktronc.min((*n as i64 - 1) / 2))
                .collect(),
        };
        h.psinla = grid.latitudes[..half]
            .iter()
            .map(|lat| lat.to_radians().sin())
            .collect();
        Ok(h)
    }

    fn set_vertical(&mut self, vcoordinate: &VCoordinate) {
        if vcoordinate.typeoffirstfixedsurface != surface::HYBRID_PRESSURE {
            return;
        }
        if let Some(grid) = &vcoordinate.grid {
            self.pahybr = grid.a.iter().map(|a| a / self.prefer).collect();
            self.pbhybr = grid.b.clone();
        }
    }

    fn kniver(&self) -> usize {
        self.pahybr.len().saturating_sub(1)
    }

    /// Hybrid-pressure coordinate of the header.
    pub fn vcoordinate(&self) -> Result<VCoordinate> {
        let a: Vec<f64> = self.pahybr.iter().map(|a| a * self.prefer).collect();
        Ok(VCoordinate::hybrid_pressure(a, self.pbhybr.clone())?)
    }

    /// Horizontal geometry and spectral geometry described by the header.
    pub fn to_geometry(&self) -> Result<(Geometry, Option<SpectralGeometry>)> {
        let vcoordinate = self.vcoordinate()?;
        let (geometry, sg) = if self.ktyptr <= 0 {
            self.rectangular_geometry()?
        } else {
            self.gauss_geometry()?
        };
        let radius = EngineConfig::global().geoid_radius;
        let geometry = geometry
            .with_vcoordinate(vcoordinate)
            .with_geoid(Geoid::Sphere { radius })
            .with_position(GridPosition::Center);
        Ok((geometry, sg))
    }

    fn psinla_at(&self, k: usize) -> Result<f64> {
        self.psinla
            .get(k)
            .copied()
            .ok_or_else(|| corrupt(format!("CADRE-SINLATITUD has no element {}", k)))
    }

    fn knlopa_at(&self, k: usize) -> Result<i64> {
        self.knlopa
            .get(k)
            .copied()
            .ok_or_else(|| corrupt(format!("CADRE-NBLONGITUD has no element {}", k)))
    }

    fn rectangular_geometry(&self) -> Result<(Geometry, Option<SpectralGeometry>)> {
        let lmap = (self.pcodil + 1.0).abs() > EPSILON;
        let new_header = self.psinla_at(0)?.round() as i64 != 0;
        let projected = if new_header {
            self.psinla_at(1)?.round() as i64 != -9
        } else {
            self.psinla_at(9)?.round() as i64 != -9
        };

        if !projected {
            let (x, y) = (self.knxlon, self.knlati);
            let grid = if new_header {
                RectangularGrid {
                    x_resolution: self.psinla_at(6)?.to_degrees(),
                    y_resolution: self.psinla_at(7)?.to_degrees(),
                    input_lon: self.psinla_at(4)?.to_degrees(),
                    input_lat: self.psinla_at(5)?.to_degrees(),
                    input_position: ((x as f64 - 1.0) / 2.0, (y as f64 - 1.0) / 2.0),
                    lamzone: None,
                }
            } else {
                RectangularGrid {
                    x_resolution: self.psinla_at(14)?.to_degrees(),
                    y_resolution: self.psinla_at(15)?.to_degrees(),
                    input_lon: self.psinla_at(3)?.to_degrees(),
                    input_lat: self.psinla_at(4)?.to_degrees(),
                    input_position: (0.0, 0.0),
                    lamzone: None,
                }
            };
            return Ok((Geometry::regular_lonlat(Dimensions::rectangular(x, y), grid)?, None));
        }

        let x_ci = (self.knlopa_at(3)? - self.knlopa_at(2)? + 1).max(0) as usize;
        let y_ci = (self.knlopa_at(5)? - self.knlopa_at(4)? + 1).max(0) as usize;
        let (x_iw, y_iw) = (self.knlopa_at(6)?.max(0) as usize, self.knlopa_at(7)?.max(0) as usize);
        let (dimensions, lamzone, io, jo) = if self.knlopa_at(1)? == 0 {
            if x_iw == 0 && y_iw == 0 {
                (Dimensions::rectangular(x_ci, y_ci), None, 0, 0)
            } else {
                let zones = LamZones::from_ci(x_ci, y_ci, x_iw, y_iw);
                (Dimensions::lam(x_ci, y_ci, zones), Some(Subzone::CI), 0, 0)
            }
        } else {
            let (io, jo) = ((self.knlopa_at(2)? - 1) as usize, (self.knlopa_at(4)? - 1) as usize);
            let zones = LamZones::from_ci(x_ci, y_ci, x_iw, y_iw).with_offset(io, jo);
            (
                Dimensions::lam(self.knxlon, self.knlati, zones),
                Some(Subzone::CIE),
                io,
                jo,
            )
        };
        let (x_resolution, y_resolution) = if new_header {
            (self.psinla_at(6)?, self.psinla_at(7)?)
        } else {
            (self.psinla_at(14)?, self.psinla_at(15)?)
        };
        let in_x = (-self.ktyptr).max(0) as usize;
        let in_y = self.ktronc.max(0) as usize;

        if !lmap {
            let grid = RectangularGrid {
                x_resolution,
                y_resolution,
                input_lon: 0.0,
                input_lat: 0.0,
                input_position: (0.0, 0.0),
                lamzone,
            };
            let space = if dimensions.x == 1 {
                SpectralSpace::Fourier
            } else {
                SpectralSpace::BiFourier
            };
            let sg = SpectralGeometry {
                space,
                truncation: Truncation::Elliptic { in_x, in_y },
            };
            return Ok((Geometry::academic(dimensions, grid)?, Some(sg)));
        }

        let (reference_lon, reference_lat, input_lon, input_lat, sinlat) = if new_header {
            (
                self.psinla_at(2)?,
                self.psinla_at(3)?,
                self.psinla_at(4)?,
                self.psinla_at(5)?,
                self.psinla_at(1)?,
            )
        } else {
            let (lon, lat) = (self.psinla_at(7)?, self.psinla_at(8)?);
            (lon, lat, lon, lat, self.psinla_at(9)?)
        };
        let name = if sinlat.abs() <= EPSILON {
            GeometryName::Mercator
        } else if 1.0 - sinlat.abs() <= EPSILON {
            GeometryName::PolarStereographic
        } else {
            GeometryName::Lambert
        };
        let grid = RectangularGrid {
            x_resolution,
            y_resolution,
            input_lon: input_lon.to_degrees(),
            input_lat: input_lat.to_degrees(),
            input_position: (
                io as f64 + (x_ci as f64 - 1.0) / 2.0,
                jo as f64 + (y_ci as f64 - 1.0) / 2.0,
            ),
            lamzone,
        };
        let projection = ProjectionParams::tangent(reference_lon.to_degrees(), reference_lat.to_degrees());
        let sg = SpectralGeometry {
            space: SpectralSpace::BiFourier,
            truncation: Truncation::Elliptic { in_x, in_y },
        };
        Ok((Geometry::projected(name, dimensions, grid, projection)?, Some(sg)))
    }

    fn gauss_geometry(&self) -> Result<(Geometry, Option<SpectralGeometry>)> {
        let half = self.knlati / 2;
        if self.knlopa.len() < half || self.psinla.len() < half {
            return Err(corrupt(format!(
                "Gaussian header tables shorter than {} latitudes",
                half
            )));
        }
        let mirror = |v: &[i64]| -> Vec<usize> {
            let head: Vec<usize> = v[..half].iter().map(|n| (*n).max(0) as usize).collect();
            head.iter().chain(head.iter().rev()).copied().collect()
        };
        let lon_number_by_lat = mirror(&self.knlopa);
        let zonal = if self.knozpa.len() >= half {
            Some(mirror(&self.knozpa))
        } else {
            None
        };
        let north: Vec<f64> = self.psinla[..half]
            .iter()
            .map(|s| s.clamp(-1.0, 1.0).asin().to_degrees())
            .collect();
        let latitudes = north
            .iter()
            .copied()
            .chain(north.iter().rev().map(|l| -l))
            .collect();
        let (pole_lon, pole_lat) = if self.ktyptr == 2 {
            (
                self.pslopo.atan2(self.pclopo).to_degrees(),
                self.pslapo.clamp(-1.0, 1.0).asin().to_degrees(),
            )
        } else {
            (0.0, 90.0)
        };
        let grid = GaussGrid {
            latitudes,
            pole_lon,
            pole_lat,
            dilatation_coef: self.pcodil,
        };
        // the swapping guard applies when a spectral field is read
        let sg = SpectralGeometry {
            space: SpectralSpace::Legendre,
            truncation: Truncation::Triangular {
                max: self.ktronc.max(0) as usize,
                max_zonal_wavenumber_by_lat: zonal,
            },
        };
        Ok((Geometry::reduced_gauss(lon_number_by_lat, grid)?, Some(sg)))
    }

    /// Read the header articles; also returns the file identifier (CDIDEN).
    pub fn read(lfi: &mut LfiFile) -> Result<(Self, String)> {
        let dims = lfi.read_i64s("CADRE-DIMENSIONS")?;
        if dims.len() < 8 {
            return Err(corrupt("CADRE-DIMENSIONS holds fewer than 8 words"));
        }
        let cdiden: String = dims[8..]
            .iter()
            .filter_map(|c| u32::try_from(*c).ok().and_then(char::from_u32))
            .collect();
        let consts = lfi.read_f64s("CADRE-FOCONSTANT")?;
        if consts.len() < 5 {
            return Err(corrupt("CADRE-FOCONSTANT holds fewer than 5 words"));
        }
        let kniver = dims[4].max(0) as usize;
        let hybr = lfi.read_f64s("CADRE-FORPOSIHYB")?;
        if hybr.len() < 2 * (kniver + 1) {
            return Err(corrupt(format!(
                "CADRE-FORPOSIHYB holds {} words, {} expected",
                hybr.len(),
                2 * (kniver + 1)
            )));
        }
        let header = Self {
            ktyptr: dims[0],
            ktronc: dims[1],
            knlati: dims[2].max(0) as usize,
            knxlon: dims[3].max(0) as usize,
            pslapo: consts[0],
            pclopo: consts[1],
            pslopo: consts[2],
            pcodil: consts[3],
            prefer: consts[4],
            psinla: lfi.read_f64s("CADRE-SINLATITUD")?,
            knlopa: lfi.read_i64s("CADRE-NBLONGITUD")?,
            knozpa: lfi.read_i64s("CADRE-NOZPAIRSPE")?,
            pahybr: hybr[..=kniver].to_vec(),
            pbhybr: hybr[kniver + 1..2 * (kniver + 1)].to_vec(),
        };
        Ok((header, cdiden.trim_end().to_string()))
    }

    /// Write the header articles (the date excepted).
    pub fn write(&self, lfi: &mut LfiFile, cdiden: &str) -> Result<()> {
        let mut dims = vec![
            self.ktyptr,
            self.ktronc,
            self.knlati as i64,
            self.knxlon as i64,
            self.kniver() as i64,
            self.knlopa.len() as i64,
            self.knozpa.len() as i64,
            self.psinla.len() as i64,
        ];
        dims.extend(cdiden.chars().map(|c| c as i64));
        lfi.write_i64s("CADRE-DIMENSIONS", &dims)?;
        lfi.write_f64s(
            "CADRE-FOCONSTANT",
            &[self.pslapo, self.pclopo, self.pslopo, self.pcodil, self.prefer],
        )?;
        lfi.write_f64s("CADRE-SINLATITUD", &self.psinla)?;
        lfi.write_i64s("CADRE-NBLONGITUD", &self.knlopa)?;
        lfi.write_i64s("CADRE-NOZPAIRSPE", &self.knozpa)?;
        let hybr: Vec<f64> = self.pahybr.iter().chain(self.pbhybr.iter()).copied().collect();
        lfi.write_f64s("CADRE-FORPOSIHYB", &hybr)?;
        Ok(())
    }
}

// ============================================================================
// Dates
// ============================================================================

/// `DATE-DES-DONNEES` and `DATX-DES-DONNEES` words of a validity.
pub fn encode_date(validity: &FieldValidity, processtype: i64) -> (Vec<i64>, Vec<i64>) {
    let basis = validity.basis;
    let term_seconds = validity.term.num_seconds();
    let cumul_start = validity.cumulativeduration.map(|c| term_seconds - c.num_seconds());

    let mut date = vec![0i64; DATE_WORDS];
    date[0] = basis.year() as i64;
    date[1] = basis.month() as i64;
    date[2] = basis.day() as i64;
    date[3] = basis.hour() as i64;
    date[4] = basis.minute() as i64;
    date[5] = 1;
    date[6] = term_seconds / 3600;
    date[7] = validity.multi as i64;
    date[8] = processtype;
    date[9] = cumul_start.map_or(0, |s| s / 3600);
    date[10] = cumul_start.is_some() as i64;

    let mut datx = vec![0i64; DATX_WORDS];
    datx[..DATE_WORDS].copy_from_slice(&date);
    datx[11] = 1;
    datx[13] = basis.num_seconds_from_midnight() as i64;
    datx[14] = term_seconds;
    datx[15] = cumul_start.unwrap_or(0);
    (date, datx)
}

/// Validity and process type of the date words; `datx` wins when present.
pub fn decode_date(date: &[i64], datx: Option<&[i64]>) -> Result<(FieldValidity, i64)> {
    if date.len() < DATE_WORDS {
        return Err(corrupt(format!(
            "DATE-DES-DONNEES holds {} words, {} expected",
            date.len(),
            DATE_WORDS
        )));
    }
    let datx = datx.filter(|x| x.len() >= 16 && x[11] == 1);
    let day = Utc
        .with_ymd_and_hms(date[0] as i32, date[1] as u32, date[2] as u32, 0, 0, 0)
        .single()
        .ok_or_else(|| corrupt(format!("invalid date {}-{}-{}", date[0], date[1], date[2])))?;
    let seconds_of_day = match datx {
        Some(x) => x[13],
        None => date[3] * 3600 + date[4] * 60,
    };
    let basis: DateTime<Utc> = day + Duration::seconds(seconds_of_day);
    let unit = if date[5] == 2 { 24 * 3600 } else { 3600 };
    let term_seconds = match datx {
        Some(x) => x[14],
        None => date[6] * unit,
    };
    let mut validity = FieldValidity::new(basis, Duration::seconds(term_seconds)).with_multi(date[7] == 1);
    if date[10] == 1 {
        let start = match datx {
            Some(x) => x[15],
            None => date[9] * unit,
        };
        validity = validity.with_cumulativeduration(Duration::seconds(term_seconds - start));
    }
    Ok((validity, date[8]))
}

// ============================================================================
// Field articles
// ============================================================================

/// How a field article is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEncoding {
    pub spectral: bool,
    pub kngrib: i64,
    pub knbits: i64,
    pub kstron: i64,
    pub kpuila: i64,
}

impl FieldEncoding {
    /// Compression that rewrites a field the way it was read.
    fn as_compression(&self, base: FaCompression) -> FaCompression {
        FaCompression {
            kngrib: self.kngrib,
            knbpdg: if self.spectral { base.knbpdg } else { self.knbits },
            knbcsp: if self.spectral { self.knbits } else { base.knbcsp },
            kstron: self.kstron,
            kpuila: self.kpuila,
            kdmopl: base.kdmopl,
        }
    }
}

fn pad_to_words(mut bytes: Vec<u8>) -> Vec<u8> {
    let rem = bytes.len() % words::WORD_BYTES;
    if rem != 0 {
        bytes.resize(bytes.len() + words::WORD_BYTES - rem, 0);
    }
    bytes
}

/// Article of a field's values; missing (NaN) values go to a bitmap.
pub fn encode_values(values: &[f64], spectral: bool, compression: &FaCompression) -> Result<Vec<u8>> {
    let has_bitmap = values.iter().any(|v| v.is_nan());
    let bits = if spectral {
        compression.knbcsp
    } else {
        compression.knbpdg
    };
    let packed = compression.kngrib > 0;
    let header = [
        spectral as i64,
        compression.kngrib,
        if packed { bits } else { 64 },
        compression.kstron,
        compression.kpuila,
        values.len() as i64,
        (packed && has_bitmap) as i64,
    ];
    let mut out = words::i64s_to_bytes(&header);
    if !packed {
        out.extend(words::f64s_to_bytes(values));
        return Ok(out);
    }
    let bits = u8::try_from(bits)
        .map_err(|_| ResourceError::usage(format!("cannot pack on {} bits", bits)))?;
    let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    let packing = SimplePacking::compute(&present, bits, 0)?;
    let data = packing.pack(&present);
    out.extend(words::f64s_to_bytes(&[packing.reference_value as f64]));
    out.extend(words::i64s_to_bytes(&[
        packing.binary_scale_factor as i64,
        packing.decimal_scale_factor as i64,
        packing.bits_per_value as i64,
        data.len() as i64,
    ]));
    out.extend(pad_to_words(data));
    if has_bitmap {
        out.extend(pad_to_words(make_bitmap(values.iter().map(|v| !v.is_nan()))));
    }
    Ok(out)
}

/// Encoding and values of a field article.
pub fn decode_values(bytes: &[u8]) -> Result<(FieldEncoding, Vec<f64>)> {
    let w = words::WORD_BYTES;
    if bytes.len() < FIELD_HEADER_WORDS * w {
        return Err(corrupt("field article shorter than its header"));
    }
    let header = words::bytes_to_i64s(&bytes[..FIELD_HEADER_WORDS * w])?;
    let encoding = FieldEncoding {
        spectral: header[0] != 0,
        kngrib: header[1],
        knbits: header[2],
        kstron: header[3],
        kpuila: header[4],
    };
    let count = header[5].max(0) as usize;
    let body = &bytes[FIELD_HEADER_WORDS * w..];

    if encoding.kngrib <= 0 {
        let raw = body
            .get(..count * w)
            .ok_or_else(|| corrupt("field article shorter than its values"))?;
        return Ok((encoding, words::bytes_to_f64s(raw)?));
    }

    let params = body
        .get(..5 * w)
        .ok_or_else(|| corrupt("field article without packing parameters"))?;
    let reference = words::bytes_to_f64s(&params[..w])?[0];
    let ints = words::bytes_to_i64s(&params[w..])?;
    let packing = SimplePacking {
        reference_value: reference as f32,
        binary_scale_factor: ints[0] as i16,
        decimal_scale_factor: ints[1] as i16,
        bits_per_value: ints[2] as u8,
    };
    let data_len = ints[3].max(0) as usize;
    let data_start = 5 * w;
    let data = body
        .get(data_start..data_start + data_len)
        .ok_or_else(|| corrupt("field article shorter than its packed data"))?;

    if header[6] == 0 {
        return Ok((encoding, packing.unpack(data, count)?));
    }
    let bitmap_start = data_start + data_len.div_ceil(w) * w;
    let bitmap = body
        .get(bitmap_start..)
        .ok_or_else(|| corrupt("field article without its bitmap"))?;
    let present = read_bitmap(bitmap, count)?;
    let n_present = present.iter().filter(|p| **p).count();
    let mut packed = packing.unpack(data, n_present)?.into_iter();
    let values = present
        .iter()
        .map(|p| if *p { packed.next().unwrap_or(f64::NAN) } else { f64::NAN })
        .collect();
    Ok((encoding, values))
}

fn encode_misc(value: &MiscValue) -> Vec<u8> {
    match value {
        MiscValue::Int(v) => words::i64s_to_bytes(&[*v]),
        MiscValue::IntArray(v) => words::i64s_to_bytes(v),
        MiscValue::Float(v) => words::f64s_to_bytes(&[*v]),
        MiscValue::FloatArray(v) => words::f64s_to_bytes(v),
        MiscValue::Bool(v) => words::i64s_to_bytes(&[*v as i64]),
        MiscValue::BoolArray(v) => {
            words::i64s_to_bytes(&v.iter().map(|b| *b as i64).collect::<Vec<_>>())
        }
        MiscValue::Str(s) => words::str_to_bytes(s),
        MiscValue::StrArray(v) => words::str_to_bytes(&v.join("\n")),
    }
}

fn decode_misc(bytes: &[u8], entry: &DictEntry) -> Result<MiscValue> {
    let scalar = entry.dimension == 0;
    Ok(match entry.nature {
        Nature::Int => {
            let v = words::bytes_to_i64s(bytes)?;
            match (scalar, v.first()) {
                (true, Some(x)) => MiscValue::Int(*x),
                _ => MiscValue::IntArray(v),
            }
        }
        Nature::Bool => {
            let v: Vec<bool> = words::bytes_to_i64s(bytes)?.into_iter().map(|x| x != 0).collect();
            match (scalar, v.first()) {
                (true, Some(x)) => MiscValue::Bool(*x),
                _ => MiscValue::BoolArray(v),
            }
        }
        Nature::Float => {
            let v = words::bytes_to_f64s(bytes)?;
            match (scalar, v.first()) {
                (true, Some(x)) => MiscValue::Float(*x),
                _ => MiscValue::FloatArray(v),
            }
        }
        Nature::Str => {
            let s = words::bytes_to_str(bytes)?;
            if scalar {
                MiscValue::Str(s)
            } else {
                MiscValue::StrArray(s.split('\n').map(str::to_string).collect())
            }
        }
    })
}

// ============================================================================
// Resource
// ============================================================================

/// Settings of a new FA file, or overrides when opening one.
#[derive(Debug, Clone, Default)]
pub struct FaOptions {
    pub geometry: Option<Geometry>,
    pub spectral_geometry: Option<SpectralGeometry>,
    pub validity: Option<FieldValidityList>,
    pub cdiden: Option<String>,
    pub processtype: Option<i64>,
    pub default_compression: Option<FaCompression>,
}

/// An FA file.
///
/// In write mode the file is created when its geometry and validity are
/// known: at open if both are given, otherwise at the first H2D field
/// written.
#[derive(Debug)]
pub struct FaResource {
    path: PathBuf,
    mode: OpenMode,
    lfi: Option<LfiFile>,
    geometry: Option<Geometry>,
    spectral_geometry: Option<SpectralGeometry>,
    validity: Option<FieldValidity>,
    validity_list: Option<FieldValidityList>,
    cdiden: String,
    processtype: i64,
    default_compression: FaCompression,
    compressions: HashMap<String, FaCompression>,
}

impl FaResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, FaOptions::default())
    }

    pub fn open_with(path: &Path, mode: OpenMode, options: FaOptions) -> Result<Self> {
        let config = EngineConfig::global();
        let mut resource = Self {
            path: path.to_path_buf(),
            mode,
            lfi: None,
            geometry: None,
            spectral_geometry: None,
            validity: None,
            validity_list: None,
            cdiden: options.cdiden.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            processtype: options.processtype.unwrap_or(processtype::UNKNOWN),
            default_compression: options
                .default_compression
                .unwrap_or(config.fa.default_compression),
            compressions: HashMap::new(),
        };

        if mode.readable() {
            if options.geometry.is_some() || options.validity.is_some() {
                warn!(
                    path = %path.display(),
                    "Geometry and validity are read from the file, arguments ignored"
                );
            }
            let mut lfi = LfiFile::open(path, mode)?;
            if let Some(missing) = HEADER_ARTICLES.iter().find(|a| !lfi.contains(a)) {
                return Err(ResourceError::usage(format!(
                    "{} is not an FA file: no '{}' article",
                    path.display(),
                    missing
                )));
            }
            let (header, cdiden) = FaHeader::read(&mut lfi)?;
            let (geometry, sg) = header.to_geometry()?;
            let date = lfi.read_i64s("DATE-DES-DONNEES")?;
            let datx = if lfi.contains(DATX_ARTICLE) {
                Some(lfi.read_i64s(DATX_ARTICLE)?)
            } else {
                None
            };
            let (validity, processtype) = decode_date(&date, datx.as_deref())?;
            resource.cdiden = cdiden;
            resource.processtype = processtype;
            resource.geometry = Some(geometry);
            resource.spectral_geometry = sg;
            resource.set_validity(validity);
            resource.lfi = Some(lfi);
            debug!(path = %path.display(), mode = %mode.as_str(), "Opened FA file");
            return Ok(resource);
        }

        let validity = match options.validity {
            Some(list) => Some(list.single()?.clone()),
            None => None,
        };
        if let Some(v) = validity {
            resource.set_validity(v);
        }
        if let Some(geometry) = options.geometry {
            resource.create(&geometry, options.spectral_geometry.as_ref())?;
        }
        Ok(resource)
    }

    fn set_validity(&mut self, validity: FieldValidity) {
        self.validity_list = Some(FieldValidityList::new(validity.clone()));
        self.validity = Some(validity);
    }

    /// Create the file once geometry and validity are known.
    fn create(&mut self, geometry: &Geometry, spectral_geometry: Option<&SpectralGeometry>) -> Result<()> {
        let Some(validity) = self.validity.clone() else {
            // wait for the validity of the first field
            self.geometry = Some(geometry.clone());
            self.spectral_geometry = spectral_geometry.cloned();
            return Ok(());
        };
        if self.path.exists() && EngineConfig::global().protect_unhappy_writes {
            return Err(ResourceError::usage(format!(
                "{} exists and overwriting is protected",
                self.path.display()
            )));
        }
        let header = FaHeader::from_geometry(geometry, spectral_geometry)?;
        let mut lfi = LfiFile::open(&self.path, OpenMode::Write)?;
        if self.cdiden == "UNKNOWN" {
            let id = uuid::Uuid::new_v4().simple().to_string();
            self.cdiden = id[..16].to_uppercase();
            debug!(cdiden = %self.cdiden, "Generated FA identifier");
        }
        header.write(&mut lfi, &self.cdiden)?;
        if self.processtype == processtype::UNKNOWN && validity.term_seconds() != 0 {
            self.processtype = processtype::FORECAST;
        }
        let (geometry, sg) = header.to_geometry()?;
        self.geometry = Some(geometry);
        self.spectral_geometry = spectral_geometry.cloned().or(sg);
        self.lfi = Some(lfi);
        self.write_date()?;
        debug!(
            path = %self.path.display(),
            geometry = %self.geometry.as_ref().map_or("", |g| g.name.as_str()),
            "Created FA file"
        );
        Ok(())
    }

    fn write_date(&mut self) -> Result<()> {
        let Some(validity) = &self.validity else {
            return Ok(());
        };
        let (date, datx) = encode_date(validity, self.processtype);
        let fandax = EngineConfig::global().fa.fandax;
        let lfi = self.lfi_mut()?;
        lfi.write_i64s("DATE-DES-DONNEES", &date)?;
        if fandax {
            lfi.write_i64s(DATX_ARTICLE, &datx)?;
        }
        Ok(())
    }

    fn lfi_mut(&mut self) -> Result<&mut LfiFile> {
        self.lfi
            .as_mut()
            .ok_or_else(|| ResourceError::usage(format!("{} is not open", self.path.display())))
    }

    pub fn cdiden(&self) -> &str {
        &self.cdiden
    }

    pub fn processtype(&self) -> i64 {
        self.processtype
    }

    pub fn spectral_geometry(&self) -> Option<&SpectralGeometry> {
        self.spectral_geometry.as_ref()
    }

    /// Dictionary row of a field name; unknown names are Misc floats.
    fn entry(name: &str) -> DictEntry {
        field_dict(DictFormat::Fa)
            .find(name)
            .cloned()
            .unwrap_or_else(|| DictEntry::fallback(name))
    }

    fn name_of(fid: &FormatFid) -> Result<&str> {
        fid.as_name()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not an FA field name", fid)))
    }

    /// How a field is stored in the file.
    pub fn fieldencoding(&mut self, name: &str) -> Result<FieldEncoding> {
        let bytes = self.lfi_mut()?.read(name)?;
        let header = bytes
            .get(..FIELD_HEADER_WORDS * words::WORD_BYTES)
            .ok_or_else(|| corrupt(format!("'{}' is not a gridded field article", name)))?;
        let h = words::bytes_to_i64s(header)?;
        Ok(FieldEncoding {
            spectral: h[0] != 0,
            kngrib: h[1],
            knbits: h[2],
            kstron: h[3],
            kpuila: h[4],
        })
    }

    /// U and V component names of the wind fields matching `seed*`, sorted.
    pub fn split_uv(&self, seed: &str) -> Result<(Vec<String>, Vec<String>)> {
        let pattern = crate::glob::Glob::new(&format!("{}*", seed));
        let names: Vec<String> = self
            .listfields()?
            .iter()
            .filter_map(|f| f.as_name().map(str::to_string))
            .filter(|n| pattern.matches(n))
            .collect();
        let (u_marker, v_marker) = uv_markers(seed, names.first().map(String::as_str))?;
        let mut u: Vec<String> = names.iter().filter(|n| n.contains(u_marker)).cloned().collect();
        let mut v: Vec<String> = names.iter().filter(|n| n.contains(v_marker)).cloned().collect();
        u.sort();
        v.sort();
        Ok((u, v))
    }

    pub fn rename_field(&mut self, name: &str, new_name: &str) -> Result<()> {
        self.lfi_mut()?.rename(name, new_name)?;
        if let Some(c) = self.compressions.remove(name) {
            self.compressions.insert(new_name.to_string(), c);
        }
        Ok(())
    }

    pub fn delfield(&mut self, name: &str) -> Result<()> {
        self.lfi_mut()?.delete(name)?;
        self.compressions.remove(name);
        Ok(())
    }

    /// Geometry of a field of surface type `surface` at `level`.
    fn field_geometry(&self, surface: u16, level: f64) -> Result<Geometry> {
        let geometry = self
            .geometry
            .as_ref()
            .ok_or_else(|| ResourceError::usage("FA file without geometry"))?;
        let vcoordinate = if surface == surface::HYBRID_PRESSURE {
            geometry.vcoordinate.clone().with_levels(vec![level])
        } else {
            VCoordinate::single(surface, level)
        };
        Ok(geometry.with_vcoordinate(vcoordinate))
    }

    fn field_validity(&self, name: &str, entry: &DictEntry) -> Result<FieldValidity> {
        let base = self
            .validity
            .clone()
            .ok_or_else(|| ResourceError::usage("FA file without validity"))?;
        let mut validity = match entry.product_definition_template_number {
            Some(t) if t != 0 => match entry.type_of_statistical_processing {
                Some(code) => base.with_statistical_process(code),
                None => base,
            },
            _ => FieldValidity::new(base.basis, base.term).with_multi(base.multi),
        };
        if validity.multi {
            if let Some(hours) = mocage_term_hours(name) {
                validity = validity.with_term(Duration::hours(hours));
            }
        }
        Ok(validity)
    }

    /// Write a field with an explicit compression.
    ///
    /// Without one, a field read earlier under the same name keeps its
    /// compression; otherwise the resource default applies.
    pub fn writefield_with(&mut self, field: &Field, compression: Option<FaCompression>) -> Result<()> {
        if !self.mode.writable() {
            return Err(ResourceError::usage(format!(
                "cannot write fields in {} opened in read mode",
                self.path.display()
            )));
        }
        let name = field
            .fid()
            .get(Format::Fa.as_str())
            .and_then(FormatFid::as_name)
            .ok_or_else(|| ResourceError::usage(format!("field '{}' has no FA name", field.fid().display_name())))?
            .to_string();

        match field {
            Field::Misc(misc) => {
                if self.lfi.is_none() {
                    return Err(ResourceError::usage(
                        "the first field written to a new FA file must be H2D",
                    ));
                }
                let bytes = encode_misc(&misc.value);
                self.overwrite_notice(&name);
                self.lfi_mut()?.write(&name, &bytes)?;
                debug!(field = %name, "Wrote FA Misc field");
                Ok(())
            }
            Field::H2D(geo) => self.write_geo(&name, geo, compression),
            Field::D3(_) | Field::Vector(_) => Err(ResourceError::usage(format!(
                "FA holds H2D and Misc fields, not {}",
                field.kind()
            ))),
        }
    }

    fn overwrite_notice(&self, name: &str) {
        if self.lfi.as_ref().is_some_and(|l| l.contains(name)) {
            info!(field = %name, path = %self.path.display(), "Overwriting field");
        }
    }

    fn write_geo(&mut self, name: &str, geo: &GeoField, compression: Option<FaCompression>) -> Result<()> {
        if geo.levels_number() != 1 || geo.validity.len() != 1 {
            return Err(ResourceError::usage(format!(
                "'{}': FA fields hold one level and one validity",
                name
            )));
        }
        if self.lfi.is_none() {
            if self.validity.is_none() {
                self.set_validity(geo.validity.first().clone());
            }
            let geometry = match self.geometry.clone() {
                Some(g) => g,
                None => geo.geometry.clone(),
            };
            let sg = self.spectral_geometry.clone().or_else(|| geo.spectral_geometry.clone());
            self.create(&geometry, sg.as_ref())?;
        }

        let own = self
            .geometry
            .as_ref()
            .ok_or_else(|| ResourceError::usage("FA file without geometry"))?;
        if !own.same_horizontal_grid(&geo.geometry) {
            return Err(ResourceError::usage(format!(
                "'{}': field geometry differs from the file's ({} {}x{})",
                name, own.name, own.dimensions.x, own.dimensions.y
            )));
        }
        let vc = &geo.geometry.vcoordinate;
        if vc.typeoffirstfixedsurface == surface::HYBRID_PRESSURE {
            if let (Some(theirs), Some(ours)) = (&vc.grid, &own.vcoordinate.grid) {
                match ours.max_difference(theirs) {
                    Some(d) if d < EPSILON => {}
                    _ => {
                        return Err(ResourceError::usage(format!(
                            "'{}': hybrid-pressure grid differs from the file's",
                            name
                        )))
                    }
                }
            }
        }
        if let Some(sg) = &geo.spectral_geometry {
            if self.spectral_geometry.as_ref() != Some(sg) {
                return Err(ResourceError::usage(format!(
                    "'{}': spectral geometry differs from the file's",
                    name
                )));
            }
        }

        // cumulated fields set the file's cumulation period
        let field_validity = geo.validity.first();
        if let (Some(own_validity), Some(cumul)) = (&self.validity, field_validity.cumulativeduration) {
            if own_validity.cumulativeduration.is_none() {
                let updated = own_validity.clone().with_cumulativeduration(cumul);
                self.set_validity(updated);
                self.write_date()?;
            }
        }

        let compression = compression
            .or_else(|| self.compressions.get(name).copied())
            .unwrap_or(self.default_compression);
        let bytes = encode_values(geo.values(), geo.spectral_geometry.is_some(), &compression)?;
        self.overwrite_notice(name);
        self.lfi_mut()?.write(name, &bytes)?;
        self.compressions.insert(name.to_string(), compression);
        debug!(field = %name, kngrib = compression.kngrib, "Wrote FA field");
        Ok(())
    }
}

impl FormatResource for FaResource {
    fn format(&self) -> Format {
        Format::Fa
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn openmode(&self) -> OpenMode {
        self.mode
    }

    fn is_open(&self) -> bool {
        self.lfi.as_ref().is_some_and(LfiFile::is_open)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut lfi) = self.lfi.take() {
            lfi.close()?;
        }
        Ok(())
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        let Some(lfi) = &self.lfi else {
            return Ok(Vec::new());
        };
        Ok(lfi
            .listnames()
            .into_iter()
            .filter(|n| !HEADER_ARTICLES.contains(&n.as_str()) && n != DATX_ARTICLE)
            .map(FormatFid::Name)
            .collect())
    }

    fn field_type(&self, fid: &FormatFid) -> FieldType {
        fid.as_name().map_or(FieldType::Misc, |n| Self::entry(n).field_type)
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        let name = fid.as_name()?;
        let entry = Self::entry(name);
        if entry.field_type == FieldType::Misc {
            return None;
        }
        let mut generic = entry.generic(level_from_name(name, entry.type_of_first_fixed_surface))?;
        if let Some((category, number, channel)) = satellite_channel(name) {
            generic.parameter_category = category;
            generic.parameter_number = number;
            generic.level = channel;
        }
        Some(generic)
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        if !self.mode.readable() {
            return Err(ResourceError::usage(format!(
                "cannot read fields from {} opened in write mode",
                self.path.display()
            )));
        }
        let name = Self::name_of(fid)?.to_string();
        if !self.lfi.as_ref().is_some_and(|l| l.contains(&name)) {
            return Err(ResourceError::not_found(format!(
                "'{}' in {}",
                name,
                self.path.display()
            )));
        }
        let bytes = self.lfi_mut()?.read(&name)?;
        let entry = field_dict(DictFormat::Fa).inquire(&name);
        let generic = self.generic_fid(fid);
        let mut id = FieldId::named(Format::Fa.as_str(), name.clone());
        if let Some(g) = &generic {
            id = id.with_generic(g.clone());
        }

        if entry.field_type == FieldType::Misc {
            let value = decode_misc(&bytes, &entry)?;
            return Ok(Field::Misc(MiscField::new(id, value)));
        }

        let (encoding, values) = decode_values(&bytes)?;
        self.compressions
            .insert(name.clone(), encoding.as_compression(self.default_compression));
        let level = generic
            .as_ref()
            .map_or_else(|| level_from_name(&name, entry.type_of_first_fixed_surface), |g| g.level);
        let geometry = self.field_geometry(entry.type_of_first_fixed_surface, level)?;
        let validity = self.field_validity(&name, &entry)?;

        let geo = if encoding.spectral {
            let sg = self
                .spectral_geometry
                .clone()
                .ok_or_else(|| ResourceError::usage(format!("'{}' is spectral but the file has no truncation", name)))?;
            sg.check_memory(
                spectral::memory::total_system_memory(),
                EngineConfig::global().spectral.prevent_swapping_legendre,
            )?;
            GeoField::new_spectral(id, geometry, validity, sg, values)?
        } else {
            GeoField::new(id, geometry, validity, values)?
        };
        debug!(field = %name, spectral = encoding.spectral, kngrib = encoding.kngrib, "Read FA field");
        Ok(Field::H2D(geo.with_processtype(self.processtype)))
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        self.writefield_with(field, None)
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        self.validity_list.as_ref()
    }

    /// Misc fields, surface fields, then profile fields grouped by parameter.
    fn sortfields(&self) -> Result<BTreeMap<String, Vec<FormatFid>>> {
        let mut groups: BTreeMap<String, Vec<FormatFid>> = BTreeMap::new();
        for fid in self.listfields()? {
            let Some(name) = fid.as_name() else { continue };
            let entry = Self::entry(name);
            let group = if entry.field_type == FieldType::Misc {
                "Misc-fields".to_string()
            } else if PROFILE_SURFACES.contains(&entry.type_of_first_fixed_surface) {
                format!("3D {}", parameter_of(name))
            } else {
                "2D fields".to_string()
            };
            groups.entry(group).or_default().push(fid);
        }
        Ok(groups)
    }

    fn what(&mut self, sortfields: bool) -> Result<String> {
        let mut out = vec![
            format!("### FORMAT: {}", Format::Fa),
            format!("### PATH: {}", self.path.display()),
            format!("### IDENTIFIER (CDIDEN): {}", self.cdiden),
            format!("### PROCESSTYPE: {}", self.processtype),
        ];
        if let Some(v) = &self.validity {
            out.push(format!("### VALIDITY: {}", v.describe()));
        }
        if let Some(g) = &self.geometry {
            out.push(format!(
                "### GEOMETRY: {} {}x{}, {} hybrid-pressure level(s)",
                g.name,
                g.dimensions.x,
                g.dimensions.y,
                g.vcoordinate.levels.len()
            ));
        }
        if let Some(sg) = &self.spectral_geometry {
            out.push(format!("### SPECTRAL GEOMETRY: {} {:?}", sg.space, sg.truncation));
        }
        let c = self.default_compression;
        out.push(format!(
            "### DEFAULT COMPRESSION: KNGRIB={} KNBPDG={} KNBCSP={} KSTRON={} KPUILA={}",
            c.kngrib, c.knbpdg, c.knbcsp, c.kstron, c.kpuila
        ));
        out.push(list_section(self, sortfields)?);
        Ok(out.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meteo_common::validity::parse_datetime;

    fn lambert() -> Geometry {
        let zones = LamZones::from_ci(5, 5, 1, 1);
        let grid = RectangularGrid {
            x_resolution: 2500.0,
            y_resolution: 2500.0,
            input_lon: 2.0,
            input_lat: 45.0,
            input_position: (2.0, 2.0),
            lamzone: Some(Subzone::CI),
        };
        Geometry::projected(
            GeometryName::Lambert,
            Dimensions::lam(5, 5, zones),
            grid,
            ProjectionParams::tangent(2.0, 45.0),
        )
        .unwrap()
    }

    #[test]
    fn test_lambert_header_roundtrip() {
        let geometry = lambert();
        let header = FaHeader::from_geometry(&geometry, None).unwrap();
        assert_eq!(header.ktyptr, -2);
        assert_eq!(header.ktronc, 2);
        assert_eq!(&header.knlopa[1..8], &[0, 1, 5, 1, 5, 1, 1]);
        assert_eq!(header.psinla[0], -1.0);
        assert!((header.psinla[1] - 45f64.to_radians().sin()).abs() < 1e-12);

        let (back, sg) = header.to_geometry().unwrap();
        assert_eq!(back.name, GeometryName::Lambert);
        assert!(back.same_horizontal_grid(&geometry));
        let (lon, lat) = back.ij2ll(2.0, 2.0).unwrap();
        assert!((lon - 2.0).abs() < 1e-9 && (lat - 45.0).abs() < 1e-9);
        assert_eq!(sg.unwrap().truncation, Truncation::Elliptic { in_x: 2, in_y: 2 });
    }

    #[test]
    fn test_rotated_projection_rejected() {
        let mut geometry = lambert();
        if let Some(p) = geometry.projection.as_mut() {
            p.rotation = 10.0;
        }
        assert!(matches!(
            FaHeader::from_geometry(&geometry, None),
            Err(ResourceError::Usage(_))
        ));
    }

    #[test]
    fn test_gauss_header_mirrors_tables() {
        let rows = vec![8, 12, 12, 8];
        let grid = GaussGrid {
            latitudes: vec![60.0, 20.0, -20.0, -60.0],
            pole_lon: 0.0,
            pole_lat: 90.0,
            dilatation_coef: 1.0,
        };
        let geometry = Geometry::reduced_gauss(rows.clone(), grid).unwrap();
        let header = FaHeader::from_geometry(&geometry, None).unwrap();
        assert_eq!(header.ktyptr, 1);
        assert_eq!(header.knlopa, vec![8, 12]);
        assert_eq!(header.ktronc, 4);

        let (back, sg) = header.to_geometry().unwrap();
        assert_eq!(back.lon_number_by_lat().unwrap(), rows.as_slice());
        let lats = &back.gauss_grid().unwrap().latitudes;
        assert!((lats[0] - 60.0).abs() < 1e-9);
        assert!((lats[3] + 60.0).abs() < 1e-9);
        assert_eq!(sg.unwrap().space, SpectralSpace::Legendre);
    }

    #[test]
    fn test_hybrid_pressure_header() {
        let vc = VCoordinate::hybrid_pressure(vec![0.0, 5000.0, 0.0], vec![0.0, 0.2, 1.0]).unwrap();
        let geometry = lambert().with_vcoordinate(vc);
        let header = FaHeader::from_geometry(&geometry, None).unwrap();
        assert_eq!(header.kniver(), 2);
        let back = header.vcoordinate().unwrap();
        assert_eq!(back.levels, vec![1.0, 2.0]);
        let a = &back.grid.unwrap().a;
        assert!((a[1] - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn test_date_codec() {
        let basis = parse_datetime("2024-01-15T06:30:00Z").unwrap();
        let validity = FieldValidity::new(basis, Duration::hours(6))
            .with_cumulativeduration(Duration::hours(3));
        let (date, datx) = encode_date(&validity, processtype::FORECAST);
        assert_eq!(&date[..7], &[2024, 1, 15, 6, 30, 1, 6]);
        assert_eq!(date[8], 10);
        assert_eq!(date[9], 3);
        assert_eq!(date[10], 1);
        assert_eq!(datx[13], 6 * 3600 + 30 * 60);

        let (back, pt) = decode_date(&date, Some(&datx)).unwrap();
        assert_eq!(pt, processtype::FORECAST);
        assert_eq!(back.basis, basis);
        assert_eq!(back.term, Duration::hours(6));
        assert_eq!(back.cumulativeduration, Some(Duration::hours(3)));

        let (minutes_only, _) = decode_date(&date, None).unwrap();
        assert_eq!(minutes_only.get(), back.get());
    }

    #[test]
    fn test_packed_values_with_bitmap() {
        let values = vec![280.0, f64::NAN, 281.5, 279.25, f64::NAN];
        let bytes = encode_values(&values, false, &FaCompression::default()).unwrap();
        let (encoding, back) = decode_values(&bytes).unwrap();
        assert!(!encoding.spectral);
        assert_eq!(encoding.kngrib, 2);
        assert_eq!(encoding.knbits, 16);
        assert!(back[1].is_nan() && back[4].is_nan());
        for k in [0, 2, 3] {
            assert!((back[k] - values[k]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_unpacked_values_are_exact() {
        let compression = FaCompression {
            kngrib: 0,
            ..FaCompression::default()
        };
        let values = vec![1.0e-7, -3.25, 1.0e5];
        let (encoding, back) = decode_values(&encode_values(&values, true, &compression).unwrap()).unwrap();
        assert!(encoding.spectral);
        assert_eq!(back, values);
    }

    #[test]
    fn test_misc_codec() {
        let entry = DictEntry {
            nature: Nature::Int,
            dimension: 0,
            ..DictEntry::fallback("LSURFEX")
        };
        let bytes = encode_misc(&MiscValue::Int(7));
        assert_eq!(decode_misc(&bytes, &entry).unwrap(), MiscValue::Int(7));

        let entry = DictEntry {
            nature: Nature::Str,
            dimension: 1,
            ..DictEntry::fallback("VERSION")
        };
        let value = MiscValue::StrArray(vec!["a".into(), "bc".into()]);
        assert_eq!(decode_misc(&encode_misc(&value), &entry).unwrap(), value);
    }
}
