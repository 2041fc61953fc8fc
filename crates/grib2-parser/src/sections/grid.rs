//! Section 3: grid definition, templates 3.0, 3.10, 3.20, 3.30 and 3.40.
//!
//! Angles are converted to degrees (stored in 1e-6 degree units) and grid
//! lengths to meters (stored in millimeters).

use bytes::BufMut;

use super::{find_section, i32_at, put_i32, require, u32_at, write_section};
use crate::error::{Grib2Error, Grib2Result};

const MICRO: f64 = 1e6;
const MILLI: f64 = 1e3;
/// Value of a 4-octet field set to "missing".
const MISSING_U32: u32 = 0xFFFF_FFFF;

/// Scanning mode bit: points of a row run from east to west.
pub const SCAN_I_NEGATIVE: u8 = 0x80;
/// Scanning mode bit: rows run from south to north.
pub const SCAN_J_POSITIVE: u8 = 0x40;

/// Shape of the Earth (code table 3.2) and its scaled radius or axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarthShape {
    pub shape: u8,
    pub scale_factor_radius: u8,
    pub scaled_radius: u32,
    pub scale_factor_major: u8,
    pub scaled_major: u32,
    pub scale_factor_minor: u8,
    pub scaled_minor: u32,
}

impl EarthShape {
    /// A sphere of the given radius (m); 6371229 m uses shape 6.
    pub fn sphere(radius: f64) -> Self {
        let mut earth = Self {
            shape: 6,
            scale_factor_radius: 255,
            scaled_radius: MISSING_U32,
            scale_factor_major: 255,
            scaled_major: MISSING_U32,
            scale_factor_minor: 255,
            scaled_minor: MISSING_U32,
        };
        if (radius - 6_371_229.0).abs() > 0.5 {
            earth.shape = 1;
            earth.scale_factor_radius = 0;
            earth.scaled_radius = radius.round() as u32;
        }
        earth
    }

    /// Radius of spherical Earth shapes.
    pub fn radius(&self) -> Option<f64> {
        match self.shape {
            0 => Some(6_367_470.0),
            1 => Some(self.scaled_radius as f64 / 10f64.powi(self.scale_factor_radius as i32)),
            6 => Some(6_371_229.0),
            8 => Some(6_371_200.0),
            _ => None,
        }
    }

    /// Major and minor axes of ellipsoidal Earth shapes (m).
    pub fn axes(&self) -> Option<(f64, f64)> {
        match self.shape {
            2 => Some((6_378_160.0, 6_356_775.0)),
            4 | 5 => Some((6_378_137.0, 6_356_752.314)),
            3 | 7 => {
                let unit = if self.shape == 3 { 1000.0 } else { 1.0 };
                let major = self.scaled_major as f64 / 10f64.powi(self.scale_factor_major as i32);
                let minor = self.scaled_minor as f64 / 10f64.powi(self.scale_factor_minor as i32);
                Some((major * unit, minor * unit))
            }
            _ => None,
        }
    }

    fn parse(t: &[u8]) -> Self {
        Self {
            shape: t[0],
            scale_factor_radius: t[1],
            scaled_radius: u32_at(t, 2),
            scale_factor_major: t[6],
            scaled_major: u32_at(t, 7),
            scale_factor_minor: t[11],
            scaled_minor: u32_at(t, 12),
        }
    }

    fn write(&self, b: &mut Vec<u8>) {
        b.put_u8(self.shape);
        b.put_u8(self.scale_factor_radius);
        b.put_u32(self.scaled_radius);
        b.put_u8(self.scale_factor_major);
        b.put_u32(self.scaled_major);
        b.put_u8(self.scale_factor_minor);
        b.put_u32(self.scaled_minor);
    }
}

/// Template 3.0: regular latitude/longitude.
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    pub ni: u32,
    pub nj: u32,
    pub la1: f64,
    pub lo1: f64,
    pub la2: f64,
    pub lo2: f64,
    pub di: f64,
    pub dj: f64,
}

/// Templates 3.10, 3.20 and 3.30: conformal projections.
///
/// `lad` is the latitude where `dx`, `dy` are true; `lov` the orientation
/// longitude (polar stereographic and Lambert) or, for Mercator, the angle
/// between the i direction and the equator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGrid {
    pub nx: u32,
    pub ny: u32,
    pub la1: f64,
    pub lo1: f64,
    pub lad: f64,
    pub lov: f64,
    pub dx: f64,
    pub dy: f64,
    /// Projection centre is the south pole.
    pub south_pole: bool,
}

/// Template 3.30 extras: secant latitudes and southern pole.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertGrid {
    pub grid: ProjectedGrid,
    pub latin1: f64,
    pub latin2: f64,
    pub lat_south_pole: f64,
    pub lon_south_pole: f64,
}

/// Template 3.40: regular or reduced Gaussian.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianGrid {
    /// Points along a parallel; `None` for reduced grids.
    pub ni: Option<u32>,
    pub nj: u32,
    pub la1: f64,
    pub lo1: f64,
    pub la2: f64,
    pub lo2: f64,
    /// Number of parallels between a pole and the equator.
    pub n: u32,
    /// Points of each parallel, for reduced grids.
    pub pl: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridTemplate {
    LatLon(LatLonGrid),
    Mercator(ProjectedGrid),
    PolarStereographic(ProjectedGrid),
    Lambert(LambertGrid),
    Gaussian(GaussianGrid),
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    pub num_data_points: u32,
    pub earth: EarthShape,
    pub resolution_flags: u8,
    pub scanning_mode: u8,
    pub template: GridTemplate,
}

fn deg(raw: i32) -> f64 {
    raw as f64 / MICRO
}

fn put_deg(b: &mut Vec<u8>, v: f64) {
    put_i32(b, (v * MICRO).round() as i32);
}

fn put_deg_unsigned(b: &mut Vec<u8>, v: f64) {
    b.put_u32((v * MICRO).round() as u32);
}

/// Longitudes are stored in [0, 360).
fn put_lon(b: &mut Vec<u8>, v: f64) {
    put_deg_unsigned(b, v.rem_euclid(360.0));
}

fn meters(raw: u32) -> f64 {
    raw as f64 / MILLI
}

fn put_meters(b: &mut Vec<u8>, v: f64) {
    b.put_u32((v * MILLI).round() as u32);
}

impl GridDefinition {
    pub fn template_number(&self) -> u16 {
        match self.template {
            GridTemplate::LatLon(_) => 0,
            GridTemplate::Mercator(_) => 10,
            GridTemplate::PolarStereographic(_) => 20,
            GridTemplate::Lambert(_) => 30,
            GridTemplate::Gaussian(_) => 40,
        }
    }

    /// Rows are stored from south to north.
    pub fn rows_south_to_north(&self) -> bool {
        self.scanning_mode & SCAN_J_POSITIVE != 0
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        let pl = match &self.template {
            GridTemplate::Gaussian(g) => g.pl.as_deref(),
            _ => None,
        };
        write_section(buf, 3, |b| {
            b.put_u8(0);
            b.put_u32(self.num_data_points);
            b.put_u8(if pl.is_some() { 2 } else { 0 });
            b.put_u8(if pl.is_some() { 1 } else { 0 });
            b.put_u16(self.template_number());
            self.earth.write(b);
            match &self.template {
                GridTemplate::LatLon(g) => {
                    b.put_u32(g.ni);
                    b.put_u32(g.nj);
                    b.put_u32(0);
                    b.put_u32(MISSING_U32);
                    put_deg(b, g.la1);
                    put_lon(b, g.lo1);
                    b.put_u8(self.resolution_flags);
                    put_deg(b, g.la2);
                    put_lon(b, g.lo2);
                    put_deg_unsigned(b, g.di);
                    put_deg_unsigned(b, g.dj);
                    b.put_u8(self.scanning_mode);
                }
                GridTemplate::Mercator(g) => {
                    b.put_u32(g.nx);
                    b.put_u32(g.ny);
                    put_deg(b, g.la1);
                    put_lon(b, g.lo1);
                    b.put_u8(self.resolution_flags);
                    put_deg(b, g.lad);
                    // last point is not tracked; readers use nx, ny and dx, dy
                    b.put_u32(MISSING_U32);
                    b.put_u32(MISSING_U32);
                    b.put_u8(self.scanning_mode);
                    put_lon(b, g.lov);
                    put_meters(b, g.dx);
                    put_meters(b, g.dy);
                }
                GridTemplate::PolarStereographic(g) => {
                    write_conformal(b, g, self.resolution_flags);
                    b.put_u8(self.scanning_mode);
                }
                GridTemplate::Lambert(l) => {
                    write_conformal(b, &l.grid, self.resolution_flags);
                    b.put_u8(self.scanning_mode);
                    put_deg(b, l.latin1);
                    put_deg(b, l.latin2);
                    put_deg(b, l.lat_south_pole);
                    put_lon(b, l.lon_south_pole);
                }
                GridTemplate::Gaussian(g) => {
                    b.put_u32(g.ni.unwrap_or(MISSING_U32));
                    b.put_u32(g.nj);
                    b.put_u32(0);
                    b.put_u32(MISSING_U32);
                    put_deg(b, g.la1);
                    put_lon(b, g.lo1);
                    b.put_u8(self.resolution_flags);
                    put_deg(b, g.la2);
                    put_lon(b, g.lo2);
                    match g.ni {
                        Some(ni) if ni > 0 => put_deg_unsigned(b, 360.0 / ni as f64),
                        _ => b.put_u32(MISSING_U32),
                    }
                    b.put_u32(g.n);
                    b.put_u8(self.scanning_mode);
                    if let Some(pl) = pl {
                        pl.iter().for_each(|n| b.put_u16(*n as u16));
                    }
                }
            }
        });
    }
}

fn write_conformal(b: &mut Vec<u8>, g: &ProjectedGrid, flags: u8) {
    b.put_u32(g.nx);
    b.put_u32(g.ny);
    put_deg(b, g.la1);
    put_lon(b, g.lo1);
    b.put_u8(flags);
    put_deg(b, g.lad);
    put_lon(b, g.lov);
    put_meters(b, g.dx);
    put_meters(b, g.dy);
    b.put_u8(if g.south_pole { 0x80 } else { 0 });
}

fn parse_conformal(t: &[u8]) -> ProjectedGrid {
    ProjectedGrid {
        nx: u32_at(t, 16),
        ny: u32_at(t, 20),
        la1: deg(i32_at(t, 24)),
        lo1: deg(i32_at(t, 28)),
        lad: deg(i32_at(t, 33)),
        lov: deg(i32_at(t, 37)),
        dx: meters(u32_at(t, 41)),
        dy: meters(u32_at(t, 45)),
        south_pole: t[49] & 0x80 != 0,
    }
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(data: &[u8]) -> Grib2Result<GridDefinition> {
    let section_offset = find_section(data, 3)?;
    let section_length = u32_at(data, section_offset) as usize;
    let sec = &data[section_offset..section_offset + section_length];
    require(3, sec, 14)?;

    // Octets 6 source, 7-10 number of points, 11 size of optional list
    // entries, 12 its interpretation, 13-14 template number
    let num_data_points = u32_at(sec, 6);
    let list_octets = sec[10] as usize;
    let list_interpretation = sec[11];
    let template_number = u16::from_be_bytes([sec[12], sec[13]]);

    // Template data starts at byte 14
    let t = &sec[14..];
    let needed = match template_number {
        0 => 58,
        10 => 58,
        20 => 51,
        30 => 67,
        40 => 58,
        number => {
            return Err(Grib2Error::UnsupportedTemplate {
                what: "grid definition",
                number,
            })
        }
    };
    require(3, t, needed)?;
    let earth = EarthShape::parse(t);

    let (resolution_flags, scanning_mode, template) = match template_number {
        0 => (
            t[40],
            t[57],
            GridTemplate::LatLon(LatLonGrid {
                ni: u32_at(t, 16),
                nj: u32_at(t, 20),
                la1: deg(i32_at(t, 32)),
                lo1: deg(i32_at(t, 36)),
                la2: deg(i32_at(t, 41)),
                lo2: deg(i32_at(t, 45)),
                di: deg(i32_at(t, 49)),
                dj: deg(i32_at(t, 53)),
            }),
        ),
        10 => (
            t[32],
            t[45],
            GridTemplate::Mercator(ProjectedGrid {
                nx: u32_at(t, 16),
                ny: u32_at(t, 20),
                la1: deg(i32_at(t, 24)),
                lo1: deg(i32_at(t, 28)),
                lad: deg(i32_at(t, 33)),
                lov: deg(i32_at(t, 46)),
                dx: meters(u32_at(t, 50)),
                dy: meters(u32_at(t, 54)),
                south_pole: false,
            }),
        ),
        20 => (t[32], t[50], GridTemplate::PolarStereographic(parse_conformal(t))),
        30 => (
            t[32],
            t[50],
            GridTemplate::Lambert(LambertGrid {
                grid: parse_conformal(t),
                latin1: deg(i32_at(t, 51)),
                latin2: deg(i32_at(t, 55)),
                lat_south_pole: deg(i32_at(t, 59)),
                lon_south_pole: deg(i32_at(t, 63)),
            }),
        ),
        _ => {
            let ni = u32_at(t, 16);
            let nj = u32_at(t, 20);
            let pl = if list_interpretation == 1 && list_octets > 0 {
                let list = &t[58..];
                require(3, list, nj as usize * list_octets)?;
                Some(
                    (0..nj as usize)
                        .map(|k| {
                            list[k * list_octets..(k + 1) * list_octets]
                                .iter()
                                .fold(0u32, |acc, byte| (acc << 8) | *byte as u32)
                        })
                        .collect(),
                )
            } else {
                None
            };
            (
                t[40],
                t[57],
                GridTemplate::Gaussian(GaussianGrid {
                    ni: if ni == MISSING_U32 { None } else { Some(ni) },
                    nj,
                    la1: deg(i32_at(t, 32)),
                    lo1: deg(i32_at(t, 36)),
                    la2: deg(i32_at(t, 41)),
                    lo2: deg(i32_at(t, 45)),
                    n: u32_at(t, 53),
                    pl,
                }),
            )
        }
    };

    Ok(GridDefinition {
        num_data_points,
        earth,
        resolution_flags,
        scanning_mode,
        template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with(grid: &GridDefinition) -> Vec<u8> {
        let mut msg = vec![0u8; 16];
        grid.write(&mut msg);
        msg.extend_from_slice(b"7777");
        msg
    }

    #[test]
    fn test_lambert_roundtrip() {
        let grid = GridDefinition {
            num_data_points: 25,
            earth: EarthShape::sphere(6_371_229.0),
            resolution_flags: 0x08,
            scanning_mode: SCAN_J_POSITIVE,
            template: GridTemplate::Lambert(LambertGrid {
                grid: ProjectedGrid {
                    nx: 5,
                    ny: 5,
                    la1: 44.97,
                    lo1: 357.5,
                    lad: 45.0,
                    lov: 2.0,
                    dx: 2500.0,
                    dy: 2500.0,
                    south_pole: false,
                },
                latin1: 45.0,
                latin2: 45.0,
                lat_south_pole: -90.0,
                lon_south_pole: 0.0,
            }),
        };
        let msg = message_with(&grid);
        // section length: 14 header + 67 template
        assert_eq!(u32_at(&msg, 16), 81);
        let parsed = parse_grid_definition(&msg).unwrap();
        assert_eq!(parsed, grid);
        assert!(parsed.rows_south_to_north());
        assert_eq!(parsed.earth.radius(), Some(6_371_229.0));
    }

    #[test]
    fn test_reduced_gaussian_point_list() {
        let grid = GridDefinition {
            num_data_points: 40,
            earth: EarthShape::sphere(6_371_000.0),
            resolution_flags: 0,
            scanning_mode: 0,
            template: GridTemplate::Gaussian(GaussianGrid {
                ni: None,
                nj: 4,
                la1: 67.5,
                lo1: 0.0,
                la2: -67.5,
                lo2: 315.0,
                n: 2,
                pl: Some(vec![8, 12, 12, 8]),
            }),
        };
        let parsed = parse_grid_definition(&message_with(&grid)).unwrap();
        assert_eq!(parsed, grid);
        assert_eq!(parsed.earth.shape, 1);
        assert_eq!(parsed.earth.radius(), Some(6_371_000.0));
    }

    #[test]
    fn test_latlon_negative_first_latitude() {
        let grid = GridDefinition {
            num_data_points: 40,
            earth: EarthShape::sphere(6_371_229.0),
            resolution_flags: 0x30,
            scanning_mode: SCAN_J_POSITIVE,
            template: GridTemplate::LatLon(LatLonGrid {
                ni: 8,
                nj: 5,
                la1: -90.0,
                lo1: 0.0,
                la2: 90.0,
                lo2: 315.0,
                di: 45.0,
                dj: 45.0,
            }),
        };
        assert_eq!(parse_grid_definition(&message_with(&grid)).unwrap(), grid);
    }
}
