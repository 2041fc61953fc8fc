//! The Geometry type: horizontal grid plus vertical coordinate.
//!
//! Index conventions: `i` is the column (X), `j` the row (Y), both
//! 0-based; gridpoint data are stored row-major (`data[j * X + i]`).
//! Gaussian grids store their ragged rows one after the other, north to
//! south.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use meteo_common::bbox::{normalize_lon, BoundingBox};
use projection::geographic::{schmidt_stretch, schmidt_unstretch};
use projection::{
    ConformalProjection, LambertConformal, Mercator, PolarStereographic, PoleRotation,
};

use crate::error::{GeometryError, Result};
use crate::types::{
    Dimensions, GaussGrid, Geoid, GeometryName, Grid, GridPosition, ProjectionParams,
    RectangularGrid, Secant, Structure, Subzone, UnstructuredGrid,
};
use crate::vcoord::VCoordinate;

/// Tolerance (in grid indices) for points on the domain border.
const INDEX_EPSILON: f64 = 1e-6;

/// Corner indices `(i, j)` of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corners {
    pub ll: (usize, usize),
    pub lr: (usize, usize),
    pub ul: (usize, usize),
    pub ur: (usize, usize),
}

impl Corners {
    fn from_box(imin: usize, jmin: usize, imax: usize, jmax: usize) -> Self {
        Self {
            ll: (imin, jmin),
            lr: (imax, jmin),
            ul: (imin, jmax),
            ur: (imax, jmax),
        }
    }

    /// Does this zone lie inside `other`?
    pub fn is_within(&self, other: &Corners) -> bool {
        self.ll.0 >= other.ll.0
            && self.ll.1 >= other.ll.1
            && self.ur.0 <= other.ur.0
            && self.ur.1 <= other.ur.1
    }

    pub fn width(&self) -> usize {
        self.ur.0 - self.ll.0 + 1
    }

    pub fn height(&self) -> usize {
        self.ur.1 - self.ll.1 + 1
    }
}

/// Lon/lat corners of a zone (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornersLL {
    pub ll: (f64, f64),
    pub lr: (f64, f64),
    pub ul: (f64, f64),
    pub ur: (f64, f64),
}

/// Horizontal grid, vertical coordinate and figure of the Earth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub name: GeometryName,
    pub dimensions: Dimensions,
    pub grid: Grid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionParams>,
    pub vcoordinate: VCoordinate,
    #[serde(default)]
    pub geoid: Geoid,
    #[serde(default)]
    pub position_on_horizontal_grid: GridPosition,
}

/// Same horizontal geometry with another vertical coordinate.
pub fn with_vcoordinate(geometry: &Geometry, vcoordinate: VCoordinate) -> Geometry {
    Geometry {
        vcoordinate,
        ..geometry.clone()
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Geometry {
    /// Regular lon-lat grid; resolutions in degrees.
    pub fn regular_lonlat(dimensions: Dimensions, grid: RectangularGrid) -> Result<Self> {
        Self::build(GeometryName::RegularLonlat, dimensions, Grid::Rectangular(grid), None)
    }

    /// Lambert, Mercator or polar stereographic grid; resolutions in meters.
    pub fn projected(
        name: GeometryName,
        dimensions: Dimensions,
        grid: RectangularGrid,
        projection: ProjectionParams,
    ) -> Result<Self> {
        if !name.is_projected() {
            return Err(GeometryError::invalid(format!(
                "'{}' is not a projected geometry",
                name
            )));
        }
        let g = Self::build(name, dimensions, Grid::Rectangular(grid), Some(projection))?;
        g.conformal()?;
        Ok(g)
    }

    /// Cartesian plane grid without geographic reference; resolutions in meters.
    pub fn academic(dimensions: Dimensions, grid: RectangularGrid) -> Result<Self> {
        Self::build(GeometryName::Academic, dimensions, Grid::Rectangular(grid), None)
    }

    /// Reduced (possibly rotated and stretched) Gaussian grid.
    pub fn reduced_gauss(lon_number_by_lat: Vec<usize>, grid: GaussGrid) -> Result<Self> {
        let rotated = (grid.pole_lat - 90.0).abs() > 1e-10
            || (grid.dilatation_coef - 1.0).abs() > 1e-10;
        let name = if rotated {
            GeometryName::RotatedReducedGauss
        } else {
            GeometryName::ReducedGauss
        };
        Self::build(name, Dimensions::gauss(lon_number_by_lat), Grid::Gauss(grid), None)
    }

    /// Explicit list of points.
    pub fn unstructured(longitudes: Vec<f64>, latitudes: Vec<f64>) -> Result<Self> {
        let n = longitudes.len();
        Self::build(
            GeometryName::Unstructured,
            Dimensions::rectangular(n, 1),
            Grid::Unstructured(UnstructuredGrid {
                longitudes,
                latitudes,
            }),
            None,
        )
    }

    fn build(
        name: GeometryName,
        dimensions: Dimensions,
        grid: Grid,
        projection: Option<ProjectionParams>,
    ) -> Result<Self> {
        let geometry = Self {
            name,
            dimensions,
            grid,
            projection,
            vcoordinate: VCoordinate::unknown(),
            geoid: Geoid::default(),
            position_on_horizontal_grid: GridPosition::Center,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn with_vcoordinate(&self, vcoordinate: VCoordinate) -> Self {
        with_vcoordinate(self, vcoordinate)
    }

    pub fn with_geoid(mut self, geoid: Geoid) -> Self {
        self.geoid = geoid;
        self
    }

    pub fn with_position(mut self, position: GridPosition) -> Self {
        self.position_on_horizontal_grid = position;
        self
    }

    /// Check internal consistency: zone containment, table lengths.
    pub fn validate(&self) -> Result<()> {
        let d = &self.dimensions;
        if d.x == 0 || d.y == 0 {
            return Err(GeometryError::inconsistent("empty grid"));
        }
        if let Some(z) = &d.zones {
            let lamzone = self.rectangular_grid().ok().and_then(|g| g.lamzone);
            let (x_cover, y_cover) = match lamzone {
                Some(Subzone::C) => (z.x_czone, z.y_czone),
                Some(Subzone::CI) => (z.x_cizone, z.y_cizone),
                _ => (z.x_cioffset + z.x_cizone, z.y_cioffset + z.y_cizone),
            };
            if x_cover > d.x || y_cover > d.y {
                return Err(GeometryError::inconsistent(format!(
                    "CI zone {}x{} at offset ({}, {}) exceeds grid {}x{}",
                    z.x_cizone, z.y_cizone, z.x_cioffset, z.y_cioffset, d.x, d.y
                )));
            }
            if z.x_czone + 2 * z.x_iwidth != z.x_cizone || z.y_czone + 2 * z.y_iwidth != z.y_cizone {
                return Err(GeometryError::inconsistent(format!(
                    "C zone {}x{} with interface {}x{} does not fit CI zone {}x{}",
                    z.x_czone, z.y_czone, z.x_iwidth, z.y_iwidth, z.x_cizone, z.y_cizone
                )));
            }
        }
        match &self.grid {
            Grid::Gauss(g) => {
                let rows = d.lon_number_by_lat.as_ref().map_or(0, |r| r.len());
                if g.latitudes.len() != d.y || rows != d.y {
                    return Err(GeometryError::inconsistent(format!(
                        "{} latitudes and {} rows for lat_number {}",
                        g.latitudes.len(),
                        rows,
                        d.y
                    )));
                }
            }
            Grid::Unstructured(g) => {
                if g.longitudes.len() != g.latitudes.len() || g.longitudes.len() != d.x * d.y {
                    return Err(GeometryError::inconsistent(format!(
                        "{} longitudes and {} latitudes for {} points",
                        g.longitudes.len(),
                        g.latitudes.len(),
                        d.x * d.y
                    )));
                }
            }
            Grid::Rectangular(g) => {
                if g.x_resolution == 0.0 || g.y_resolution == 0.0 {
                    if d.x > 1 || d.y > 1 {
                        return Err(GeometryError::invalid("null grid resolution"));
                    }
                }
            }
        }
        self.vcoordinate.validate()
    }
}

// ============================================================================
// Basic properties
// ============================================================================

impl Geometry {
    pub fn rectangular_grid(&self) -> Result<&RectangularGrid> {
        match &self.grid {
            Grid::Rectangular(g) => Ok(g),
            _ => Err(GeometryError::unsupported(format!(
                "'{}' geometry has no rectangular grid",
                self.name
            ))),
        }
    }

    pub fn gauss_grid(&self) -> Result<&GaussGrid> {
        match &self.grid {
            Grid::Gauss(g) => Ok(g),
            _ => Err(GeometryError::unsupported(format!(
                "'{}' geometry is not Gaussian",
                self.name
            ))),
        }
    }

    /// Number of points of each Gaussian row.
    pub fn lon_number_by_lat(&self) -> Result<&[usize]> {
        self.dimensions
            .lon_number_by_lat
            .as_deref()
            .ok_or_else(|| GeometryError::unsupported("geometry has no Gaussian rows"))
    }

    pub fn is_lam(&self) -> bool {
        self.dimensions.zones.is_some()
    }

    /// Grids covering the whole sphere (Gaussian, or lon-lat spanning 360 degrees).
    pub fn is_global(&self) -> bool {
        match (&self.name, &self.grid) {
            (n, _) if n.is_gauss() => true,
            (GeometryName::RegularLonlat, Grid::Rectangular(g)) => {
                let span = self.dimensions.x as f64 * g.x_resolution.abs();
                (span - 360.0).abs() < g.x_resolution.abs() * 1e-3
            }
            _ => false,
        }
    }

    pub fn structure(&self) -> Structure {
        let multilevel = self.vcoordinate.levels.len() > 1;
        let (x, y) = (self.dimensions.x, self.dimensions.y);
        match (x == 1 && y == 1, y == 1 || x == 1, multilevel) {
            (true, _, false) => Structure::Point,
            (true, _, true) => Structure::V1D,
            (false, true, false) if !self.name.is_gauss() => Structure::H1D,
            (false, true, true) if !self.name.is_gauss() => Structure::V2D,
            (_, _, false) => Structure::H2D,
            (_, _, true) => Structure::D3,
        }
    }

    /// Number of gridpoints of one level, in storage order.
    pub fn packed_size(&self) -> usize {
        match &self.dimensions.lon_number_by_lat {
            Some(rows) if self.name.is_gauss() => rows.iter().sum(),
            _ => self.dimensions.x * self.dimensions.y,
        }
    }

    /// Same horizontal grid shape (name and dimensions).
    pub fn same_horizontal_grid(&self, other: &Geometry) -> bool {
        self.name == other.name && self.dimensions == other.dimensions
    }

    /// Storage offset of Gaussian row `j`.
    fn gauss_row_offset(&self, j: usize) -> Result<usize> {
        Ok(self.lon_number_by_lat()?[..j].iter().sum())
    }

    /// Storage index of point `(i, j)`.
    pub fn flat_index(&self, i: usize, j: usize) -> Result<usize> {
        if self.name.is_gauss() {
            let rows = self.lon_number_by_lat()?;
            if j >= rows.len() || i >= rows[j] {
                return Err(GeometryError::inconsistent(format!(
                    "point ({}, {}) outside Gaussian grid",
                    i, j
                )));
            }
            Ok(self.gauss_row_offset(j)? + i)
        } else {
            if i >= self.dimensions.x || j >= self.dimensions.y {
                return Err(GeometryError::inconsistent(format!(
                    "point ({}, {}) outside {}x{} grid",
                    i, j, self.dimensions.x, self.dimensions.y
                )));
            }
            Ok(j * self.dimensions.x + i)
        }
    }

    /// Conformal projection of projected geometries.
    pub fn conformal(&self) -> Result<ConformalProjection> {
        let p = self.projection.as_ref().ok_or_else(|| {
            GeometryError::unsupported(format!("'{}' geometry has no projection", self.name))
        })?;
        let radius = self.geoid.radius();
        let proj = match (self.name, p.secant) {
            (GeometryName::Lambert, Secant::Two(l1, l2)) => {
                ConformalProjection::Lambert(LambertConformal::secant(p.reference_lon, l1, l2, radius)?)
            }
            (GeometryName::Lambert, Secant::Tangent) => ConformalProjection::Lambert(
                LambertConformal::tangent(p.reference_lon, p.reference_lat, radius)?,
            ),
            (GeometryName::Mercator, Secant::One(lat_ts)) => {
                ConformalProjection::Mercator(Mercator::new(p.reference_lon, lat_ts, radius)?)
            }
            (GeometryName::Mercator, Secant::Tangent) => ConformalProjection::Mercator(
                Mercator::new(p.reference_lon, p.reference_lat, radius)?,
            ),
            (GeometryName::PolarStereographic, Secant::One(lat_ts)) => {
                ConformalProjection::PolarStereographic(PolarStereographic::new(
                    p.reference_lon,
                    lat_ts,
                    radius,
                ))
            }
            (GeometryName::PolarStereographic, Secant::Tangent) => {
                ConformalProjection::PolarStereographic(PolarStereographic::new(
                    p.reference_lon,
                    p.reference_lat,
                    radius,
                ))
            }
            (name, secant) => {
                return Err(GeometryError::unsupported(format!(
                    "projection {:?} on a '{}' geometry",
                    secant, name
                )))
            }
        };
        Ok(proj)
    }
}

// ============================================================================
// Coordinate transforms
// ============================================================================

impl Geometry {
    /// Index shift from the input point, including the grid position offset.
    fn index_delta(&self, g: &RectangularGrid, i: f64, j: f64) -> (f64, f64) {
        let (oi, oj) = self.position_on_horizontal_grid.offset();
        (i + oi - g.input_position.0, j + oj - g.input_position.1)
    }

    /// Plane coordinates (meters) of the input point of a projected grid.
    fn plane_origin(&self, g: &RectangularGrid, proj: &ConformalProjection) -> (f64, f64) {
        proj.project(g.input_lon, g.input_lat)
    }

    fn rotation(&self) -> f64 {
        self.projection.map_or(0.0, |p| p.rotation).to_radians()
    }

    /// Plane coordinates (meters) of point `(i, j)` for projected and academic grids.
    pub fn ij2xy(&self, i: f64, j: f64) -> Result<(f64, f64)> {
        let g = self.rectangular_grid()?;
        let (di, dj) = self.index_delta(g, i, j);
        let (u, v) = (di * g.x_resolution, dj * g.y_resolution);
        let beta = self.rotation();
        let (du, dv) = (u * beta.cos() - v * beta.sin(), u * beta.sin() + v * beta.cos());
        if self.name.is_projected() {
            let (x0, y0) = self.plane_origin(g, &self.conformal()?);
            Ok((x0 + du, y0 + dv))
        } else {
            Ok((du, dv))
        }
    }

    /// Inverse of [`Geometry::ij2xy`].
    pub fn xy2ij(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let g = self.rectangular_grid()?;
        let (du, dv) = if self.name.is_projected() {
            let (x0, y0) = self.plane_origin(g, &self.conformal()?);
            (x - x0, y - y0)
        } else {
            (x, y)
        };
        let beta = -self.rotation();
        let (u, v) = (du * beta.cos() - dv * beta.sin(), du * beta.sin() + dv * beta.cos());
        let (oi, oj) = self.position_on_horizontal_grid.offset();
        Ok((
            u / g.x_resolution + g.input_position.0 - oi,
            v / g.y_resolution + g.input_position.1 - oj,
        ))
    }

    /// Lon/lat (degrees) of point `(i, j)`.
    ///
    /// Academic grids have no geographic reference: plane coordinates in
    /// meters are returned instead.
    pub fn ij2ll(&self, i: f64, j: f64) -> Result<(f64, f64)> {
        match &self.grid {
            Grid::Rectangular(g) => match self.name {
                GeometryName::RegularLonlat => {
                    let (di, dj) = self.index_delta(g, i, j);
                    Ok((g.input_lon + di * g.x_resolution, g.input_lat + dj * g.y_resolution))
                }
                GeometryName::Academic => self.ij2xy(i, j),
                _ => {
                    let (x, y) = self.ij2xy(i, j)?;
                    Ok(self.conformal()?.unproject(x, y))
                }
            },
            Grid::Gauss(g) => {
                let jr = j.round();
                if jr < 0.0 || jr as usize >= g.latitudes.len() {
                    return Err(GeometryError::inconsistent(format!("row {} outside Gaussian grid", j)));
                }
                let jr = jr as usize;
                let n = self.lon_number_by_lat()?[jr] as f64;
                let lon_c = 360.0 * i / n;
                Ok(self.gauss_to_geographic(g, lon_c, g.latitudes[jr]))
            }
            Grid::Unstructured(g) => {
                let idx = j.round() as usize * self.dimensions.x + i.round() as usize;
                match (g.longitudes.get(idx), g.latitudes.get(idx)) {
                    (Some(lon), Some(lat)) => Ok((*lon, *lat)),
                    _ => Err(GeometryError::inconsistent(format!(
                        "point ({}, {}) outside unstructured grid",
                        i, j
                    ))),
                }
            }
        }
    }

    /// Fractional indices of a lon/lat point.
    ///
    /// Exact inverse of [`Geometry::ij2ll`] for rectangular grids; the
    /// nearest gridpoint for Gaussian and unstructured grids.
    pub fn ll2ij(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        match &self.grid {
            Grid::Rectangular(g) => match self.name {
                GeometryName::RegularLonlat => {
                    let lon0 = self.ij2ll(0.0, 0.0)?.0;
                    let reference = if self.is_global() {
                        lon0 - 1e-9
                    } else {
                        let center = self.ij2ll((self.dimensions.x as f64 - 1.0) / 2.0, 0.0)?.0;
                        center - 180.0
                    };
                    let lon = normalize_lon(lon, reference);
                    let (oi, oj) = self.position_on_horizontal_grid.offset();
                    Ok((
                        (lon - g.input_lon) / g.x_resolution + g.input_position.0 - oi,
                        (lat - g.input_lat) / g.y_resolution + g.input_position.1 - oj,
                    ))
                }
                GeometryName::Academic => self.xy2ij(lon, lat),
                _ => {
                    let (x, y) = self.conformal()?.project(lon, lat);
                    self.xy2ij(x, y)
                }
            },
            Grid::Gauss(g) => {
                let (lon_c, lat_c) = self.gauss_to_computational(g, lon, lat);
                let j = nearest_latitude_row(&g.latitudes, lat_c);
                let n = self.lon_number_by_lat()?[j];
                let i = (normalize_lon(lon_c, 0.0) * n as f64 / 360.0).round() as usize % n;
                Ok((i as f64, j as f64))
            }
            Grid::Unstructured(_) => {
                let (i, j) = self.nearest_unstructured(lon, lat)?;
                Ok((i as f64, j as f64))
            }
        }
    }

    pub(crate) fn gauss_to_geographic(&self, g: &GaussGrid, lon_c: f64, lat_c: f64) -> (f64, f64) {
        if self.name == GeometryName::ReducedGauss {
            return (lon_c, lat_c);
        }
        let lat_r = schmidt_unstretch(lat_c, g.dilatation_coef);
        PoleRotation::new(g.pole_lon, g.pole_lat).to_geographic(lon_c, lat_r)
    }

    /// Geographic lon/lat to the computational (rotated, stretched) sphere.
    pub(crate) fn gauss_to_computational(&self, g: &GaussGrid, lon: f64, lat: f64) -> (f64, f64) {
        if self.name == GeometryName::ReducedGauss {
            return (lon, lat);
        }
        let (lon_r, lat_r) = PoleRotation::new(g.pole_lon, g.pole_lat).to_rotated(lon, lat);
        (lon_r, schmidt_stretch(lat_r, g.dilatation_coef))
    }

    fn nearest_unstructured(&self, lon: f64, lat: f64) -> Result<(usize, usize)> {
        let (lons, lats) = self.get_lonlat_grid(None)?;
        let mut best = (0, f64::INFINITY);
        for (k, (plon, plat)) in lons.iter().zip(&lats).enumerate() {
            let d = self.distance((lon, lat), (*plon, *plat));
            if d < best.1 {
                best = (k, d);
            }
        }
        let x = self.dimensions.x;
        Ok((best.0 % x, best.0 / x))
    }
}

/// Row whose latitude is closest to `lat`.
pub(crate) fn nearest_latitude_row(latitudes: &[f64], lat: f64) -> usize {
    let mut best = (0, f64::INFINITY);
    for (j, l) in latitudes.iter().enumerate() {
        let d = (l - lat).abs();
        if d < best.1 {
            best = (j, d);
        }
    }
    best.0
}

// ============================================================================
// Zones and point lists
// ============================================================================

impl Geometry {
    /// Corner indices of the whole grid or of a limited-area zone.
    pub fn gimme_corners_ij(&self, subzone: Option<Subzone>) -> Result<Corners> {
        if self.name.is_gauss() {
            return Err(GeometryError::undefined_subzone(
                subzone.map_or("None".to_string(), |s| s.to_string()),
                self.name.as_str(),
            ));
        }
        let (x, y) = (self.dimensions.x, self.dimensions.y);
        let full = Corners::from_box(0, 0, x - 1, y - 1);
        let Some(subzone) = subzone else {
            return Ok(full);
        };
        let Some(z) = self.dimensions.zones else {
            return Err(GeometryError::undefined_subzone(subzone.to_string(), self.name.as_str()));
        };
        let coverage = self.rectangular_grid()?.lamzone.unwrap_or(Subzone::CIE);
        let undefined = || GeometryError::undefined_subzone(subzone.to_string(), self.name.as_str());

        let ci_origin = match coverage {
            Subzone::CIE => (z.x_cioffset, z.y_cioffset),
            Subzone::CI => (0, 0),
            Subzone::C => {
                return if subzone == Subzone::C { Ok(full) } else { Err(undefined()) };
            }
        };
        match subzone {
            Subzone::CIE if coverage == Subzone::CIE => Ok(full),
            Subzone::CIE => Err(undefined()),
            Subzone::CI => Ok(Corners::from_box(
                ci_origin.0,
                ci_origin.1,
                ci_origin.0 + z.x_cizone - 1,
                ci_origin.1 + z.y_cizone - 1,
            )),
            Subzone::C => {
                let (i0, j0) = (ci_origin.0 + z.x_iwidth, ci_origin.1 + z.y_iwidth);
                Ok(Corners::from_box(i0, j0, i0 + z.x_czone - 1, j0 + z.y_czone - 1))
            }
        }
    }

    /// Lon/lat of the corners of a zone.
    pub fn gimme_corners_ll(&self, subzone: Option<Subzone>) -> Result<CornersLL> {
        let c = self.gimme_corners_ij(subzone)?;
        let ll = |p: (usize, usize)| self.ij2ll(p.0 as f64, p.1 as f64);
        Ok(CornersLL {
            ll: ll(c.ll)?,
            lr: ll(c.lr)?,
            ul: ll(c.ul)?,
            ur: ll(c.ur)?,
        })
    }

    /// Number of gridpoints of a zone.
    pub fn gridpoints_number(&self, subzone: Option<Subzone>) -> Result<usize> {
        if self.name.is_gauss() {
            if subzone.is_some() {
                return Err(GeometryError::undefined_subzone(
                    subzone.map_or(String::new(), |s| s.to_string()),
                    self.name.as_str(),
                ));
            }
            return Ok(self.packed_size());
        }
        let c = self.gimme_corners_ij(subzone)?;
        Ok(c.width() * c.height())
    }

    /// Storage indices of the points of a zone, in storage order.
    pub fn subzone_indices(&self, subzone: Option<Subzone>) -> Result<Vec<usize>> {
        if self.name.is_gauss() {
            self.gridpoints_number(subzone)?;
            return Ok((0..self.packed_size()).collect());
        }
        let c = self.gimme_corners_ij(subzone)?;
        let x = self.dimensions.x;
        Ok((c.ll.1..=c.ur.1)
            .flat_map(|j| (c.ll.0..=c.ur.0).map(move |i| j * x + i))
            .collect())
    }

    /// Longitudes and latitudes of every point of a zone, in storage order.
    pub fn get_lonlat_grid(&self, subzone: Option<Subzone>) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut lons = Vec::new();
        let mut lats = Vec::new();
        match &self.grid {
            Grid::Unstructured(g) if subzone.is_none() => {
                return Ok((g.longitudes.clone(), g.latitudes.clone()));
            }
            Grid::Gauss(_) => {
                self.gridpoints_number(subzone)?;
                for (j, n) in self.lon_number_by_lat()?.iter().enumerate() {
                    for i in 0..*n {
                        let (lon, lat) = self.ij2ll(i as f64, j as f64)?;
                        lons.push(lon);
                        lats.push(lat);
                    }
                }
            }
            _ => {
                let c = self.gimme_corners_ij(subzone)?;
                for j in c.ll.1..=c.ur.1 {
                    for i in c.ll.0..=c.ur.0 {
                        let (lon, lat) = self.ij2ll(i as f64, j as f64)?;
                        lons.push(lon);
                        lats.push(lat);
                    }
                }
            }
        }
        Ok((lons, lats))
    }

    /// Reshape flat storage-order data into `[level][row][column]`.
    ///
    /// Gaussian rows are padded to `max_lon_number` with `mask`.
    pub fn reshape_data(&self, flat: &[f64], levels: usize, mask: f64) -> Result<Vec<Vec<Vec<f64>>>> {
        let size = self.packed_size();
        if flat.len() != size * levels {
            return Err(GeometryError::inconsistent(format!(
                "{} values for {} levels of {} points",
                flat.len(),
                levels,
                size
            )));
        }
        let x = self.dimensions.x;
        let mut out = Vec::with_capacity(levels);
        for level in flat.chunks(size.max(1)).take(levels) {
            let rows = if self.name.is_gauss() {
                let mut rows = Vec::with_capacity(self.dimensions.y);
                let mut offset = 0;
                for n in self.lon_number_by_lat()? {
                    let mut row = level[offset..offset + n].to_vec();
                    row.resize(x, mask);
                    rows.push(row);
                    offset += n;
                }
                rows
            } else {
                level.chunks(x).map(|r| r.to_vec()).collect()
            };
            out.push(rows);
        }
        Ok(out)
    }

    /// Inverse of [`Geometry::reshape_data`] for one level: drop padding.
    pub fn flatten_level(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.len() != self.dimensions.y {
            return Err(GeometryError::inconsistent(format!(
                "{} rows for {} latitudes",
                rows.len(),
                self.dimensions.y
            )));
        }
        let mut flat = Vec::with_capacity(self.packed_size());
        if self.name.is_gauss() {
            for (row, n) in rows.iter().zip(self.lon_number_by_lat()?) {
                flat.extend_from_slice(&row[..(*n).min(row.len())]);
            }
        } else {
            for row in rows {
                flat.extend_from_slice(row);
            }
        }
        Ok(flat)
    }
}

// ============================================================================
// Distances and local properties
// ============================================================================

impl Geometry {
    /// Distance in meters between two points: great circle, or Euclidean for academic grids.
    pub fn distance(&self, end1: (f64, f64), end2: (f64, f64)) -> f64 {
        if self.name == GeometryName::Academic {
            ((end2.0 - end1.0).powi(2) + (end2.1 - end1.1).powi(2)).sqrt()
        } else {
            projection::distance(end1, end2, self.geoid.radius())
        }
    }

    /// Bearing from `end1` to `end2`, degrees clockwise from north (or from +y).
    pub fn azimuth(&self, end1: (f64, f64), end2: (f64, f64)) -> f64 {
        if self.name == GeometryName::Academic {
            ((end2.0 - end1.0).atan2(end2.1 - end1.1).to_degrees() + 360.0) % 360.0
        } else {
            projection::azimuth(end1, end2)
        }
    }

    /// Center of the grid; the pole of the computational sphere for Gaussian grids.
    pub fn getcenter(&self) -> Result<(f64, f64)> {
        match &self.grid {
            Grid::Gauss(g) => Ok((g.pole_lon, g.pole_lat)),
            Grid::Unstructured(g) => {
                let n = g.longitudes.len() as f64;
                Ok((
                    g.longitudes.iter().sum::<f64>() / n,
                    g.latitudes.iter().sum::<f64>() / n,
                ))
            }
            Grid::Rectangular(_) => self.ij2ll(
                (self.dimensions.x as f64 - 1.0) / 2.0,
                (self.dimensions.y as f64 - 1.0) / 2.0,
            ),
        }
    }

    /// Nominal grid spacing in meters.
    pub fn nominal_resolution(&self) -> Result<f64> {
        let radius = self.geoid.radius();
        match &self.grid {
            Grid::Rectangular(g) if self.name == GeometryName::RegularLonlat => {
                Ok(g.y_resolution.abs().max(g.x_resolution.abs()).to_radians() * radius)
            }
            Grid::Rectangular(g) => Ok(g.x_resolution.abs().max(g.y_resolution.abs())),
            Grid::Gauss(_) => Ok(PI * radius / self.dimensions.y as f64),
            Grid::Unstructured(g) if g.longitudes.len() >= 2 => Ok(self.distance(
                (g.longitudes[0], g.latitudes[0]),
                (g.longitudes[1], g.latitudes[1]),
            )),
            Grid::Unstructured(_) => Err(GeometryError::unsupported(
                "resolution of a single-point geometry",
            )),
        }
    }

    /// Mean distance in meters from the gridpoint nearest to (lon, lat) to its neighbours.
    pub fn resolution_ll(&self, lon: f64, lat: f64) -> Result<f64> {
        if matches!(self.grid, Grid::Gauss(_)) && self.lon_number_by_lat()?.len() < 2 {
            return Err(GeometryError::unsupported(
                "local resolution of a Gaussian grid with a single latitude",
            ));
        }
        let (fi, fj) = self.ll2ij(lon, lat)?;
        let point_ll = |i: usize, j: usize| self.ij2ll(i as f64, j as f64);
        match &self.grid {
            Grid::Gauss(g) => {
                let rows = self.lon_number_by_lat()?;
                let j = (fj.round().max(0.0) as usize).min(rows.len() - 1);
                let i = (fi.round().max(0.0) as usize) % rows[j].max(1);
                let here = point_ll(i, j)?;
                let east = point_ll((i + 1) % rows[j], j)?;
                let jn = if j + 1 < rows.len() { j + 1 } else { j - 1 };
                let (lon_c, _) = self.gauss_to_computational(g, here.0, here.1);
                let iin = (normalize_lon(lon_c, 0.0) * rows[jn] as f64 / 360.0).round() as usize % rows[jn];
                let north = point_ll(iin, jn)?;
                Ok((self.distance(here, east) + self.distance(here, north)) / 2.0)
            }
            Grid::Rectangular(_) => {
                let (x, y) = (self.dimensions.x, self.dimensions.y);
                let i = fi.round().clamp(0.0, (x - 1) as f64) as usize;
                let j = fj.round().clamp(0.0, (y - 1) as f64) as usize;
                let here = point_ll(i, j)?;
                let mut distances = Vec::new();
                if x > 1 {
                    let ii = if i + 1 < x { i + 1 } else { i - 1 };
                    distances.push(self.distance(here, point_ll(ii, j)?));
                }
                if y > 1 {
                    let jj = if j + 1 < y { j + 1 } else { j - 1 };
                    distances.push(self.distance(here, point_ll(i, jj)?));
                }
                if distances.is_empty() {
                    return self.nominal_resolution();
                }
                Ok(distances.iter().sum::<f64>() / distances.len() as f64)
            }
            Grid::Unstructured(_) => self.nominal_resolution(),
        }
    }

    /// Is a lon/lat point inside the (non-global) domain?
    pub fn point_is_inside_domain_ll(&self, lon: f64, lat: f64) -> bool {
        if self.is_global() {
            return true;
        }
        match &self.grid {
            Grid::Unstructured(g) => g
                .longitudes
                .iter()
                .zip(&g.latitudes)
                .any(|(plon, plat)| (plon - lon).abs() < 1e-9 && (plat - lat).abs() < 1e-9),
            _ => match self.ll2ij(lon, lat) {
                Ok((i, j)) => self.index_is_inside(i, j),
                Err(_) => false,
            },
        }
    }

    pub(crate) fn index_is_inside(&self, i: f64, j: f64) -> bool {
        let (x, y) = (self.dimensions.x as f64, self.dimensions.y as f64);
        i >= -INDEX_EPSILON
            && i <= x - 1.0 + INDEX_EPSILON
            && j >= -INDEX_EPSILON
            && j <= y - 1.0 + INDEX_EPSILON
    }
}

// ============================================================================
// Derived geometries
// ============================================================================

impl Geometry {
    /// Single-point geometry carrying this geometry's vertical coordinate.
    pub fn make_point_geometry(&self, lon: f64, lat: f64) -> Result<Geometry> {
        let mut g = Geometry::unstructured(vec![lon], vec![lat])?;
        g.vcoordinate = self.vcoordinate.clone();
        g.geoid = self.geoid;
        Ok(g)
    }

    /// Vertical profile geometry at a point; same as [`Geometry::make_point_geometry`].
    pub fn make_profile_geometry(&self, lon: f64, lat: f64) -> Result<Geometry> {
        self.make_point_geometry(lon, lat)
    }

    /// Points equally spaced along the great circle from `end1` to `end2`.
    ///
    /// Without `points_number`, the count is `max(2, round(distance / resolution) + 1)`
    /// with `resolution` defaulting to the grid's nominal resolution.
    pub fn make_section_geometry(
        &self,
        end1: (f64, f64),
        end2: (f64, f64),
        points_number: Option<usize>,
        resolution: Option<f64>,
    ) -> Result<Geometry> {
        if points_number.is_some() && resolution.is_some() {
            return Err(GeometryError::invalid(
                "points_number and resolution are mutually exclusive",
            ));
        }
        let n = match points_number {
            Some(n) if n < 2 => {
                return Err(GeometryError::invalid("a section needs at least 2 points"))
            }
            Some(n) => n,
            None => {
                let resolution = match resolution {
                    Some(r) if r > 0.0 => r,
                    Some(r) => {
                        return Err(GeometryError::invalid(format!("invalid section resolution {}", r)))
                    }
                    None => self.nominal_resolution()?,
                };
                let d = self.distance(end1, end2);
                ((d / resolution).round() as usize + 1).max(2)
            }
        };

        let points = if self.name == GeometryName::Academic {
            (0..n)
                .map(|k| {
                    let t = k as f64 / (n - 1) as f64;
                    (end1.0 + t * (end2.0 - end1.0), end1.1 + t * (end2.1 - end1.1))
                })
                .collect()
        } else {
            projection::great_circle_points(end1, end2, n)
        };
        let (lons, lats): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        let mut g = Geometry::unstructured(lons, lats)?;
        g.vcoordinate = self.vcoordinate.clone();
        g.geoid = self.geoid;
        Ok(g)
    }

    /// Rectangular sub-grid `imin..=imax` x `jmin..=jmax`; zones are dropped.
    pub fn subarray_geometry(&self, imin: usize, imax: usize, jmin: usize, jmax: usize) -> Result<Geometry> {
        let g = self.rectangular_grid()?;
        if imin > imax || jmin > jmax || imax >= self.dimensions.x || jmax >= self.dimensions.y {
            return Err(GeometryError::inconsistent(format!(
                "sub-array [{}..{}]x[{}..{}] of a {}x{} grid",
                imin, imax, jmin, jmax, self.dimensions.x, self.dimensions.y
            )));
        }
        let mut out = self.clone();
        out.dimensions = Dimensions::rectangular(imax - imin + 1, jmax - jmin + 1);
        match &mut out.grid {
            Grid::Rectangular(new) => {
                new.input_position = (
                    g.input_position.0 - imin as f64,
                    g.input_position.1 - jmin as f64,
                );
                new.lamzone = None;
            }
            Grid::Unstructured(u) => {
                let x = self.dimensions.x;
                let keep: Vec<usize> = (jmin..=jmax)
                    .flat_map(|j| (imin..=imax).map(move |i| j * x + i))
                    .collect();
                u.longitudes = keep.iter().map(|k| u.longitudes[*k]).collect();
                u.latitudes = keep.iter().map(|k| u.latitudes[*k]).collect();
            }
            Grid::Gauss(_) => {
                return Err(GeometryError::unsupported("sub-array of a Gaussian grid"));
            }
        }
        Ok(out)
    }

    /// Index box covering a lon/lat box, clamped to the grid.
    pub fn bbox_index_range(&self, bbox: &BoundingBox) -> Result<(usize, usize, usize, usize)> {
        self.rectangular_grid()?;
        let (mut imin, mut jmin) = (f64::INFINITY, f64::INFINITY);
        let (mut imax, mut jmax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        let samples = 20;
        let lonmax = if bbox.crosses_antimeridian() { bbox.lonmax + 360.0 } else { bbox.lonmax };
        let mut edge_points = Vec::with_capacity(4 * (samples + 1));
        for k in 0..=samples {
            let t = k as f64 / samples as f64;
            let lon = bbox.lonmin + t * (lonmax - bbox.lonmin);
            let lat = bbox.latmin + t * (bbox.latmax - bbox.latmin);
            edge_points.push((lon, bbox.latmin));
            edge_points.push((lon, bbox.latmax));
            edge_points.push((bbox.lonmin, lat));
            edge_points.push((lonmax, lat));
        }
        for (lon, lat) in edge_points {
            let (i, j) = self.ll2ij(lon, lat)?;
            imin = imin.min(i);
            imax = imax.max(i);
            jmin = jmin.min(j);
            jmax = jmax.max(j);
        }
        let (x, y) = (self.dimensions.x as f64, self.dimensions.y as f64);
        let imin = (imin - INDEX_EPSILON).ceil().max(0.0);
        let jmin = (jmin - INDEX_EPSILON).ceil().max(0.0);
        let imax = (imax + INDEX_EPSILON).floor().min(x - 1.0);
        let jmax = (jmax + INDEX_EPSILON).floor().min(y - 1.0);
        if imin > imax || jmin > jmax {
            return Err(GeometryError::OutsideDomain {
                lon: bbox.lonmin,
                lat: bbox.latmin,
            });
        }
        Ok((imin as usize, imax as usize, jmin as usize, jmax as usize))
    }

    /// Unstructured geometry made of the given storage-order points.
    pub fn select_points_geometry(&self, indices: &[usize]) -> Result<Geometry> {
        let (lons, lats) = self.get_lonlat_grid(None)?;
        let mut sel_lons = Vec::with_capacity(indices.len());
        let mut sel_lats = Vec::with_capacity(indices.len());
        for k in indices {
            match (lons.get(*k), lats.get(*k)) {
                (Some(lon), Some(lat)) => {
                    sel_lons.push(*lon);
                    sel_lats.push(*lat);
                }
                _ => return Err(GeometryError::inconsistent(format!("point index {} out of grid", k))),
            }
        }
        if sel_lons.is_empty() {
            return Err(GeometryError::inconsistent("empty point selection"));
        }
        let mut g = Geometry::unstructured(sel_lons, sel_lats)?;
        g.vcoordinate = self.vcoordinate.clone();
        g.geoid = self.geoid;
        Ok(g)
    }

    /// Global lon-lat grid whose first column moved `columns` points east.
    pub fn shifted_columns(&self, columns: usize) -> Result<Geometry> {
        if !(self.name == GeometryName::RegularLonlat && self.is_global()) {
            return Err(GeometryError::unsupported(
                "center shift is only defined for global regular lon-lat grids",
            ));
        }
        let mut out = self.clone();
        if let Grid::Rectangular(g) = &mut out.grid {
            g.input_lon = degrees_in_range(g.input_lon + columns as f64 * g.x_resolution);
        }
        Ok(out)
    }
}

fn degrees_in_range(lon: f64) -> f64 {
    normalize_lon(lon, -180.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LamZones;

    fn lonlat_lam() -> Geometry {
        Geometry::regular_lonlat(
            Dimensions::lam(5, 5, LamZones::from_ci(5, 5, 1, 1)),
            RectangularGrid {
                x_resolution: 0.5,
                y_resolution: 0.5,
                input_lon: 2.0,
                input_lat: 45.0,
                input_position: (2.0, 2.0),
                lamzone: Some(Subzone::CI),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_lonlat_ij2ll_roundtrip() {
        let g = lonlat_lam();
        let (lon, lat) = g.ij2ll(0.0, 0.0).unwrap();
        assert!((lon - 1.0).abs() < 1e-12 && (lat - 44.0).abs() < 1e-12);
        let (i, j) = g.ll2ij(lon, lat).unwrap();
        assert!(i.abs() < 1e-9 && j.abs() < 1e-9);
    }

    #[test]
    fn test_corners_containment() {
        let g = lonlat_lam();
        let ci = g.gimme_corners_ij(Some(Subzone::CI)).unwrap();
        let c = g.gimme_corners_ij(Some(Subzone::C)).unwrap();
        assert!(c.is_within(&ci));
        assert_eq!(c.ll, (1, 1));
        assert_eq!(c.ur, (3, 3));
        assert!(g.gimme_corners_ij(Some(Subzone::CIE)).is_err());
    }

    #[test]
    fn test_global_detection() {
        let g = Geometry::regular_lonlat(
            Dimensions::rectangular(8, 5),
            RectangularGrid {
                x_resolution: 45.0,
                y_resolution: -45.0,
                input_lon: 0.0,
                input_lat: 90.0,
                input_position: (0.0, 0.0),
                lamzone: None,
            },
        )
        .unwrap();
        assert!(g.is_global());
        let (i, _) = g.ll2ij(-45.0, 0.0).unwrap();
        assert!((i - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_with_vcoordinate_is_pure() {
        let g = lonlat_lam();
        let v = VCoordinate::single(100, 850.0);
        let g2 = with_vcoordinate(&g, v.clone());
        assert_eq!(g2.vcoordinate, v);
        assert_eq!(g.vcoordinate, VCoordinate::unknown());
        assert!(g.same_horizontal_grid(&g2));
    }

    #[test]
    fn test_section_points_number_default() {
        let g = lonlat_lam();
        let res = g.nominal_resolution().unwrap();
        let end2 = (2.0 + 2.0 * 0.5, 45.0);
        let d = g.distance((2.0, 45.0), end2);
        let s = g.make_section_geometry((2.0, 45.0), end2, None, None).unwrap();
        assert_eq!(s.dimensions.x, ((d / res).round() as usize + 1).max(2));
        assert_eq!(s.dimensions.y, 1);
    }
}
