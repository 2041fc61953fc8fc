//! Meso-NH netCDF files.
//!
//! Same content as Meso-NH LFI files, stored as netCDF variables: the grid
//! header variables, `DTEXP`/`DTCUR` dates and the fields on `ni`, `nj` and
//! `level` dimensions. A `MASDEV` variable identifies the flavour.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::debug;

use field::{Field, FieldId, FormatFid, GenericFid, GeoField, MiscValue};
use geometry::{Geometry, VCoordinate, VPosition};
use meteo_common::{FieldValidity, FieldValidityList, OpenMode};
use netcdf_parser::{Attribute, NcValues};

use crate::error::{ResourceError, Result};
use crate::field_dict::{field_dict, DictFormat, FieldType};
use crate::formats::mesonh::{self, MesoNhHeader};
use crate::formats::netcdf::{parse_time_units, NcStore};
use crate::resource::{Format, FormatResource};

/// Model version written in new files.
const MASDEV: i64 = 54;

const NI: &str = "ni";
const NJ: &str = "nj";
const LEVEL: &str = "level";

/// Whether a netCDF dataset was written by Meso-NH.
pub fn is_mesonh(path: &Path) -> bool {
    netcdf_parser::read_dataset(path).is_ok_and(|ds| ds.variable("MASDEV").is_some())
}

/// A Meso-NH netCDF file.
#[derive(Debug)]
pub struct MnhResource {
    store: NcStore,
    header: Option<MesoNhHeader>,
    geometry: Option<Geometry>,
    validity: Option<FieldValidityList>,
}

impl MnhResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let store = NcStore::open(path, mode)?;
        let mut resource = Self {
            store,
            header: None,
            geometry: None,
            validity: None,
        };
        if mode.readable() {
            if resource.store.dataset.variable("MASDEV").is_none() {
                return Err(ResourceError::UnknownFormat(format!(
                    "{} has no MASDEV variable",
                    path.display()
                )));
            }
            if resource.store.dataset.variable("IMAX").is_some() {
                let ds = &resource.store.dataset;
                let header = MesoNhHeader::read(|name| Ok(ds.variable(name).map(|v| v.values())))?;
                resource.geometry = Some(header.geometry()?);
                resource.header = Some(header);
            }
            resource.validity = resource.read_validity()?;
        } else {
            resource.store.put_misc("MASDEV", &MiscValue::Int(MASDEV), None)?;
        }
        debug!(
            path = %path.display(),
            mode = %mode.as_str(),
            gridded = resource.geometry.is_some(),
            "Opened Meso-NH netCDF file"
        );
        Ok(resource)
    }

    fn read_date(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(variable) = self.store.dataset.variable(name) else {
            return Ok(None);
        };
        let units = variable
            .attribute("units")
            .and_then(NcValues::as_text)
            .ok_or_else(|| ResourceError::usage(format!("date variable '{}' without units", name)))?;
        let (origin, unit) = parse_time_units(&units)?;
        let offset = variable.data.scalar().unwrap_or(0.0) * unit;
        Ok(Some(origin + Duration::milliseconds((offset * 1000.0).round() as i64)))
    }

    fn read_validity(&self) -> Result<Option<FieldValidityList>> {
        let Some(basis) = self.read_date("DTEXP")? else {
            return Ok(None);
        };
        let current = self.read_date("DTCUR")?.unwrap_or(basis);
        let validity = FieldValidity::from_dates(basis, current).with_cumulativeduration(Duration::zero());
        Ok(Some(FieldValidityList::new(validity)))
    }

    fn put_date(&mut self, name: &str, date: DateTime<Utc>) -> Result<()> {
        let (parts, seconds) = mesonh::date_parts(date);
        let day = match parts.as_slice() {
            [y, m, d, ..] => Utc
                .with_ymd_and_hms(*y as i32, *m as u32, *d as u32, 0, 0, 0)
                .single()
                .ok_or_else(|| ResourceError::usage(format!("invalid date {:?}", parts)))?,
            _ => return Err(ResourceError::usage(format!("invalid date {:?}", parts))),
        };
        let units = format!("seconds since {} +0:00", day.format("%Y-%m-%d %H:%M:%S"));
        let attributes = vec![Attribute {
            name: "units".to_string(),
            value: NcValues::text(&units),
        }];
        self.store.put(name, &[], attributes, NcValues::Double(vec![seconds]))
    }

    /// Header and date variables written with the first gridded field.
    fn write_specials(&mut self, geometry: &Geometry, validity: &FieldValidityList) -> Result<()> {
        let header = MesoNhHeader::from_geometry(geometry)?;
        for (name, value) in header.records() {
            self.store.put_misc(name, &value, None)?;
        }
        let v = validity.single()?;
        let (basis, current) = (v.basis, v.get());
        self.put_date("DTEXP", basis)?;
        self.put_date("DTCUR", current)?;
        self.geometry = Some(header.geometry()?);
        self.header = Some(header);
        self.validity = Some(validity.clone());
        debug!(path = %self.store.path.display(), "Wrote Meso-NH header variables");
        Ok(())
    }

    fn levels_of(&self, name: &str) -> Option<usize> {
        let ds = &self.store.dataset;
        let variable = ds.variable(name)?;
        let dims = ds.dimension_names(variable);
        if !dims.iter().any(|d| d == NI || d == NJ) {
            return None;
        }
        Some(dims.iter().position(|d| d == LEVEL).map_or(1, |k| ds.shape(variable)[k]))
    }

    fn write_geo(&mut self, name: &str, geo: &GeoField) -> Result<()> {
        if geo.is_spectral() {
            return Err(ResourceError::unsupported(format!(
                "'{}': Meso-NH files hold gridpoint fields only",
                name
            )));
        }
        if geo.validity.len() != 1 {
            return Err(ResourceError::usage(format!("'{}': Meso-NH fields hold one validity", name)));
        }
        match &self.geometry {
            None => {
                let (geometry, validity) = (geo.geometry.clone(), geo.validity.clone());
                self.write_specials(&geometry, &validity)?;
            }
            Some(own) if !own.same_horizontal_grid(&geo.geometry) => {
                return Err(ResourceError::usage(format!(
                    "'{}': field geometry differs from the file's ({} {}x{})",
                    name, own.name, own.dimensions.x, own.dimensions.y
                )));
            }
            Some(_) => {}
        }
        let d = &geo.geometry.dimensions;
        self.store.dimension(NI, d.x)?;
        self.store.dimension(NJ, d.y)?;
        let levels = geo.levels_number();
        let mut dims = Vec::new();
        if levels > 1 {
            self.store.dimension(LEVEL, levels)?;
            dims.push(LEVEL);
        }
        dims.extend([NJ, NI]);

        let grid = mesonh::grid_indicator_code(
            geo.geometry.position_on_horizontal_grid,
            geo.geometry.vcoordinate.position_on_grid,
        );
        let mut attributes = vec![Attribute {
            name: "grid".to_string(),
            value: NcValues::Int(vec![grid as i32]),
        }];
        if let Some(comment) = &geo.comment {
            attributes.push(Attribute {
                name: "comment".to_string(),
                value: NcValues::text(comment),
            });
        }
        self.store.put(name, &dims, attributes, NcValues::Double(geo.values().to_vec()))?;
        debug!(field = %name, levels, grid, "Wrote Meso-NH netCDF field");
        Ok(())
    }

    /// Header of the Meso-NH grid, when the file has one.
    pub fn header(&self) -> Option<&MesoNhHeader> {
        self.header.as_ref()
    }
}

impl FormatResource for MnhResource {
    fn format(&self) -> Format {
        Format::NetCdfMnh
    }

    fn path(&self) -> &Path {
        &self.store.path
    }

    fn openmode(&self) -> OpenMode {
        self.store.mode
    }

    fn is_open(&self) -> bool {
        self.store.is_open()
    }

    fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        Ok(self
            .store
            .dataset
            .variables
            .iter()
            .map(|v| FormatFid::Name(v.name.clone()))
            .collect())
    }

    fn field_type(&self, fid: &FormatFid) -> FieldType {
        let Some(name) = fid.as_name() else {
            return FieldType::Misc;
        };
        if mesonh::HEADER_VARIABLES.contains(&name) {
            return FieldType::Misc;
        }
        match self.levels_of(name) {
            None => FieldType::Misc,
            Some(1) => FieldType::H2D,
            Some(_) => FieldType::D3,
        }
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        let name = fid.as_name()?;
        let entry = field_dict(DictFormat::NetCdfMnh).find(name)?;
        let mut g = entry.generic(entry.level.unwrap_or(0.0))?;
        if self.field_type(fid) == FieldType::D3 {
            if let Some(own) = &self.geometry {
                g.type_of_first_fixed_surface = own.vcoordinate.typeoffirstfixedsurface;
            }
        }
        Some(g)
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        self.store.check_readable()?;
        let name = fid
            .as_name()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not a netCDF variable name", fid)))?;
        let field_type = self.field_type(fid);
        if field_type == FieldType::Misc {
            let nature = field_dict(DictFormat::NetCdfMnh).find(name).map(|e| e.nature);
            return Ok(Field::Misc(self.store.read_misc(name, Format::NetCdfMnh, nature)?));
        }
        let own = self
            .geometry
            .as_ref()
            .ok_or_else(|| ResourceError::missing_auxiliary("IMAX", format!("read gridded field '{}'", name)))?;
        let validity = self
            .validity
            .clone()
            .ok_or_else(|| ResourceError::missing_auxiliary("DTCUR", format!("date field '{}'", name)))?;
        let variable = self.store.variable(name)?;
        let grid = variable.attribute("grid").and_then(NcValues::scalar).unwrap_or(0.0) as i64;
        let (hpos, vpos) = mesonh::grid_indicator(grid);
        let mut vcoordinate = match field_type {
            FieldType::D3 => own.vcoordinate.clone(),
            _ => {
                let entry = field_dict(DictFormat::NetCdfMnh).inquire(name);
                VCoordinate::single(entry.type_of_first_fixed_surface, entry.level.unwrap_or(0.0))
            }
        };
        if vpos != VPosition::Unknown {
            vcoordinate.position_on_grid = vpos;
        }
        let geometry = own.with_vcoordinate(vcoordinate).with_position(hpos);

        let mut id = FieldId::named(Format::NetCdfMnh.as_str(), name);
        if let Some(g) = self.generic_fid(fid) {
            id = id.with_generic(g);
        }
        let mut geo = GeoField::new(id, geometry, validity, variable.values())?;
        if let Some(comment) = variable.attribute("comment").and_then(NcValues::as_text) {
            geo = geo.with_comment(comment);
        }
        debug!(field = %name, grid, "Read Meso-NH netCDF field");
        Ok(Field::from_geo(geo))
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        self.store.check_writable()?;
        let name = field
            .fid()
            .get(Format::NetCdfMnh.as_str())
            .and_then(FormatFid::as_name)
            .ok_or_else(|| {
                ResourceError::usage(format!("field '{}' has no netCDFMNH name", field.fid().display_name()))
            })?
            .to_string();
        match field {
            Field::Misc(misc) => self.store.put_misc(&name, &misc.value, misc.comment.as_deref()),
            Field::H2D(geo) | Field::D3(geo) => self.write_geo(&name, geo),
            Field::Vector(_) => Err(ResourceError::usage("write the components of a vector field separately")),
        }
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        self.validity.as_ref()
    }

    fn sortfields(&self) -> Result<BTreeMap<String, Vec<FormatFid>>> {
        let mut groups: BTreeMap<String, Vec<FormatFid>> = BTreeMap::new();
        for fid in self.listfields()? {
            let header = fid
                .as_name()
                .is_some_and(|n| n == "MASDEV" || mesonh::HEADER_VARIABLES.contains(&n));
            let group = match self.field_type(&fid) {
                FieldType::D3 => "3D fields",
                FieldType::H2D => "2D fields",
                FieldType::Misc if header => "Header",
                FieldType::Misc => "Misc-fields",
            };
            groups.entry(group.to_string()).or_default().push(fid);
        }
        Ok(groups)
    }
}

impl Drop for MnhResource {
    fn drop(&mut self) {
        if let Err(e) = self.store.close() {
            tracing::warn!(path = %self.store.path.display(), error = %e, "Failed to close Meso-NH file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::{Dimensions, RectangularGrid};
    use meteo_common::validity::parse_datetime;
    use tempfile::tempdir;

    fn cartesian_geometry() -> Geometry {
        let grid = RectangularGrid {
            x_resolution: 1000.0,
            y_resolution: 1000.0,
            input_lon: 0.0,
            input_lat: 0.0,
            input_position: (0.0, 0.0),
            lamzone: None,
        };
        Geometry::academic(Dimensions::rectangular(6, 5), grid)
            .unwrap()
            .with_vcoordinate(VCoordinate::single(1, 0.0))
    }

    #[test]
    fn test_requires_masdev() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.nc");
        let mut ds = netcdf_parser::Dataset::new();
        ds.put_variable("T", &[], Vec::new(), NcValues::Double(vec![1.0])).unwrap();
        netcdf_parser::write_dataset(&path, &ds, netcdf_parser::ClassicFormat::Classic).unwrap();
        assert!(!is_mesonh(&path));
        assert!(matches!(
            MnhResource::open(&path, OpenMode::Read),
            Err(ResourceError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_field_and_dates_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mnh.nc");
        let basis = parse_datetime("2024-03-01T06:00:00Z").unwrap();
        let validity = FieldValidityList::new(FieldValidity::new(basis, Duration::hours(3)));
        let values: Vec<f64> = (0..30).map(|v| v as f64).collect();
        let geo = GeoField::new(FieldId::named("netCDFMNH", "ZS"), cartesian_geometry(), validity, values.clone())
            .unwrap()
            .with_comment("orography");
        {
            let mut w = MnhResource::open(&path, OpenMode::Write).unwrap();
            w.writefield(&Field::H2D(geo)).unwrap();
            w.close().unwrap();
        }
        let mut r = MnhResource::open(&path, OpenMode::Read).unwrap();
        assert!(r.header().is_some_and(|h| h.cartesian));
        let v = r.validity().unwrap().first().clone();
        assert_eq!(v.basis, basis);
        assert_eq!(v.get(), basis + Duration::hours(3));
        assert_eq!(r.field_type(&FormatFid::name("ZS")), FieldType::H2D);
        assert_eq!(r.field_type(&FormatFid::name("XHAT")), FieldType::Misc);
        let field = r.readfield(&FormatFid::name("ZS")).unwrap();
        let geo = field.as_geo().unwrap();
        assert_eq!(geo.values(), values.as_slice());
        assert_eq!(geo.comment.as_deref(), Some("orography"));
        assert!(r.sortfields().unwrap()["Header"].contains(&FormatFid::name("MASDEV")));
    }
}
