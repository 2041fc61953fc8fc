//! In-memory netCDF dataset: dimensions, attributes and variables.

use crate::error::{NetCdfError, NetCdfResult};

/// External data types of the classic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcType {
    Byte,
    Char,
    Short,
    Int,
    Float,
    Double,
}

impl NcType {
    pub fn code(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Char => 2,
            Self::Short => 3,
            Self::Int => 4,
            Self::Float => 5,
            Self::Double => 6,
        }
    }

    pub fn from_code(code: u32) -> NetCdfResult<Self> {
        Ok(match code {
            1 => Self::Byte,
            2 => Self::Char,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Float,
            6 => Self::Double,
            other => return Err(NetCdfError::invalid_format(format!("unknown nc_type {}", other))),
        })
    }

    /// Size in bytes of one value.
    pub fn size(self) -> usize {
        match self {
            Self::Byte | Self::Char => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// Default fill value of the classic model.
    pub fn default_fill(self) -> f64 {
        match self {
            Self::Byte => -127.0,
            Self::Char => 0.0,
            Self::Short => -32767.0,
            Self::Int => -2147483647.0,
            Self::Float => 9.969_209_968_386_869e36,
            Self::Double => 9.969_209_968_386_869e36,
        }
    }
}

/// Typed values of an attribute or a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum NcValues {
    Byte(Vec<i8>),
    Char(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl NcValues {
    pub fn text(s: &str) -> Self {
        Self::Char(s.as_bytes().to_vec())
    }

    pub fn nc_type(&self) -> NcType {
        match self {
            Self::Byte(_) => NcType::Byte,
            Self::Char(_) => NcType::Char,
            Self::Short(_) => NcType::Short,
            Self::Int(_) => NcType::Int,
            Self::Float(_) => NcType::Float,
            Self::Double(_) => NcType::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Byte(v) => v.len(),
            Self::Char(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values widened to f64; characters are their byte codes.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Self::Byte(v) => v.iter().map(|x| *x as f64).collect(),
            Self::Char(v) => v.iter().map(|x| *x as f64).collect(),
            Self::Short(v) => v.iter().map(|x| *x as f64).collect(),
            Self::Int(v) => v.iter().map(|x| *x as f64).collect(),
            Self::Float(v) => v.iter().map(|x| *x as f64).collect(),
            Self::Double(v) => v.clone(),
        }
    }

    /// First value as f64.
    pub fn scalar(&self) -> Option<f64> {
        self.to_f64().first().copied()
    }

    /// Text of a char array, trailing NULs and blanks removed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Char(v) => Some(
                String::from_utf8_lossy(v)
                    .trim_end_matches(['\0', ' '])
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Values of `nc_type` from f64, rounding integers.
    pub fn from_f64(nc_type: NcType, values: &[f64]) -> Self {
        match nc_type {
            NcType::Byte => Self::Byte(values.iter().map(|x| x.round() as i8).collect()),
            NcType::Char => Self::Char(values.iter().map(|x| x.round() as u8).collect()),
            NcType::Short => Self::Short(values.iter().map(|x| x.round() as i16).collect()),
            NcType::Int => Self::Int(values.iter().map(|x| x.round() as i32).collect()),
            NcType::Float => Self::Float(values.iter().map(|x| *x as f32).collect()),
            NcType::Double => Self::Double(values.to_vec()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub name: String,
    /// Current length; the number of records for the unlimited dimension.
    pub len: usize,
    pub unlimited: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: NcValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Dimension indices, slowest varying first.
    pub dimensions: Vec<usize>,
    pub attributes: Vec<Attribute>,
    pub data: NcValues,
}

impl Variable {
    pub fn nc_type(&self) -> NcType {
        self.data.nc_type()
    }

    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        find_attribute(&self.attributes, name)
    }

    pub fn set_attribute(&mut self, name: &str, value: NcValues) {
        set_attribute(&mut self.attributes, name, value);
    }

    /// Data as f64 with `_FillValue`/`missing_value` points set to NaN and
    /// `scale_factor`/`add_offset` applied.
    pub fn values(&self) -> Vec<f64> {
        let fill = self
            .attribute("_FillValue")
            .or_else(|| self.attribute("missing_value"))
            .and_then(NcValues::scalar);
        let scale = self.attribute("scale_factor").and_then(NcValues::scalar).unwrap_or(1.0);
        let offset = self.attribute("add_offset").and_then(NcValues::scalar).unwrap_or(0.0);
        self.data
            .to_f64()
            .into_iter()
            .map(|v| match fill {
                Some(f) if v == f => f64::NAN,
                _ => v * scale + offset,
            })
            .collect()
    }
}

fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a NcValues> {
    attributes.iter().find(|a| a.name == name).map(|a| &a.value)
}

fn set_attribute(attributes: &mut Vec<Attribute>, name: &str, value: NcValues) {
    match attributes.iter_mut().find(|a| a.name == name) {
        Some(a) => a.value = value,
        None => attributes.push(Attribute {
            name: name.to_string(),
            value,
        }),
    }
}

/// A whole netCDF dataset held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub variables: Vec<Variable>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    pub fn unlimited_dimension(&self) -> Option<usize> {
        self.dimensions.iter().position(|d| d.unlimited)
    }

    /// Number of records along the unlimited dimension.
    pub fn numrecs(&self) -> usize {
        self.unlimited_dimension()
            .map(|i| self.dimensions[i].len)
            .unwrap_or(0)
    }

    /// Add a dimension, or check an existing one has the same length.
    pub fn add_dimension(&mut self, name: &str, len: usize, unlimited: bool) -> NetCdfResult<usize> {
        if let Some(i) = self.dimension_index(name) {
            let d = &self.dimensions[i];
            if d.unlimited != unlimited || (!unlimited && d.len != len) {
                return Err(NetCdfError::Inconsistent(format!(
                    "dimension '{}' already exists with length {}",
                    name, d.len
                )));
            }
            return Ok(i);
        }
        if unlimited && self.unlimited_dimension().is_some() {
            return Err(NetCdfError::Inconsistent(
                "the classic model allows a single unlimited dimension".to_string(),
            ));
        }
        self.dimensions.push(Dimension {
            name: name.to_string(),
            len,
            unlimited,
        });
        Ok(self.dimensions.len() - 1)
    }

    pub fn attribute(&self, name: &str) -> Option<&NcValues> {
        find_attribute(&self.attributes, name)
    }

    pub fn set_attribute(&mut self, name: &str, value: NcValues) {
        set_attribute(&mut self.attributes, name, value);
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    /// Names of the dimensions of a variable.
    pub fn dimension_names(&self, variable: &Variable) -> Vec<String> {
        variable
            .dimensions
            .iter()
            .map(|i| self.dimensions[*i].name.clone())
            .collect()
    }

    pub fn shape(&self, variable: &Variable) -> Vec<usize> {
        variable.dimensions.iter().map(|i| self.dimensions[*i].len).collect()
    }

    /// Whether a variable spans the unlimited dimension.
    pub fn is_record_variable(&self, variable: &Variable) -> bool {
        variable
            .dimensions
            .first()
            .map(|i| self.dimensions[*i].unlimited)
            .unwrap_or(false)
    }

    /// Add or replace a variable defined on named dimensions.
    ///
    /// The data length must match the dimensions; along the unlimited
    /// dimension it sets the number of records.
    pub fn put_variable(
        &mut self,
        name: &str,
        dimensions: &[&str],
        attributes: Vec<Attribute>,
        data: NcValues,
    ) -> NetCdfResult<()> {
        let indices = dimensions
            .iter()
            .map(|d| {
                self.dimension_index(d)
                    .ok_or_else(|| NetCdfError::MissingData(format!("dimension '{}'", d)))
            })
            .collect::<NetCdfResult<Vec<_>>>()?;
        if let Some(pos) = indices.iter().skip(1).position(|i| self.dimensions[*i].unlimited) {
            return Err(NetCdfError::Inconsistent(format!(
                "unlimited dimension of '{}' must come first, found at {}",
                name,
                pos + 1
            )));
        }
        let fixed: usize = indices
            .iter()
            .filter(|i| !self.dimensions[**i].unlimited)
            .map(|i| self.dimensions[*i].len)
            .product();
        let record_dim = indices.first().copied().filter(|i| self.dimensions[*i].unlimited);
        match record_dim {
            Some(r) => {
                if fixed == 0 || data.len() % fixed != 0 {
                    return Err(NetCdfError::Inconsistent(format!(
                        "{} values do not make whole records of {} for '{}'",
                        data.len(),
                        fixed,
                        name
                    )));
                }
                let records = data.len() / fixed;
                let others_exist = self
                    .variables
                    .iter()
                    .any(|v| v.name != name && v.dimensions.first() == Some(&r));
                if others_exist && records != self.dimensions[r].len {
                    return Err(NetCdfError::Inconsistent(format!(
                        "'{}' has {} records, dataset has {}",
                        name, records, self.dimensions[r].len
                    )));
                }
                self.dimensions[r].len = records;
            }
            None => {
                if data.len() != fixed {
                    return Err(NetCdfError::Inconsistent(format!(
                        "{} values for '{}' of shape {:?}",
                        data.len(),
                        name,
                        dimensions
                    )));
                }
            }
        }

        let variable = Variable {
            name: name.to_string(),
            dimensions: indices,
            attributes,
            data,
        };
        match self.variables.iter_mut().find(|v| v.name == name) {
            Some(v) => *v = variable,
            None => self.variables.push(variable),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_apply_fill_and_scaling() {
        let mut var = Variable {
            name: "T".to_string(),
            dimensions: vec![],
            attributes: vec![],
            data: NcValues::Short(vec![10, -1, 20]),
        };
        var.set_attribute("_FillValue", NcValues::Short(vec![-1]));
        var.set_attribute("scale_factor", NcValues::Float(vec![0.5]));
        var.set_attribute("add_offset", NcValues::Double(vec![273.0]));
        let values = var.values();
        assert_eq!(values[0], 278.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 283.0);
    }

    #[test]
    fn test_put_variable_checks_shape() {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 0, true).unwrap();
        ds.add_dimension("X", 3, false).unwrap();
        assert!(ds.add_dimension("X", 4, false).is_err());
        assert!(ds.add_dimension("T2", 0, true).is_err());

        ds.put_variable("a", &["time", "X"], vec![], NcValues::Double(vec![0.0; 6]))
            .unwrap();
        assert_eq!(ds.numrecs(), 2);
        assert!(ds
            .put_variable("b", &["time", "X"], vec![], NcValues::Double(vec![0.0; 9]))
            .is_err());
        assert!(ds
            .put_variable("c", &["X", "time"], vec![], NcValues::Double(vec![0.0; 6]))
            .is_err());
        assert!(ds.put_variable("d", &["X"], vec![], NcValues::Int(vec![1, 2])).is_err());
        assert_eq!(NcValues::text("abc\0\0").as_text().unwrap(), "abc");
    }
}
