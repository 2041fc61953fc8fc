//! Field identifiers.
//!
//! A field is named once per format it has been read from or written to,
//! plus an optional format-independent generic identifier built on GRIB2
//! keys (discipline, category, number, surface, level).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key under which the generic identifier is exchanged with formats.
pub const GENERIC: &str = "generic";

/// Per-format identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatFid {
    /// A record or variable name (FA, LFA, netCDF).
    Name(String),
    /// An LFI record name plus its time index.
    Record { name: String, time: i64 },
    /// A map of keys (GRIB).
    Keys(BTreeMap<String, Value>),
}

impl FormatFid {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// The plain name, if this identifier has one.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) | Self::Record { name: n, .. } => Some(n),
            Self::Keys(_) => None,
        }
    }

    pub fn as_keys(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Keys(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for FormatFid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(n) => f.write_str(n),
            Self::Record { name, time: 0 } => f.write_str(name),
            Self::Record { name, time } => write!(f, "{}:{}", name, time),
            Self::Keys(k) => f.write_str(&compact_keys(k)),
        }
    }
}

/// Compact JSON text of a key map, e.g. `{"discipline":0,"level":850}`.
pub fn compact_keys(keys: &BTreeMap<String, Value>) -> String {
    serde_json::to_string(keys).unwrap_or_default()
}

/// Format-independent identifier (GRIB2 semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericFid {
    pub discipline: u8,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub type_of_first_fixed_surface: u16,
    pub level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_definition_template_number: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_statistical_processing: Option<u8>,
}

impl GenericFid {
    pub fn new(discipline: u8, parameter_category: u8, parameter_number: u8) -> Self {
        Self {
            discipline,
            parameter_category,
            parameter_number,
            type_of_first_fixed_surface: 255,
            level: 0.0,
            product_definition_template_number: None,
            type_of_statistical_processing: None,
        }
    }

    pub fn at_level(mut self, type_of_first_fixed_surface: u16, level: f64) -> Self {
        self.type_of_first_fixed_surface = type_of_first_fixed_surface;
        self.level = level;
        self
    }

    /// GRIB2 key map of this identifier.
    pub fn to_keys(&self) -> BTreeMap<String, Value> {
        let mut keys = BTreeMap::new();
        keys.insert("discipline".to_string(), Value::from(self.discipline));
        keys.insert("parameterCategory".to_string(), Value::from(self.parameter_category));
        keys.insert("parameterNumber".to_string(), Value::from(self.parameter_number));
        keys.insert(
            "typeOfFirstFixedSurface".to_string(),
            Value::from(self.type_of_first_fixed_surface),
        );
        keys.insert("level".to_string(), number(self.level));
        if let Some(t) = self.product_definition_template_number {
            keys.insert("productDefinitionTemplateNumber".to_string(), Value::from(t));
        }
        if let Some(t) = self.type_of_statistical_processing {
            keys.insert("typeOfStatisticalProcessing".to_string(), Value::from(t));
        }
        keys
    }

    /// Identifier from a GRIB2 key map; None if a mandatory key is missing.
    pub fn from_keys(keys: &BTreeMap<String, Value>) -> Option<Self> {
        let uint = |k: &str| keys.get(k).and_then(Value::as_u64);
        Some(Self {
            discipline: u8::try_from(uint("discipline")?).ok()?,
            parameter_category: u8::try_from(uint("parameterCategory")?).ok()?,
            parameter_number: u8::try_from(uint("parameterNumber")?).ok()?,
            type_of_first_fixed_surface: u16::try_from(uint("typeOfFirstFixedSurface")?).ok()?,
            level: keys.get("level").and_then(Value::as_f64).unwrap_or(0.0),
            product_definition_template_number: uint("productDefinitionTemplateNumber")
                .and_then(|v| u8::try_from(v).ok()),
            type_of_statistical_processing: uint("typeOfStatisticalProcessing")
                .and_then(|v| u8::try_from(v).ok()),
        })
    }
}

/// Integral values as JSON integers, others as floats.
fn number(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        Value::from(v as i64)
    } else {
        Value::from(v)
    }
}

/// Identifier of a field: one entry per format, plus the generic one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldId {
    pub formats: BTreeMap<String, FormatFid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<GenericFid>,
}

impl FieldId {
    /// Identifier known under one format.
    pub fn new(format: impl Into<String>, fid: FormatFid) -> Self {
        let mut formats = BTreeMap::new();
        formats.insert(format.into(), fid);
        Self {
            formats,
            generic: None,
        }
    }

    /// Identifier made of a name under one format.
    pub fn named(format: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(format, FormatFid::Name(name.into()))
    }

    pub fn with(mut self, format: impl Into<String>, fid: FormatFid) -> Self {
        self.formats.insert(format.into(), fid);
        self
    }

    pub fn with_generic(mut self, generic: GenericFid) -> Self {
        self.generic = Some(generic);
        self
    }

    pub fn get(&self, format: &str) -> Option<&FormatFid> {
        self.formats.get(format)
    }

    pub fn insert(&mut self, format: impl Into<String>, fid: FormatFid) {
        self.formats.insert(format.into(), fid);
    }

    /// Short name for messages: the first per-format entry, else the generic one.
    pub fn display_name(&self) -> String {
        if let Some(fid) = self.formats.values().next() {
            return fid.to_string();
        }
        match &self.generic {
            Some(g) => compact_keys(&g.to_keys()),
            None => "anonymous".to_string(),
        }
    }

    /// Same identifier with every per-format name rewritten by `f`.
    pub fn decorated(&self, f: impl Fn(&str) -> String) -> FieldId {
        let formats = self
            .formats
            .iter()
            .map(|(format, fid)| (format.clone(), FormatFid::Name(f(&fid.to_string()))))
            .collect();
        FieldId {
            formats,
            generic: None,
        }
    }

    /// Symbolic identifier of `self <op> other`, e.g. `(A+B)` for each format.
    ///
    /// The generic identifier does not survive an operation.
    pub fn compose(&self, op: char, other: &str) -> FieldId {
        let mut formats = BTreeMap::new();
        for (format, fid) in &self.formats {
            formats.insert(format.clone(), FormatFid::Name(format!("({}{}{})", fid, op, other)));
        }
        if formats.is_empty() {
            formats.insert(
                GENERIC.to_string(),
                FormatFid::Name(format!("({}{}{})", self.display_name(), op, other)),
            );
        }
        FieldId {
            formats,
            generic: None,
        }
    }

    /// Symbolic identifier of an operation between two fields.
    ///
    /// Formats known to both combine their own names; the others use the
    /// other field's display name.
    pub fn compose_with(&self, op: char, other: &FieldId) -> FieldId {
        let mut out = self.compose(op, &other.display_name());
        for (format, fid) in &self.formats {
            if let Some(o) = other.formats.get(format) {
                out.formats
                    .insert(format.clone(), FormatFid::Name(format!("({}{}{})", fid, op, o)));
            }
        }
        out
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_keys_roundtrip() {
        let g = GenericFid::new(0, 0, 0).at_level(100, 850.0);
        let keys = g.to_keys();
        assert_eq!(keys["level"], Value::from(850));
        assert_eq!(GenericFid::from_keys(&keys), Some(g));
        assert_eq!(
            compact_keys(&keys),
            r#"{"discipline":0,"level":850,"parameterCategory":0,"parameterNumber":0,"typeOfFirstFixedSurface":100}"#
        );
    }

    #[test]
    fn test_compose() {
        let a = FieldId::named("FA", "S090TEMPERATURE");
        let b = FieldId::named("FA", "S090HUMI.SPECIFI").with("netCDF", FormatFid::name("q"));
        let sum = a.compose_with('+', &b);
        assert_eq!(
            sum.get("FA"),
            Some(&FormatFid::name("(S090TEMPERATURE+S090HUMI.SPECIFI)"))
        );
        assert_eq!(a.compose('*', "2").display_name(), "(S090TEMPERATURE*2)");
    }

    #[test]
    fn test_record_display() {
        assert_eq!(FormatFid::Record { name: "UT".into(), time: 0 }.to_string(), "UT");
        assert_eq!(FormatFid::Record { name: "UT".into(), time: 3 }.to_string(), "UT:3");
    }
}
