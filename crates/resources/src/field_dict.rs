//! Field dictionaries: native field names to generic identifiers.
//!
//! A dictionary is a `;`-separated table. The first non-comment line is
//! the merge policy of the file, the second the column headers:
//!
//! ```text
//! main
//! name;type;nature;dimension;typeOfFirstFixedSurface;level;discipline;parameterCategory;parameterNumber;typeOfStatisticalProcessing;productDefinitionTemplateNumber
//! S*TEMPERATURE;H2D;float;2;119;;0;0;0;;
//! ```
//!
//! Names are shell-style patterns. Built-in tables are compiled in; a user
//! table `$CONFIG_DIR/field_dicts/<format>.csv` is merged on top of them
//! according to its policy. Each format's table is loaded once per process.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, error, warn};

use field::GenericFid;
use meteo_common::config::field_dicts_dir;
use meteo_common::constants::surface;

use crate::error::{ResourceError, Result};
use crate::glob::Glob;

const FA_DICT: &str = include_str!("../data/Field_Dict_FA.csv");
const LFI_DICT: &str = include_str!("../data/Field_Dict_LFI.csv");
const MNH_DICT: &str = include_str!("../data/Field_Dict_netCDFMNH.csv");

static FA_TABLE: OnceLock<FieldDict> = OnceLock::new();
static LFI_TABLE: OnceLock<FieldDict> = OnceLock::new();
static MNH_TABLE: OnceLock<FieldDict> = OnceLock::new();

// ============================================================================
// Entries
// ============================================================================

/// Kind of field a name stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Misc,
    H2D,
    D3,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Misc => "Misc",
            Self::H2D => "H2D",
            Self::D3 => "3D",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Misc" => Ok(Self::Misc),
            "H2D" => Ok(Self::H2D),
            "3D" => Ok(Self::D3),
            other => Err(ResourceError::usage(format!("unknown field type '{}'", other))),
        }
    }
}

/// Type of the values of a Misc field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nature {
    Float,
    Int,
    Bool,
    Str,
}

impl FromStr for Nature {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float" => Ok(Self::Float),
            "int" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "str" => Ok(Self::Str),
            other => Err(ResourceError::usage(format!("unknown field nature '{}'", other))),
        }
    }
}

/// One row of a field dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    pub pattern: Glob,
    pub field_type: FieldType,
    pub nature: Nature,
    /// Number of dimensions of the values (0 for scalars).
    pub dimension: usize,
    pub type_of_first_fixed_surface: u16,
    /// Fixed level; when absent the level is derived from the name.
    pub level: Option<f64>,
    pub discipline: Option<u8>,
    pub parameter_category: Option<u8>,
    pub parameter_number: Option<u8>,
    pub type_of_statistical_processing: Option<u8>,
    pub product_definition_template_number: Option<u8>,
}

impl DictEntry {
    /// Classification of names the dictionary does not know.
    pub fn fallback(name: &str) -> Self {
        Self {
            pattern: Glob::new(name),
            field_type: FieldType::Misc,
            nature: Nature::Float,
            dimension: 1,
            type_of_first_fixed_surface: surface::UNKNOWN,
            level: None,
            discipline: None,
            parameter_category: None,
            parameter_number: None,
            type_of_statistical_processing: None,
            product_definition_template_number: None,
        }
    }

    /// Generic identifier at `level`, when the row carries parameter codes.
    pub fn generic(&self, level: f64) -> Option<GenericFid> {
        let mut g = GenericFid::new(
            self.discipline?,
            self.parameter_category?,
            self.parameter_number?,
        )
        .at_level(self.type_of_first_fixed_surface, self.level.unwrap_or(level));
        g.product_definition_template_number = self.product_definition_template_number;
        g.type_of_statistical_processing = self.type_of_statistical_processing;
        Some(g)
    }

    fn parse(line: &str, columns: &[String]) -> Result<Self> {
        let cells: Vec<&str> = line.split(';').map(str::trim).collect();
        let cell = |key: &str| -> Option<&str> {
            columns
                .iter()
                .position(|c| c == key)
                .and_then(|i| cells.get(i).copied())
                .filter(|s| !s.is_empty())
        };
        let number = |key: &str| -> Result<Option<f64>> {
            cell(key)
                .map(|s| {
                    s.parse::<f64>().map_err(|_| {
                        ResourceError::usage(format!("'{}' is not a number in column {}", s, key))
                    })
                })
                .transpose()
        };
        let code = |key: &str| -> Result<Option<u8>> {
            Ok(number(key)?.map(|v| v as u8))
        };
        let name = cell("name")
            .ok_or_else(|| ResourceError::usage(format!("dictionary row without name: '{}'", line)))?;
        Ok(Self {
            pattern: Glob::new(name),
            field_type: cell("type").unwrap_or("Misc").parse()?,
            nature: cell("nature").unwrap_or("float").parse()?,
            dimension: number("dimension")?.map_or(1, |d| d as usize),
            type_of_first_fixed_surface: number("typeOfFirstFixedSurface")?
                .map_or(surface::UNKNOWN, |v| v as u16),
            level: number("level")?,
            discipline: code("discipline")?,
            parameter_category: code("parameterCategory")?,
            parameter_number: code("parameterNumber")?,
            type_of_statistical_processing: code("typeOfStatisticalProcessing")?,
            product_definition_template_number: code("productDefinitionTemplateNumber")?,
        })
    }
}

// ============================================================================
// Tables
// ============================================================================

/// How a user table combines with the built-in one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The user table replaces the built-in one.
    Main,
    /// User rows only fill names the built-in table lacks.
    Underwrite,
    /// User rows replace built-in rows of the same name and take precedence.
    Overwrite,
}

impl FromStr for MergePolicy {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "main" => Ok(Self::Main),
            "underwrite" => Ok(Self::Underwrite),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(ResourceError::usage(format!("unknown dictionary policy '{}'", other))),
        }
    }
}

/// Ordered dictionary; a literal name wins over patterns, then first match wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDict {
    entries: Vec<DictEntry>,
}

impl FieldDict {
    /// Parse a table and its policy line.
    pub fn parse(text: &str) -> Result<(MergePolicy, Self)> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));
        let policy: MergePolicy = lines
            .next()
            .ok_or_else(|| ResourceError::usage("empty field dictionary"))?
            .parse()?;
        let columns: Vec<String> = lines
            .next()
            .ok_or_else(|| ResourceError::usage("field dictionary without header"))?
            .split(';')
            .map(|c| c.trim().to_string())
            .collect();
        let entries = lines
            .map(|l| DictEntry::parse(l, &columns))
            .collect::<Result<Vec<_>>>()?;
        Ok((policy, Self { entries }))
    }

    pub fn entries(&self) -> &[DictEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine `user` into this table according to `policy`.
    pub fn merge(self, user: FieldDict, policy: MergePolicy) -> FieldDict {
        match policy {
            MergePolicy::Main => user,
            MergePolicy::Underwrite => {
                let mut entries = self.entries;
                for e in user.entries {
                    if !entries.iter().any(|d| d.pattern == e.pattern) {
                        entries.push(e);
                    }
                }
                FieldDict { entries }
            }
            MergePolicy::Overwrite => {
                let mut entries = user.entries;
                for d in self.entries {
                    if !entries.iter().any(|e| e.pattern == d.pattern) {
                        entries.push(d);
                    }
                }
                FieldDict { entries }
            }
        }
    }

    /// First entry, in table order, whose pattern matches `name`.
    pub fn find(&self, name: &str) -> Option<&DictEntry> {
        self.entries.iter().find(|e| e.pattern.matches(name))
    }

    /// Entry for `name`, or the Misc/float fallback with a warning.
    pub fn inquire(&self, name: &str) -> DictEntry {
        match self.find(name) {
            Some(e) => e.clone(),
            None => {
                warn!(field = %name, "Field missing from dictionary, classified as Misc");
                DictEntry::fallback(name)
            }
        }
    }

    /// Built-in table merged with the user table found in `dir`, if any.
    pub fn load(format: &str, builtin: &str, dir: &Path) -> Result<FieldDict> {
        let (_, base) = FieldDict::parse(builtin)?;
        let user_path = dir.join(format!("{}.csv", format));
        if !user_path.exists() {
            return Ok(base);
        }
        let text = fs::read_to_string(&user_path)?;
        let (policy, user) = FieldDict::parse(&text).map_err(|e| {
            error!(path = %user_path.display(), error = %e, "Invalid user field dictionary");
            e
        })?;
        debug!(
            format = %format,
            path = %user_path.display(),
            policy = ?policy,
            entries = user.len(),
            "Merging user field dictionary"
        );
        Ok(base.merge(user, policy))
    }
}

/// Formats with a field dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictFormat {
    Fa,
    Lfi,
    NetCdfMnh,
}

impl DictFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fa => "FA",
            Self::Lfi => "LFI",
            Self::NetCdfMnh => "netCDFMNH",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Self::Fa => FA_DICT,
            Self::Lfi => LFI_DICT,
            Self::NetCdfMnh => MNH_DICT,
        }
    }

    fn cell(&self) -> &'static OnceLock<FieldDict> {
        match self {
            Self::Fa => &FA_TABLE,
            Self::Lfi => &LFI_TABLE,
            Self::NetCdfMnh => &MNH_TABLE,
        }
    }
}

/// Process-wide dictionary of a format, loaded on first use.
///
/// An unreadable user table is logged and ignored in favour of the
/// built-in one.
pub fn field_dict(format: DictFormat) -> &'static FieldDict {
    format.cell().get_or_init(|| {
        match FieldDict::load(format.as_str(), format.builtin(), &field_dicts_dir()) {
            Ok(d) => d,
            Err(e) => {
                error!(format = %format.as_str(), error = %e, "Falling back to built-in field dictionary");
                FieldDict::parse(format.builtin())
                    .map(|(_, d)| d)
                    .unwrap_or_default()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "name;type;nature;dimension;typeOfFirstFixedSurface;level;discipline;parameterCategory;parameterNumber";

    fn table(policy: &str, rows: &[&str]) -> String {
        format!("{}\n{}\n{}\n", policy, HEADER, rows.join("\n"))
    }

    #[test]
    fn test_builtin_tables_parse() {
        for text in [FA_DICT, LFI_DICT, MNH_DICT] {
            let (policy, dict) = FieldDict::parse(text).unwrap();
            assert_eq!(policy, MergePolicy::Main);
            assert!(!dict.is_empty());
        }
    }

    #[test]
    fn test_first_match_in_table_order() {
        let (_, dict) = FieldDict::parse(&table(
            "main",
            &["S001TEMPERATURE;H2D;float;2;119;;0;0;0", "S*;H2D;float;2;119;;0;0;1"],
        ))
        .unwrap();
        assert_eq!(dict.find("S001TEMPERATURE").unwrap().parameter_number, Some(0));
        assert_eq!(dict.find("S001HUMI").unwrap().parameter_number, Some(1));

        let (_, reversed) = FieldDict::parse(&table(
            "main",
            &["S*;H2D;float;2;119;;0;0;1", "S001TEMPERATURE;H2D;float;2;119;;0;0;0"],
        ))
        .unwrap();
        assert_eq!(reversed.find("S001TEMPERATURE").unwrap().parameter_number, Some(1));
    }

    #[test]
    fn test_underwrite_literal_does_not_shadow_default_pattern() {
        let (_, defaults) = FieldDict::parse(&table("main", &["S*TEMPERATURE;H2D;float;2;119;;0;0;0"])).unwrap();
        let (policy, user) =
            FieldDict::parse(&table("underwrite", &["S001TEMPERATURE;H2D;float;2;119;;0;0;5"])).unwrap();
        let merged = defaults.merge(user, policy);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.find("S001TEMPERATURE").unwrap().parameter_number, Some(0));
    }

    #[test]
    fn test_fallback_is_misc() {
        let (_, dict) = FieldDict::parse(&table("main", &["A;H2D;float;2;1;;0;0;0"])).unwrap();
        let e = dict.inquire("UNKNOWN");
        assert_eq!(e.field_type, FieldType::Misc);
        assert_eq!(e.nature, Nature::Float);
        assert_eq!(e.dimension, 1);
        assert!(e.generic(0.0).is_none());
    }

    #[test]
    fn test_generic_takes_fixed_level() {
        let (_, dict) = FieldDict::parse(&table("main", &["CLSTEMPERATURE;H2D;float;2;103;2;0;0;0"])).unwrap();
        let g = dict.find("CLSTEMPERATURE").unwrap().generic(255.0).unwrap();
        assert_eq!(g.type_of_first_fixed_surface, 103);
        assert_eq!(g.level, 2.0);
    }

    #[test]
    fn test_bad_policy() {
        assert!(FieldDict::parse(&table("sideways", &[])).is_err());
    }
}
