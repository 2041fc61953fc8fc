//! Fields without a geographical geometry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fid::FieldId;

/// Shape metadata of a misc field: named dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscGeometry {
    pub dimensions: Vec<(String, usize)>,
}

impl MiscGeometry {
    pub fn scalar() -> Self {
        Self::default()
    }

    /// One-dimensional array of `len` values.
    pub fn array(len: usize) -> Self {
        Self {
            dimensions: vec![("N".to_string(), len)],
        }
    }

    pub fn size(&self) -> usize {
        self.dimensions.iter().map(|(_, n)| *n).product()
    }

    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Value of a misc field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MiscValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
    BoolArray(Vec<bool>),
    StrArray(Vec<String>),
}

impl MiscValue {
    /// Element type: `int`, `float`, `bool` or `str`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) | Self::IntArray(_) => "int",
            Self::Float(_) | Self::FloatArray(_) => "float",
            Self::Bool(_) | Self::BoolArray(_) => "bool",
            Self::Str(_) | Self::StrArray(_) => "str",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Str(_) => 1,
            Self::IntArray(v) => v.len(),
            Self::FloatArray(v) => v.len(),
            Self::BoolArray(v) => v.len(),
            Self::StrArray(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::Bool(_) | Self::Str(_))
    }

    /// Numeric values as floats; None for strings.
    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        Some(match self {
            Self::Int(v) => vec![*v as f64],
            Self::Float(v) => vec![*v],
            Self::Bool(v) => vec![f64::from(u8::from(*v))],
            Self::IntArray(v) => v.iter().map(|x| *x as f64).collect(),
            Self::FloatArray(v) => v.clone(),
            Self::BoolArray(v) => v.iter().map(|x| f64::from(u8::from(*x))).collect(),
            Self::Str(_) | Self::StrArray(_) => return None,
        })
    }
}

impl fmt::Display for MiscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 6;
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &[T]) -> fmt::Result {
            let head: Vec<String> = v.iter().take(SHOWN).map(|x| x.to_string()).collect();
            if v.len() > SHOWN {
                write!(f, "[{}, ... ({} values)]", head.join(", "), v.len())
            } else {
                write!(f, "[{}]", head.join(", "))
            }
        }
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "'{}'", v),
            Self::IntArray(v) => list(f, v),
            Self::FloatArray(v) => list(f, v),
            Self::BoolArray(v) => list(f, v),
            Self::StrArray(v) => list(f, v),
        }
    }
}

/// A field holding a scalar or an array, with no geography attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiscField {
    pub fid: FieldId,
    pub geometry: MiscGeometry,
    #[serde(default)]
    pub comment: Option<String>,
    pub value: MiscValue,
}

impl MiscField {
    /// Misc field whose geometry follows the value's shape.
    pub fn new(fid: FieldId, value: MiscValue) -> Self {
        let geometry = if value.is_scalar() {
            MiscGeometry::scalar()
        } else {
            MiscGeometry::array(value.len())
        };
        Self {
            fid,
            geometry,
            comment: None,
            value,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn what(&self) -> String {
        format!(
            "{}: Misc {} {} = {}",
            self.fid,
            self.value.type_name(),
            if self.geometry.is_scalar() {
                "scalar".to_string()
            } else {
                format!("{:?}", self.geometry.dimensions)
            },
            self.value
        )
    }
}
