//! Open modes shared by every resource and archive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MeteoError;

/// How a resource is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpenMode {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "a")]
    Append,
    #[serde(rename = "w")]
    Write,
}

impl OpenMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Append => "a",
            Self::Write => "w",
        }
    }

    /// Fields can be read back.
    pub fn readable(&self) -> bool {
        !matches!(self, Self::Write)
    }

    /// Fields can be written.
    pub fn writable(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = MeteoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(Self::Read),
            "a" | "append" => Ok(Self::Append),
            "w" | "write" => Ok(Self::Write),
            other => Err(MeteoError::invalid_parameter(
                "openmode",
                format!("expected r, a or w, got '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openmode() {
        assert_eq!("a".parse::<OpenMode>().unwrap(), OpenMode::Append);
        assert_eq!("write".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert!("x".parse::<OpenMode>().is_err());
        assert!(!OpenMode::Write.readable());
        assert!(!OpenMode::Read.writable());
    }
}
