use core::str::FromStr;
use serde::{Deserialize, Serialize};

use bodega_core::DomainError;

/// Unit of measure a stock level is counted in.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    #[default]
    Bottle,
    Box,
}

impl Unit {
    /// Storage representation (`BOTTLE` / `BOX`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Bottle => "BOTTLE",
            Unit::Box => "BOX",
        }
    }
}

impl core::fmt::Display for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOTTLE" => Ok(Unit::Bottle),
            "BOX" => Ok(Unit::Box),
            other => Err(DomainError::validation(format!(
                "unknown unit '{other}' (expected BOTTLE or BOX)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("bottle".parse::<Unit>().unwrap(), Unit::Bottle);
        assert_eq!(" BOX ".parse::<Unit>().unwrap(), Unit::Box);
        assert!("crate".parse::<Unit>().is_err());
    }

    #[test]
    fn defaults_to_bottle() {
        assert_eq!(Unit::default(), Unit::Bottle);
        assert_eq!(Unit::default().to_string(), "BOTTLE");
    }
}
