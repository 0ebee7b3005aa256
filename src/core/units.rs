//! Storage-size units and exact power-of-1024 conversion.
//!
//! All capacity comparisons happen in [`CANONICAL_UNIT`] (TB). Conversions
//! scale by `1024^n` through `f64::powi`, which is exact for powers of two, so
//! converting there and back returns the original magnitude up to ordinary
//! double rounding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{EngineError, EngineResult};

/// Unit every pool's `allocated` counter is expressed in.
pub const CANONICAL_UNIT: SizeUnit = SizeUnit::Tb;

/// Absolute slack (in TB, roughly one byte) used when comparing accumulated
/// floating-point amounts.
pub const TOLERANCE_TB: f64 = 1e-12;

/// Supported storage-size units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeUnit {
    /// Kilobytes (1024 bytes).
    #[serde(rename = "KB", alias = "kb")]
    Kb,
    /// Megabytes (1024 KB).
    #[serde(rename = "MB", alias = "mb")]
    Mb,
    /// Gigabytes (1024 MB).
    #[serde(rename = "GB", alias = "gb")]
    Gb,
    /// Terabytes (1024 GB).
    #[serde(rename = "TB", alias = "tb")]
    Tb,
}

impl SizeUnit {
    /// Every supported unit, smallest first.
    pub const ALL: [Self; 4] = [Self::Kb, Self::Mb, Self::Gb, Self::Tb];

    /// Power of 1024 relative to KB.
    const fn exponent(self) -> i32 {
        match self {
            Self::Kb => 0,
            Self::Mb => 1,
            Self::Gb => 2,
            Self::Tb => 3,
        }
    }

    /// Short upper-case symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Kb => "KB",
            Self::Mb => "MB",
            Self::Gb => "GB",
            Self::Tb => "TB",
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for SizeUnit {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KB" => Ok(Self::Kb),
            "MB" => Ok(Self::Mb),
            "GB" => Ok(Self::Gb),
            "TB" => Ok(Self::Tb),
            other => Err(EngineError::UnitConversion(format!(
                "unrecognized unit `{other}` (expected KB, MB, GB or TB)"
            ))),
        }
    }
}

/// Convert `magnitude` between two units.
#[must_use]
pub fn convert(magnitude: f64, from: SizeUnit, to: SizeUnit) -> f64 {
    let shift = from.exponent() - to.exponent();
    magnitude * 1024_f64.powi(shift)
}

/// Convert using unit names, failing on unrecognized names.
///
/// # Errors
///
/// Returns [`EngineError::UnitConversion`] if either unit is unknown.
pub fn convert_named(magnitude: f64, from: &str, to: &str) -> EngineResult<f64> {
    let from = from.parse::<SizeUnit>()?;
    let to = to.parse::<SizeUnit>()?;
    Ok(convert(magnitude, from, to))
}

/// A magnitude paired with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    /// Amount in `unit`.
    pub magnitude: f64,
    /// Unit of `magnitude`.
    pub unit: SizeUnit,
}

impl Capacity {
    /// Build a capacity value.
    #[must_use]
    pub const fn new(magnitude: f64, unit: SizeUnit) -> Self {
        Self { magnitude, unit }
    }

    /// Amount expressed in the canonical unit.
    #[must_use]
    pub fn to_canonical(self) -> f64 {
        convert(self.magnitude, self.unit, CANONICAL_UNIT)
    }

    /// Amount expressed in `unit`.
    #[must_use]
    pub fn in_unit(self, unit: SizeUnit) -> f64 {
        convert(self.magnitude, self.unit, unit)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit)
    }
}
