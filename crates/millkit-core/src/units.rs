//! Unit handling
//!
//! Every geometric value in millkit carries an explicit [`Units`] tag. Values
//! are converted only on request; mixing tags is reported as a
//! [`UnitMismatchError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnitMismatchError;

/// Millimeters per inch.
pub const MM_PER_INCH: f64 = 25.4;

/// Length unit system of a program, tool, stock or pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Millimeters (G21)
    #[default]
    #[serde(alias = "mm")]
    Millimeters,
    /// Inches (G20)
    #[serde(alias = "in", alias = "inch")]
    Inches,
}

impl Units {
    /// G-code number that selects this unit system.
    pub fn gcode(self) -> u8 {
        match self {
            Self::Millimeters => 21,
            Self::Inches => 20,
        }
    }

    /// Look up a unit system from its G-code number.
    pub fn from_gcode(code: u8) -> Option<Self> {
        match code {
            21 => Some(Self::Millimeters),
            20 => Some(Self::Inches),
            _ => None,
        }
    }

    /// Short label ("mm" or "in")
    pub fn label(self) -> &'static str {
        match self {
            Self::Millimeters => "mm",
            Self::Inches => "in",
        }
    }

    /// Multiplier that converts a value in `self` into `target`.
    pub fn factor_to(self, target: Units) -> f64 {
        match (self, target) {
            (Self::Millimeters, Self::Inches) => 1.0 / MM_PER_INCH,
            (Self::Inches, Self::Millimeters) => MM_PER_INCH,
            _ => 1.0,
        }
    }

    /// Convert a length expressed in `self` into `target`.
    pub fn convert(self, value: f64, target: Units) -> f64 {
        if self == target {
            value
        } else {
            value * self.factor_to(target)
        }
    }

    /// Fail unless `other` uses the same unit system.
    ///
    /// `context` names the value being checked and ends up in the error.
    pub fn ensure_matches(
        self,
        other: Units,
        context: impl Into<String>,
    ) -> Result<(), UnitMismatchError> {
        if self == other {
            Ok(())
        } else {
            Err(UnitMismatchError {
                context: context.into(),
                expected: self,
                found: other,
            })
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" | "millimeters" | "metric" | "g21" => Ok(Self::Millimeters),
            "in" | "inch" | "inches" | "imperial" | "g20" => Ok(Self::Inches),
            _ => Err(format!("Unknown unit system: {}", s)),
        }
    }
}

/// Format a length with its unit label, three decimals.
pub fn format_length(value: f64, units: Units) -> String {
    format!("{:.3} {}", value, units.label())
}

/// Format a feed rate as units per minute, one decimal.
pub fn format_feed_rate(value: f64, units: Units) -> String {
    format!("{:.1} {}/min", value, units.label())
}
