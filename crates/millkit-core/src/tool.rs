//! Cutting tool definitions
//!
//! A [`Tool`] is an immutable value. Operations share it through
//! `Arc<Tool>` so one tool can serve many operations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::units::Units;

/// Tool types for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
pub enum ToolType {
    /// Flat end mill
    #[default]
    EndMillFlat,
    /// Ball end mill / ball nose
    EndMillBall,
    /// Drill bit (twist drill)
    DrillBit,
    /// Laser beam; the diameter is the kerf width
    LaserBeam,
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndMillFlat => write!(f, "Flat End Mill"),
            Self::EndMillBall => write!(f, "Ball End Mill"),
            Self::DrillBit => write!(f, "Drill Bit"),
            Self::LaserBeam => write!(f, "Laser Beam"),
        }
    }
}

/// Cutting tool geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool number (T word)
    pub number: u32,
    pub name: String,
    pub tool_type: ToolType,
    /// Cutting diameter
    pub diameter: f64,
    /// Stick-out length
    pub length: f64,
    pub flutes: Option<u32>,
    /// Preferred axial depth per pass
    pub stepdown: Option<f64>,
    /// Preferred radial engagement per pass
    pub stepover: Option<f64>,
    pub units: Units,
}

impl Tool {
    /// Create a tool, rejecting non-positive or non-finite dimensions.
    pub fn new(
        number: u32,
        name: impl Into<String>,
        tool_type: ToolType,
        diameter: f64,
        length: f64,
        units: Units,
    ) -> Result<Self> {
        if !(diameter.is_finite() && diameter > 0.0) {
            return Err(Error::invalid_parameter(
                "diameter",
                format!("tool diameter must be > 0, got {}", diameter),
            ));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::invalid_parameter(
                "length",
                format!("tool length must be > 0, got {}", length),
            ));
        }
        Ok(Self {
            number,
            name: name.into(),
            tool_type,
            diameter,
            length,
            flutes: None,
            stepdown: None,
            stepover: None,
            units,
        })
    }

    /// Flat end mill named after its dimensions.
    pub fn flat_end_mill(diameter: f64, length: f64, units: Units) -> Result<Self> {
        let name = format!("{} (d={}, L={})", ToolType::EndMillFlat, diameter, length);
        Self::new(1, name, ToolType::EndMillFlat, diameter, length, units)
    }

    /// Twist drill named after its dimensions.
    pub fn drill(diameter: f64, length: f64, units: Units) -> Result<Self> {
        let name = format!("{} (d={}, L={})", ToolType::DrillBit, diameter, length);
        Self::new(1, name, ToolType::DrillBit, diameter, length, units)
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = number;
        self
    }

    pub fn with_flutes(mut self, flutes: u32) -> Self {
        self.flutes = Some(flutes);
        self
    }

    pub fn with_stepdown(mut self, stepdown: f64) -> Self {
        self.stepdown = Some(stepdown);
        self
    }

    pub fn with_stepover(mut self, stepover: f64) -> Self {
        self.stepover = Some(stepover);
        self
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{} {} [{}]", self.number, self.name, self.units)
    }
}
