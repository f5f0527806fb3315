//! Error handling for millkit
//!
//! Provides the error taxonomy shared by every layer:
//! - Parse errors (line-scoped, collected rather than raised)
//! - Geometry errors (undefined path direction, degenerate arcs)
//! - Feature errors (tool too large, unreachable or unsupported features)
//! - Unit mismatches between tagged values
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::geometry::Position;
use crate::units::Units;

/// Malformed numeric or instruction syntax on a single line.
///
/// Parse errors are collected next to the best-effort program instead of
/// aborting the parse.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Parse error at line {line_number}: {reason} (`{line}`)")]
pub struct ParseError {
    /// 1-based source line number.
    pub line_number: u32,
    /// The offending line as read.
    pub line: String,
    /// What was wrong with it.
    pub reason: String,
}

impl ParseError {
    pub fn new(line_number: u32, line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line_number,
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// Geometry error type
///
/// Raised by transform passes and arc resolution when a path cannot be
/// processed as requested.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A segment has no direction.
    #[error("Undefined path direction at instruction {index}: zero-length segment at {at}")]
    ZeroLengthSegment {
        /// Index of the offending instruction.
        index: usize,
        /// Location of the coincident points.
        at: Position,
    },

    /// Arc with zero radius or inconsistent end point.
    #[error("Degenerate arc at instruction {index}: {reason}")]
    DegenerateArc {
        /// Index of the offending instruction.
        index: usize,
        /// Description of the defect.
        reason: String,
    },

    /// Non-uniform scaling would turn an arc into an ellipse.
    #[error("Arc at instruction {index} cannot be scaled by {first} and {second} in its plane")]
    NonUniformArcScale {
        /// Index of the offending instruction.
        index: usize,
        /// Scale factor along the first in-plane axis.
        first: f64,
        /// Scale factor along the second in-plane axis.
        second: f64,
    },

    /// Rotation moves an arc out of its plane.
    #[error("Arc at instruction {index} does not stay in its plane under rotation")]
    ArcPlaneNotPreserved {
        /// Index of the offending instruction.
        index: usize,
    },

    /// Offsetting an arc by the tool radius leaves no arc.
    #[error(
        "Compensation collapses arc at instruction {index}: radius {radius} with tool radius {tool_radius}"
    )]
    CompensationCollapse {
        /// Index of the offending instruction.
        index: usize,
        /// Programmed arc radius.
        radius: f64,
        /// Tool radius used for the offset.
        tool_radius: f64,
    },

    /// Transform parameters are unusable.
    #[error("Invalid transform: {reason}")]
    InvalidTransform {
        /// Why the transform was rejected.
        reason: String,
    },
}

/// Tool does not fit the feature it is asked to cut.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "Tool diameter {tool_diameter} exceeds feature '{feature_id}' diameter {feature_diameter}"
)]
pub struct ToolTooLargeError {
    pub feature_id: String,
    pub tool_diameter: f64,
    pub feature_diameter: f64,
}

/// Feature lies outside the stock.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Feature '{feature_id}' at {point} lies outside stock {stock_min}..{stock_max}")]
pub struct UnreachableFeatureError {
    pub feature_id: String,
    /// First feature point found outside the stock.
    pub point: Position,
    pub stock_min: Position,
    pub stock_max: Position,
}

/// Feature kind the extractor refuses to approximate.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unsupported feature '{feature_id}' ({kind}): {reason}")]
pub struct UnsupportedFeatureError {
    pub feature_id: String,
    pub kind: String,
    pub reason: String,
}

/// Two tagged values disagree on their unit system.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unit mismatch in {context}: expected {expected}, found {found}")]
pub struct UnitMismatchError {
    /// What was being checked.
    pub context: String,
    pub expected: Units,
    pub found: Units,
}

/// Main error type for millkit
///
/// A unified error type that can represent any failure from the core layers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Line-scoped syntax error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Geometry error
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Tool larger than the feature
    #[error(transparent)]
    ToolTooLarge(#[from] ToolTooLargeError),

    /// Feature outside the stock
    #[error(transparent)]
    UnreachableFeature(#[from] UnreachableFeatureError),

    /// Feature kind not supported
    #[error(transparent)]
    UnsupportedFeature(#[from] UnsupportedFeatureError),

    /// Unit systems disagree
    #[error(transparent)]
    UnitMismatch(#[from] UnitMismatchError),

    /// Feed move with no active feed rate
    #[error("No feed rate active for instruction {index} (line {line_number:?})")]
    MissingFeedRate {
        /// Index of the move in the program.
        index: usize,
        /// Source line, when known.
        line_number: Option<u32>,
    },

    /// Parameter outside its valid domain
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl Error {
    /// Create an invalid-parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a geometry error
    pub fn is_geometry_error(&self) -> bool {
        matches!(self, Error::Geometry(_))
    }

    /// Check if this is a unit mismatch
    pub fn is_unit_mismatch(&self) -> bool {
        matches!(self, Error::UnitMismatch(_))
    }

    /// Check if this is an unsupported-feature error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedFeature(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(12, "G1 X1.2.3", "invalid number '1.2.3' for X");
        assert_eq!(
            err.to_string(),
            "Parse error at line 12: invalid number '1.2.3' for X (`G1 X1.2.3`)"
        );
    }

    #[test]
    fn test_tool_too_large_display() {
        let err = ToolTooLargeError {
            feature_id: "hole-1".to_string(),
            tool_diameter: 10.0,
            feature_diameter: 8.0,
        };
        assert_eq!(
            err.to_string(),
            "Tool diameter 10 exceeds feature 'hole-1' diameter 8"
        );
    }

    #[test]
    fn test_unit_mismatch_display() {
        let err = UnitMismatchError {
            context: "stock".to_string(),
            expected: Units::Millimeters,
            found: Units::Inches,
        };
        assert_eq!(err.to_string(), "Unit mismatch in stock: expected mm, found in");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = GeometryError::ZeroLengthSegment {
            index: 3,
            at: Position::ZERO,
        }
        .into();
        assert!(err.is_geometry_error());
        assert!(!err.is_unsupported());

        let err: Error = UnsupportedFeatureError {
            feature_id: "w".to_string(),
            kind: "curved wire".to_string(),
            reason: "not linear".to_string(),
        }
        .into();
        assert!(err.is_unsupported());
    }
}
