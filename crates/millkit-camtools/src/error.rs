//! Error types for the CAM tools crate.
//!
//! This module provides structured error types for operation compilation,
//! parameter validation and pattern generation.

use thiserror::Error;

use millkit_core::{
    ToolTooLargeError, UnitMismatchError, UnreachableFeatureError, UnsupportedFeatureError,
};

/// Errors that can occur during CAM tool operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CamToolError {
    /// A parameter validation error occurred.
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    /// The tool does not fit the feature.
    #[error(transparent)]
    ToolTooLarge(#[from] ToolTooLargeError),

    /// The feature lies outside the stock.
    #[error(transparent)]
    Unreachable(#[from] UnreachableFeatureError),

    /// The feature kind cannot be machined.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFeatureError),

    /// Tool, stock, feature or limits disagree on units.
    #[error(transparent)]
    UnitMismatch(#[from] UnitMismatchError),

    /// No feature qualified for the operation.
    #[error("No features to machine: {0}")]
    NoFeatures(String),

    /// Error raised by the motion model or a transform pass.
    #[error(transparent)]
    Core(millkit_core::Error),
}

impl From<millkit_core::Error> for CamToolError {
    fn from(err: millkit_core::Error) -> Self {
        use millkit_core::Error;
        match err {
            Error::ToolTooLarge(e) => Self::ToolTooLarge(e),
            Error::UnreachableFeature(e) => Self::Unreachable(e),
            Error::UnsupportedFeature(e) => Self::Unsupported(e),
            Error::UnitMismatch(e) => Self::UnitMismatch(e),
            other => Self::Core(other),
        }
    }
}

impl CamToolError {
    pub fn is_tool_too_large(&self) -> bool {
        matches!(self, Self::ToolTooLarge(_))
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    pub fn is_unit_mismatch(&self) -> bool {
        matches!(self, Self::UnitMismatch(_))
    }

    pub fn is_parameter_error(&self) -> bool {
        matches!(self, Self::Parameter(_))
    }
}

/// Errors related to CAM tool parameter validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A required parameter is missing.
    #[error("Missing required parameter: {0}")]
    Missing(String),

    /// A parameter value is out of the valid range.
    #[error("Parameter '{name}' out of range: {value} (valid: {min}..{max})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A parameter value is invalid.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Parameters contradict each other.
    #[error("Inconsistent parameters: {0}")]
    Inconsistent(String),
}

impl ParameterError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(name: &str, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        }
    }
}

/// Require `value > 0`.
pub(crate) fn ensure_positive(name: &str, value: f64) -> ParameterResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParameterError::invalid(name, format!("must be > 0, got {}", value)))
    }
}

/// Require `value >= 0`.
pub(crate) fn ensure_non_negative(name: &str, value: f64) -> ParameterResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParameterError::invalid(name, format!("must be >= 0, got {}", value)))
    }
}

/// Result type alias for CAM tool operations.
pub type CamToolResult<T> = Result<T, CamToolError>;

/// Result type alias for parameter validation.
pub type ParameterResult<T> = Result<T, ParameterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::{GeometryError, Units};

    #[test]
    fn test_parameter_error_display() {
        let err = ParameterError::OutOfRange {
            name: "feed".to_string(),
            value: 9000.0,
            min: 0.0,
            max: 5000.0,
        };
        assert_eq!(
            err.to_string(),
            "Parameter 'feed' out of range: 9000 (valid: 0..5000)"
        );

        let err = ParameterError::Missing("spacing".to_string());
        assert_eq!(err.to_string(), "Missing required parameter: spacing");
    }

    #[test]
    fn test_core_errors_keep_their_kind() {
        let core: millkit_core::Error = UnitMismatchError {
            context: "tool".to_string(),
            expected: Units::Millimeters,
            found: Units::Inches,
        }
        .into();
        assert!(CamToolError::from(core).is_unit_mismatch());

        let core: millkit_core::Error = GeometryError::InvalidTransform {
            reason: "nope".to_string(),
        }
        .into();
        assert!(matches!(CamToolError::from(core), CamToolError::Core(_)));
    }

    #[test]
    fn test_ensure_helpers() {
        assert!(ensure_positive("doc", 0.3).is_ok());
        assert!(ensure_positive("doc", 0.0).is_err());
        assert!(ensure_positive("doc", f64::NAN).is_err());
        assert!(ensure_non_negative("leave", 0.0).is_ok());
        assert!(ensure_non_negative("leave", -0.1).is_err());
    }
}
