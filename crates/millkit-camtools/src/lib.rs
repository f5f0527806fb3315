//! # millkit CAM tools
//!
//! Machining operations compiled from part features, and parametric test
//! patterns.
//!
//! ## Operations
//!
//! - **Bore**: plunge, peck or helical boring of vertical holes
//! - **Face**: serpentine facing of the stock top down to a given height
//!
//! ## Test patterns
//!
//! - Grid, spiral and raster strokes for spindle or laser heads
//! - Speed/power matrices and focus ladders for laser calibration

pub mod error;
pub mod feature;
pub mod operation;
pub mod patterns;

pub use error::{CamToolError, CamToolResult, ParameterError, ParameterResult};
pub use feature::{BoreFeature, FaceFeature, Feature, FeatureKind};
pub use operation::{compile_bores, select_bores, Operation, OperationKind, OperationParams};
pub use patterns::{MachineLimits, PatternGenerator, PatternHead, PatternKind, PatternSpec};
