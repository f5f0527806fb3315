//! # millkit core
//!
//! Core types for millkit: the motion model, units, geometry primitives,
//! tools, stock and the shared error taxonomy. Pure data and invariants; no
//! I/O happens here.

pub mod error;
pub mod geometry;
pub mod model;
pub mod stock;
pub mod tool;
pub mod units;

pub use error::{
    Error, GeometryError, ParseError, Result, ToolTooLargeError, UnitMismatchError,
    UnreachableFeatureError, UnsupportedFeatureError,
};
pub use geometry::{
    Anchor, ArcDirection, ArcGeometry, Axis, BoundingBox, Plane, Position, EPSILON,
    MAX_ARC_SEGMENTS,
};
pub use model::{
    DistanceMode, Instruction, InstructionKind, LaserMode, LaserState, ModalChange, ModalState,
    Move, MotionKind, MotionMode, MotionProgram, ProgramBuilder, Replay, ReplayStep,
    SpindleDirection, SpindleState,
};
pub use stock::StockVolume;
pub use tool::{Tool, ToolType};
pub use units::Units;
