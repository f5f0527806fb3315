//! Modal state tracking
//!
//! [`ModalState`] is the running context threaded through parsing, emission
//! and replay. It is a small `Copy` value; nothing in millkit keeps modal
//! state anywhere else.

use serde::{Deserialize, Serialize};

use crate::geometry::{Plane, Position};
use crate::units::Units;

use super::instruction::{
    Instruction, InstructionKind, LaserState, ModalChange, MotionMode, SpindleState,
};

/// Distance mode (G90 absolute, G91 relative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DistanceMode {
    #[default]
    Absolute,
    Relative,
}

impl DistanceMode {
    pub fn gcode(self) -> u8 {
        match self {
            Self::Absolute => 90,
            Self::Relative => 91,
        }
    }

    pub fn from_gcode(code: u8) -> Option<Self> {
        match code {
            90 => Some(Self::Absolute),
            91 => Some(Self::Relative),
            _ => None,
        }
    }
}

/// Running modal context of a motion program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ModalState {
    /// Units group (G20/G21)
    pub units: Units,
    /// Plane selection (G17/G18/G19)
    pub plane: Plane,
    /// Distance mode (G90/G91)
    pub distance_mode: DistanceMode,
    /// Motion group (G0-G3)
    pub motion: MotionMode,
    /// Last F word, in `units` per minute
    pub feed_rate: Option<f64>,
    pub spindle: SpindleState,
    pub laser: LaserState,
    /// Active tool number
    pub tool: Option<u32>,
    /// Last commanded absolute position, in `units`
    pub position: Position,
}

impl ModalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default state in the given unit system.
    pub fn with_units(units: Units) -> Self {
        Self {
            units,
            ..Self::default()
        }
    }

    /// Advance the state past one instruction.
    pub fn apply(&mut self, instruction: &Instruction) {
        match &instruction.kind {
            InstructionKind::Move(mv) => {
                self.position = mv.target;
                self.motion = mv.motion.mode();
                if let Some(feed) = mv.feed {
                    self.feed_rate = Some(feed);
                }
            }
            InstructionKind::ToolChange { tool } => self.tool = Some(*tool),
            InstructionKind::Spindle(spindle) => self.spindle = *spindle,
            InstructionKind::Laser(laser) => self.laser = *laser,
            InstructionKind::Modal(change) => self.apply_change(*change),
            InstructionKind::Dwell { .. }
            | InstructionKind::Comment(_)
            | InstructionKind::RawPassthrough(_)
            | InstructionKind::ProgramEnd { .. } => {}
        }
    }

    /// State after `instruction`, leaving `self` untouched.
    pub fn after(&self, instruction: &Instruction) -> Self {
        let mut next = *self;
        next.apply(instruction);
        next
    }

    pub fn apply_change(&mut self, change: ModalChange) {
        match change {
            ModalChange::Units(units) => self.convert_units(units),
            ModalChange::Plane(plane) => self.plane = plane,
            ModalChange::Distance(mode) => self.distance_mode = mode,
            ModalChange::Motion(mode) => self.motion = mode,
            ModalChange::Feed(feed) => self.feed_rate = Some(feed),
        }
    }

    /// Switch unit system, re-expressing position and feed in the new units.
    pub fn convert_units(&mut self, units: Units) {
        if units == self.units {
            return;
        }
        self.position = self.position.convert(self.units, units);
        self.feed_rate = self.feed_rate.map(|f| self.units.convert(f, units));
        self.units = units;
    }

    /// Compare two states, allowing `tolerance` on position and feed.
    pub fn approx_eq(&self, other: &ModalState, tolerance: f64) -> bool {
        let feed_matches = match (self.feed_rate, other.feed_rate) {
            (Some(a), Some(b)) => (a - b).abs() <= tolerance,
            (None, None) => true,
            _ => false,
        };
        self.units == other.units
            && self.plane == other.plane
            && self.distance_mode == other.distance_mode
            && self.motion == other.motion
            && feed_matches
            && self.spindle.direction == other.spindle.direction
            && (self.spindle.speed - other.spindle.speed).abs() <= tolerance
            && self.laser.enabled == other.laser.enabled
            && self.laser.mode == other.laser.mode
            && (self.laser.power_percent - other.laser.power_percent).abs() <= tolerance
            && self.tool == other.tool
            && self.position.approx_eq(other.position, tolerance)
    }
}
