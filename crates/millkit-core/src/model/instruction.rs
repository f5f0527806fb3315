//! Motion program instructions
//!
//! An [`Instruction`] is a tagged variant plus an optional source line and
//! trailing comment. Move targets are always resolved absolute positions in
//! the unit system active at that point of the program; relative words are
//! resolved by the parser and re-derived by the emitter.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{ArcDirection, Plane, Position};
use crate::units::Units;

use super::modal::DistanceMode;

/// Modal motion mode (G0, G1, G2, G3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MotionMode {
    #[default]
    Rapid,
    Linear,
    ArcClockwise,
    ArcCounterClockwise,
}

impl MotionMode {
    pub fn gcode(self) -> u8 {
        match self {
            Self::Rapid => 0,
            Self::Linear => 1,
            Self::ArcClockwise => 2,
            Self::ArcCounterClockwise => 3,
        }
    }

    pub fn from_gcode(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Rapid),
            1 => Some(Self::Linear),
            2 => Some(Self::ArcClockwise),
            3 => Some(Self::ArcCounterClockwise),
            _ => None,
        }
    }

    /// Arc direction for the arc modes.
    pub fn arc_direction(self) -> Option<ArcDirection> {
        match self {
            Self::ArcClockwise => Some(ArcDirection::Clockwise),
            Self::ArcCounterClockwise => Some(ArcDirection::CounterClockwise),
            _ => None,
        }
    }
}

/// How a move travels to its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotionKind {
    Rapid,
    Linear,
    /// Circular or helical arc; `center` is the offset from the move start.
    Arc {
        direction: ArcDirection,
        center: Position,
    },
}

impl MotionKind {
    pub fn mode(&self) -> MotionMode {
        match self {
            Self::Rapid => MotionMode::Rapid,
            Self::Linear => MotionMode::Linear,
            Self::Arc {
                direction: ArcDirection::Clockwise,
                ..
            } => MotionMode::ArcClockwise,
            Self::Arc {
                direction: ArcDirection::CounterClockwise,
                ..
            } => MotionMode::ArcCounterClockwise,
        }
    }

    pub fn is_rapid(&self) -> bool {
        matches!(self, Self::Rapid)
    }

    pub fn is_arc(&self) -> bool {
        matches!(self, Self::Arc { .. })
    }
}

/// A single motion to an absolute target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub target: Position,
    pub motion: MotionKind,
    /// Feed word given with the move, if any.
    pub feed: Option<f64>,
}

impl Move {
    /// Whether the move cuts (anything but a rapid).
    pub fn is_feed_move(&self) -> bool {
        !self.motion.is_rapid()
    }
}

/// Spindle rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpindleDirection {
    #[default]
    Off,
    /// M3
    Clockwise,
    /// M4
    CounterClockwise,
}

/// Spindle on/off state with speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SpindleState {
    pub direction: SpindleDirection,
    /// Speed in RPM; retained while the spindle is off.
    pub speed: f64,
}

impl SpindleState {
    pub fn on(direction: SpindleDirection, speed: f64) -> Self {
        Self { direction, speed }
    }

    pub fn off(speed: f64) -> Self {
        Self {
            direction: SpindleDirection::Off,
            speed,
        }
    }

    pub fn is_on(&self) -> bool {
        self.direction != SpindleDirection::Off
    }
}

/// Laser power mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LaserMode {
    /// Constant power (M3)
    #[default]
    Constant,
    /// Power scaled with speed (M4)
    Dynamic,
}

/// Laser on/off state with power in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct LaserState {
    pub enabled: bool,
    /// Power in percent of the device maximum, `0..=100`
    pub power_percent: f64,
    pub mode: LaserMode,
}

impl LaserState {
    pub fn on(power_percent: f64, mode: LaserMode) -> Self {
        Self {
            enabled: true,
            power_percent,
            mode,
        }
    }

    /// Laser off, keeping the last power setting.
    pub fn off(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }
}

/// Modal word that appears without motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModalChange {
    Units(Units),
    Plane(Plane),
    Distance(DistanceMode),
    Motion(MotionMode),
    Feed(f64),
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    Move(Move),
    ToolChange { tool: u32 },
    Spindle(SpindleState),
    Laser(LaserState),
    Dwell { seconds: f64 },
    Comment(String),
    /// Line kept verbatim because it is outside the recognized subset.
    RawPassthrough(String),
    Modal(ModalChange),
    /// M2 (`rewind == false`) or M30
    ProgramEnd { rewind: bool },
}

/// One step of a motion program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    /// 1-based source line this instruction came from.
    pub line_number: Option<u32>,
    /// Trailing comment carried along with the instruction.
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Self {
            kind,
            line_number: None,
            comment: None,
        }
    }

    pub fn rapid(target: Position) -> Self {
        Self::new(InstructionKind::Move(Move {
            target,
            motion: MotionKind::Rapid,
            feed: None,
        }))
    }

    pub fn linear(target: Position, feed: Option<f64>) -> Self {
        Self::new(InstructionKind::Move(Move {
            target,
            motion: MotionKind::Linear,
            feed,
        }))
    }

    pub fn arc(
        target: Position,
        direction: ArcDirection,
        center: Position,
        feed: Option<f64>,
    ) -> Self {
        Self::new(InstructionKind::Move(Move {
            target,
            motion: MotionKind::Arc { direction, center },
            feed,
        }))
    }

    pub fn modal(change: ModalChange) -> Self {
        Self::new(InstructionKind::Modal(change))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(InstructionKind::Comment(text.into()))
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(InstructionKind::RawPassthrough(text.into()))
    }

    pub fn with_line(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Same line and comment, new payload.
    pub fn with_kind(&self, kind: InstructionKind) -> Self {
        Self {
            kind,
            line_number: self.line_number,
            comment: self.comment.clone(),
        }
    }

    /// Same line and comment, new move.
    pub fn with_move(&self, mv: Move) -> Self {
        self.with_kind(InstructionKind::Move(mv))
    }

    pub fn as_move(&self) -> Option<&Move> {
        match &self.kind {
            InstructionKind::Move(mv) => Some(mv),
            _ => None,
        }
    }

    pub fn is_move(&self) -> bool {
        self.as_move().is_some()
    }

    /// Short name of the variant, used in logs.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            InstructionKind::Move(_) => "move",
            InstructionKind::ToolChange { .. } => "tool_change",
            InstructionKind::Spindle(_) => "spindle",
            InstructionKind::Laser(_) => "laser",
            InstructionKind::Dwell { .. } => "dwell",
            InstructionKind::Comment(_) => "comment",
            InstructionKind::RawPassthrough(_) => "raw",
            InstructionKind::Modal(_) => "modal",
            InstructionKind::ProgramEnd { .. } => "program_end",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstructionKind::Move(mv) => {
                write!(f, "G{} -> {}", mv.motion.mode().gcode(), mv.target)
            }
            InstructionKind::ToolChange { tool } => write!(f, "T{}", tool),
            InstructionKind::Spindle(s) => write!(f, "spindle {:?} S{}", s.direction, s.speed),
            InstructionKind::Laser(l) => write!(
                f,
                "laser {} {:.1}%",
                if l.enabled { "on" } else { "off" },
                l.power_percent
            ),
            InstructionKind::Dwell { seconds } => write!(f, "dwell {}s", seconds),
            InstructionKind::Comment(text) => write!(f, "({})", text),
            InstructionKind::RawPassthrough(text) => write!(f, "raw `{}`", text),
            InstructionKind::Modal(change) => write!(f, "modal {:?}", change),
            InstructionKind::ProgramEnd { rewind } => {
                write!(f, "{}", if *rewind { "M30" } else { "M2" })
            }
        }?;
        if let Some(line) = self.line_number {
            write!(f, " @{}", line)?;
        }
        Ok(())
    }
}
