//! Feed, speed and power passes

use serde::{Deserialize, Serialize};

use millkit_core::{
    Error, Instruction, InstructionKind, ModalChange, ModalState, MotionProgram, Result, EPSILON,
};

use crate::pipeline::{apply_streaming, Pass};

/// Scales every feed word by a percentage, clamped to optional bounds
#[derive(Debug, Clone)]
pub struct FeedOverride {
    percent: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl FeedOverride {
    /// Create a new feed override; `percent` must be positive
    pub fn new(percent: f64) -> Result<Self> {
        if !percent.is_finite() || percent <= 0.0 {
            return Err(Error::invalid_parameter(
                "percent",
                format!("feed override must be positive, got {}", percent),
            ));
        }
        Ok(Self {
            percent,
            min: None,
            max: None,
        })
    }

    /// Clamp overridden feeds to `[min, max]`
    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        if let Some(min) = min {
            if !min.is_finite() || min <= 0.0 {
                return Err(Error::invalid_parameter("min", "minimum feed must be positive"));
            }
        }
        if let (Some(min), Some(max)) = (min, max) {
            if max < min {
                return Err(Error::invalid_parameter(
                    "max",
                    format!("maximum feed {} is below minimum {}", max, min),
                ));
            }
        }
        self.min = min;
        self.max = max;
        Ok(self)
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    fn is_identity(&self) -> bool {
        self.percent == 100.0 && self.min.is_none() && self.max.is_none()
    }

    fn adjust(&self, feed: f64) -> f64 {
        let mut value = feed * self.percent / 100.0;
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        value
    }
}

impl Pass for FeedOverride {
    fn name(&self) -> &str {
        "feed_override"
    }

    fn description(&self) -> &str {
        "Scales feed rates by a percentage"
    }

    fn transform(
        &self,
        _index: usize,
        instruction: &Instruction,
        _state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        let out = match &instruction.kind {
            InstructionKind::Move(mv) if mv.feed.is_some() => {
                let mut mv = *mv;
                mv.feed = mv.feed.map(|f| self.adjust(f));
                instruction.with_move(mv)
            }
            InstructionKind::Modal(ModalChange::Feed(f)) => {
                instruction.with_kind(InstructionKind::Modal(ModalChange::Feed(self.adjust(*f))))
            }
            _ => instruction.clone(),
        };
        Ok(vec![out])
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        if self.is_identity() {
            return Ok(program.clone());
        }
        let transformed = apply_streaming(self, program)?;
        let mut start = *program.start_state();
        start.feed_rate = start.feed_rate.map(|f| self.adjust(f));
        Ok(MotionProgram::new(start, transformed.into_instructions()))
    }
}

/// Which value a [`ReplaceValue`] pass rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTarget {
    /// F words
    Feed,
    /// Spindle S words
    SpindleSpeed,
    /// Laser power in percent
    LaserPower,
}

/// Replaces one specific feed, speed or power value with another
#[derive(Debug, Clone)]
pub struct ReplaceValue {
    target: ValueTarget,
    from: f64,
    to: f64,
}

impl ReplaceValue {
    /// Create a new replace pass
    pub fn new(target: ValueTarget, from: f64, to: f64) -> Result<Self> {
        if !from.is_finite() || !to.is_finite() || to < 0.0 {
            return Err(Error::invalid_parameter(
                "to",
                format!("cannot replace {} with {}", from, to),
            ));
        }
        if target == ValueTarget::Feed && to <= 0.0 {
            return Err(Error::invalid_parameter("to", "feed rate must be positive"));
        }
        Ok(Self { target, from, to })
    }

    fn replace(&self, value: f64) -> f64 {
        let scale = value.abs().max(self.from.abs());
        if (value - self.from).abs() <= 1e-9 * scale || value == self.from {
            self.to
        } else {
            value
        }
    }
}

impl Pass for ReplaceValue {
    fn name(&self) -> &str {
        "replace_value"
    }

    fn description(&self) -> &str {
        "Replaces a specific feed, spindle speed or laser power value"
    }

    fn transform(
        &self,
        _index: usize,
        instruction: &Instruction,
        _state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        let out = match (&instruction.kind, self.target) {
            (InstructionKind::Move(mv), ValueTarget::Feed) => {
                let mut mv = *mv;
                mv.feed = mv.feed.map(|f| self.replace(f));
                instruction.with_move(mv)
            }
            (InstructionKind::Modal(ModalChange::Feed(f)), ValueTarget::Feed) => instruction
                .with_kind(InstructionKind::Modal(ModalChange::Feed(self.replace(*f)))),
            (InstructionKind::Spindle(spindle), ValueTarget::SpindleSpeed) => {
                let mut spindle = *spindle;
                spindle.speed = self.replace(spindle.speed);
                instruction.with_kind(InstructionKind::Spindle(spindle))
            }
            (InstructionKind::Laser(laser), ValueTarget::LaserPower) => {
                let mut laser = *laser;
                laser.power_percent = self.replace(laser.power_percent);
                instruction.with_kind(InstructionKind::Laser(laser))
            }
            _ => instruction.clone(),
        };
        Ok(vec![out])
    }
}

/// Gives feed moves above the retract height a fast positioning feed
///
/// CAM output often links cuts with G1 moves at clearance height. Those
/// moves get `positioning_feed`; every other feed move gets its effective
/// feed written out so the faster feed does not leak into the cut.
#[derive(Debug, Clone)]
pub struct PositioningSpeedFix {
    retract_height: f64,
    positioning_feed: f64,
}

impl PositioningSpeedFix {
    /// Create a new positioning speed pass
    pub fn new(retract_height: f64, positioning_feed: f64) -> Result<Self> {
        if !retract_height.is_finite() {
            return Err(Error::invalid_parameter("retract_height", "must be finite"));
        }
        if !positioning_feed.is_finite() || positioning_feed <= 0.0 {
            return Err(Error::invalid_parameter(
                "positioning_feed",
                format!("must be positive, got {}", positioning_feed),
            ));
        }
        Ok(Self {
            retract_height,
            positioning_feed,
        })
    }
}

impl Pass for PositioningSpeedFix {
    fn name(&self) -> &str {
        "positioning_speed_fix"
    }

    fn description(&self) -> &str {
        "Uses a positioning feed for feed moves above the retract height"
    }

    fn transform(
        &self,
        _index: usize,
        instruction: &Instruction,
        state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        let InstructionKind::Move(mv) = &instruction.kind else {
            return Ok(vec![instruction.clone()]);
        };
        if !mv.is_feed_move() {
            return Ok(vec![instruction.clone()]);
        }

        let above = |z: f64| z >= self.retract_height - EPSILON;
        let mut out = *mv;
        if above(state.position.z) && above(mv.target.z) {
            out.feed = Some(self.positioning_feed);
        } else {
            out.feed = mv.feed.or(state.feed_rate);
        }
        Ok(vec![instruction.with_move(out)])
    }
}
