//! Test pattern generators
//!
//! Grids, spirals, rasters and laser calibration matrices, produced as
//! lazy instruction streams. Every move target stays inside the pattern
//! bounds in XY.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use millkit_core::{
    BoundingBox, DistanceMode, Instruction, InstructionKind, LaserMode, LaserState, ModalChange,
    ModalState, MotionProgram, Position, SpindleDirection, SpindleState, Units, EPSILON,
};

use crate::error::{ensure_non_negative, ensure_positive, CamToolResult, ParameterError};

/// Chords per spiral revolution
const SPIRAL_SEGMENTS_PER_TURN: f64 = 72.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    /// Lines along X at every spacing step in Y, then lines along Y
    Grid { spacing: f64 },
    /// Archimedean spiral from the bounds centre
    Spiral { pitch: f64 },
    /// Serpentine fill along X
    Raster { spacing: f64 },
    /// Square cells with one feed per row and one power per column
    SpeedPowerGrid {
        feeds: Vec<f64>,
        powers: Vec<f64>,
        cell: f64,
        gap: f64,
    },
    /// One line per Z height
    FocusLines {
        z_values: Vec<f64>,
        length: f64,
        gap: f64,
    },
}

impl PatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Grid { .. } => "grid",
            Self::Spiral { .. } => "spiral",
            Self::Raster { .. } => "raster",
            Self::SpeedPowerGrid { .. } => "speed_power_grid",
            Self::FocusLines { .. } => "focus_lines",
        }
    }
}

/// What does the cutting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternHead {
    Laser { power_percent: f64, dynamic: bool },
    Spindle { rpm: f64 },
    None,
}

/// Machine capabilities patterns are checked against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineLimits {
    /// Units per minute
    pub max_feed: f64,
    pub max_power_percent: f64,
    pub max_spindle_rpm: f64,
    pub units: Units,
}

impl Default for MachineLimits {
    fn default() -> Self {
        Self {
            max_feed: 5000.0,
            max_power_percent: 100.0,
            max_spindle_rpm: 24000.0,
            units: Units::Millimeters,
        }
    }
}

impl MachineLimits {
    fn max_power(&self) -> f64 {
        self.max_power_percent.min(100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub kind: PatternKind,
    /// Only the XY extent is used
    pub bounds: BoundingBox,
    pub units: Units,
    pub cut_z: f64,
    pub safe_z: f64,
    pub feed: f64,
    pub head: PatternHead,
    pub passes: u32,
    #[serde(default)]
    pub limits: MachineLimits,
}

/// One continuous cut
#[derive(Debug, Clone, PartialEq)]
struct Stroke {
    points: Vec<Position>,
    feed: f64,
    /// Laser power overriding the head setting
    power: Option<f64>,
    label: Option<String>,
}

impl Stroke {
    fn new(points: Vec<Position>, feed: f64) -> Self {
        Self {
            points,
            feed,
            power: None,
            label: None,
        }
    }
}

/// Values `min, min + step, ...` up to `max` inclusive.
fn steps(min: f64, max: f64, step: f64) -> impl Iterator<Item = f64> + Clone {
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    (0..count).map(move |k| (min + k as f64 * step).min(max))
}

fn check_feed(name: &str, feed: f64, limits: &MachineLimits) -> CamToolResult<()> {
    if !(feed.is_finite() && feed > 0.0 && feed <= limits.max_feed) {
        return Err(ParameterError::out_of_range(name, feed, 0.0, limits.max_feed).into());
    }
    Ok(())
}

fn check_power(name: &str, power: f64, limits: &MachineLimits) -> CamToolResult<()> {
    let max = limits.max_power();
    if !(power.is_finite() && (0.0..=max).contains(&power)) {
        return Err(ParameterError::out_of_range(name, power, 0.0, max).into());
    }
    Ok(())
}

fn check_fits(name: &str, size: f64, available: f64) -> CamToolResult<()> {
    if size > available + EPSILON {
        return Err(ParameterError::Inconsistent(format!(
            "{} needs {} but the bounds only allow {}",
            name, size, available
        ))
        .into());
    }
    Ok(())
}

/// Lazy generator for one pattern
///
/// # Example
/// ```ignore
/// let generator = PatternGenerator::new(spec)?;
/// let program = generator.to_program();
/// ```
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    spec: PatternSpec,
}

impl PatternGenerator {
    /// Validate `spec` against its machine limits
    pub fn new(spec: PatternSpec) -> CamToolResult<Self> {
        spec.limits.units.ensure_matches(spec.units, "pattern machine limits")?;

        let b = &spec.bounds;
        let finite = b.min.is_finite() && b.max.is_finite();
        if !finite || b.max.x - b.min.x <= EPSILON || b.max.y - b.min.y <= EPSILON {
            return Err(ParameterError::invalid(
                "bounds",
                format!("degenerate XY extent {} to {}", b.min, b.max),
            )
            .into());
        }
        if !(spec.cut_z.is_finite() && spec.safe_z.is_finite()) {
            return Err(ParameterError::invalid("cut_z", "heights must be finite").into());
        }
        if spec.cut_z >= spec.safe_z {
            return Err(ParameterError::Inconsistent(format!(
                "cut_z {} must be below safe_z {}",
                spec.cut_z, spec.safe_z
            ))
            .into());
        }
        check_feed("feed", spec.feed, &spec.limits)?;
        if spec.passes < 1 {
            return Err(ParameterError::out_of_range(
                "passes",
                spec.passes as f64,
                1.0,
                f64::from(u32::MAX),
            )
            .into());
        }

        match spec.head {
            PatternHead::Laser { power_percent, .. } => {
                check_power("power_percent", power_percent, &spec.limits)?;
            }
            PatternHead::Spindle { rpm } => {
                if !(rpm.is_finite() && rpm > 0.0 && rpm <= spec.limits.max_spindle_rpm) {
                    return Err(ParameterError::out_of_range(
                        "rpm",
                        rpm,
                        0.0,
                        spec.limits.max_spindle_rpm,
                    )
                    .into());
                }
            }
            PatternHead::None => {}
        }

        let width = b.max.x - b.min.x;
        let height = b.max.y - b.min.y;
        match &spec.kind {
            PatternKind::Grid { spacing } | PatternKind::Raster { spacing } => {
                ensure_positive("spacing", *spacing)?;
            }
            PatternKind::Spiral { pitch } => {
                ensure_positive("pitch", *pitch)?;
            }
            PatternKind::SpeedPowerGrid {
                feeds,
                powers,
                cell,
                gap,
            } => {
                if !matches!(spec.head, PatternHead::Laser { .. }) {
                    return Err(ParameterError::Inconsistent(
                        "speed/power grid needs a laser head".to_string(),
                    )
                    .into());
                }
                if feeds.is_empty() {
                    return Err(ParameterError::Missing("feeds".to_string()).into());
                }
                if powers.is_empty() {
                    return Err(ParameterError::Missing("powers".to_string()).into());
                }
                for feed in feeds {
                    check_feed("feeds", *feed, &spec.limits)?;
                }
                for power in powers {
                    check_power("powers", *power, &spec.limits)?;
                }
                ensure_positive("cell", *cell)?;
                ensure_non_negative("gap", *gap)?;
                let span = |n: usize| n as f64 * cell + (n - 1) as f64 * gap;
                check_fits("speed/power grid width", span(powers.len()), width)?;
                check_fits("speed/power grid height", span(feeds.len()), height)?;
            }
            PatternKind::FocusLines {
                z_values,
                length,
                gap,
            } => {
                if z_values.is_empty() {
                    return Err(ParameterError::Missing("z_values".to_string()).into());
                }
                if let Some(z) = z_values.iter().find(|z| !(z.is_finite() && **z < spec.safe_z)) {
                    return Err(ParameterError::Inconsistent(format!(
                        "focus height {} must be below safe_z {}",
                        z, spec.safe_z
                    ))
                    .into());
                }
                ensure_positive("length", *length)?;
                ensure_positive("gap", *gap)?;
                check_fits("focus line length", *length, width)?;
                check_fits(
                    "focus line stack",
                    (z_values.len() - 1) as f64 * gap,
                    height,
                )?;
            }
        }

        tracing::info!(
            "Pattern {} over {} to {} ({} passes)",
            spec.kind.label(),
            b.min,
            b.max,
            spec.passes
        );
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// Modal state the instruction stream starts from.
    pub fn start_state(&self) -> ModalState {
        ModalState::with_units(self.spec.units)
    }

    /// Fresh instruction stream
    ///
    /// Each call starts over from the beginning.
    pub fn instructions(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.preamble()
            .into_iter()
            .chain(self.strokes().flat_map(move |s| self.stroke_instructions(s)))
            .chain(self.postamble())
    }

    /// Collect the whole pattern into a program
    pub fn to_program(&self) -> MotionProgram {
        let program = MotionProgram::new(self.start_state(), self.instructions().collect());
        tracing::debug!(
            "Generated {} pattern with {} instructions",
            self.spec.kind.label(),
            program.len()
        );
        program
    }

    fn preamble(&self) -> Vec<Instruction> {
        let mut out = vec![
            Instruction::comment(format!("Test pattern: {}", self.spec.kind.label())),
            Instruction::modal(ModalChange::Units(self.spec.units)),
            Instruction::modal(ModalChange::Distance(DistanceMode::Absolute)),
        ];
        if let PatternHead::Spindle { rpm } = self.spec.head {
            out.push(Instruction::new(InstructionKind::Spindle(SpindleState::on(
                SpindleDirection::Clockwise,
                rpm,
            ))));
        }
        out
    }

    fn postamble(&self) -> Vec<Instruction> {
        let mut out = Vec::new();
        if let PatternHead::Spindle { rpm } = self.spec.head {
            out.push(Instruction::new(InstructionKind::Spindle(SpindleState::off(rpm))));
        }
        out.push(Instruction::new(InstructionKind::ProgramEnd { rewind: false }));
        out
    }

    fn strokes(&self) -> Box<dyn Iterator<Item = Stroke> + '_> {
        let b = &self.spec.bounds;
        let z = self.spec.cut_z;
        let feed = self.spec.feed;
        let (min, max) = (b.min, b.max);

        match &self.spec.kind {
            PatternKind::Grid { spacing } => {
                let rows = steps(min.y, max.y, *spacing).enumerate().map(move |(k, y)| {
                    let (from, to) = if k % 2 == 0 { (min.x, max.x) } else { (max.x, min.x) };
                    Stroke::new(vec![Position::new(from, y, z), Position::new(to, y, z)], feed)
                });
                let columns = steps(min.x, max.x, *spacing).enumerate().map(move |(k, x)| {
                    let (from, to) = if k % 2 == 0 { (min.y, max.y) } else { (max.y, min.y) };
                    Stroke::new(vec![Position::new(x, from, z), Position::new(x, to, z)], feed)
                });
                Box::new(rows.chain(columns))
            }
            PatternKind::Raster { spacing } => {
                let mut points = Vec::new();
                for (k, y) in steps(min.y, max.y, *spacing).enumerate() {
                    let (from, to) = if k % 2 == 0 { (min.x, max.x) } else { (max.x, min.x) };
                    points.push(Position::new(from, y, z));
                    points.push(Position::new(to, y, z));
                }
                Box::new(std::iter::once(Stroke::new(points, feed)))
            }
            PatternKind::Spiral { pitch } => {
                Box::new(std::iter::once(Stroke::new(self.spiral_points(*pitch), feed)))
            }
            PatternKind::SpeedPowerGrid {
                feeds,
                powers,
                cell,
                gap,
            } => {
                let mut feeds = feeds.clone();
                feeds.sort_by(|a, b| b.total_cmp(a));
                let mut powers = powers.clone();
                powers.sort_by(|a, b| a.total_cmp(b));
                let (cell, pitch) = (*cell, cell + gap);

                Box::new(feeds.into_iter().enumerate().flat_map(move |(row, row_feed)| {
                    let powers = powers.clone();
                    powers.into_iter().enumerate().map(move |(col, power)| {
                        let x0 = min.x + col as f64 * pitch;
                        let y1 = max.y - row as f64 * pitch;
                        let (x1, y0) = (x0 + cell, y1 - cell);
                        let mut stroke = Stroke::new(
                            vec![
                                Position::new(x0, y0, z),
                                Position::new(x1, y0, z),
                                Position::new(x1, y1, z),
                                Position::new(x0, y1, z),
                                Position::new(x0, y0, z),
                            ],
                            row_feed,
                        );
                        stroke.power = Some(power);
                        stroke.label = Some(format!("F{} S{}%", row_feed, power));
                        stroke
                    })
                }))
            }
            PatternKind::FocusLines {
                z_values,
                length,
                gap,
            } => {
                let mut heights = z_values.clone();
                heights.sort_by(|a, b| a.total_cmp(b));
                let (length, gap) = (*length, *gap);
                Box::new(heights.into_iter().enumerate().map(move |(k, lz)| {
                    let y = (min.y + k as f64 * gap).min(max.y);
                    let mut stroke = Stroke::new(
                        vec![Position::new(min.x, y, lz), Position::new(min.x + length, y, lz)],
                        feed,
                    );
                    stroke.label = Some(format!("Z{}", lz));
                    stroke
                }))
            }
        }
    }

    fn spiral_points(&self, pitch: f64) -> Vec<Position> {
        let b = &self.spec.bounds;
        let center = b.center();
        let r_max = (b.max.x - b.min.x).min(b.max.y - b.min.y) / 2.0;
        let turns = r_max / pitch;
        let total = TAU * turns;
        let segments = ((turns * SPIRAL_SEGMENTS_PER_TURN).ceil() as usize).max(1);

        (0..=segments)
            .map(|i| {
                let theta = total * i as f64 / segments as f64;
                let r = (pitch * theta / TAU).min(r_max);
                Position::new(
                    (center.x + r * theta.cos()).clamp(b.min.x, b.max.x),
                    (center.y + r * theta.sin()).clamp(b.min.y, b.max.y),
                    self.spec.cut_z,
                )
            })
            .collect()
    }

    fn stroke_instructions(&self, stroke: Stroke) -> Vec<Instruction> {
        let Some((&start, cuts)) = stroke.points.split_first() else {
            return Vec::new();
        };
        let passes = self.spec.passes as usize;
        let mut out = Vec::with_capacity((cuts.len() + 4) * passes + 1);
        if let Some(label) = &stroke.label {
            out.push(Instruction::comment(label.clone()));
        }

        for _ in 0..passes {
            match self.spec.head {
                PatternHead::Laser {
                    power_percent,
                    dynamic,
                } => {
                    let mode = if dynamic {
                        LaserMode::Dynamic
                    } else {
                        LaserMode::Constant
                    };
                    let laser = LaserState::on(stroke.power.unwrap_or(power_percent), mode);
                    out.push(Instruction::rapid(start));
                    out.push(Instruction::new(InstructionKind::Laser(laser)));
                    self.push_cuts(&mut out, cuts, stroke.feed);
                    out.push(Instruction::new(InstructionKind::Laser(laser.off())));
                }
                PatternHead::Spindle { .. } | PatternHead::None => {
                    out.push(Instruction::rapid(Position::new(
                        start.x,
                        start.y,
                        self.spec.safe_z,
                    )));
                    out.push(Instruction::linear(start, Some(stroke.feed)));
                    self.push_cuts(&mut out, cuts, stroke.feed);
                    let last = cuts.last().copied().unwrap_or(start);
                    out.push(Instruction::rapid(Position::new(
                        last.x,
                        last.y,
                        self.spec.safe_z,
                    )));
                }
            }
        }
        out
    }

    fn push_cuts(&self, out: &mut Vec<Instruction>, cuts: &[Position], feed: f64) {
        for (i, p) in cuts.iter().enumerate() {
            out.push(Instruction::linear(*p, (i == 0).then_some(feed)));
        }
    }
}
