//! Query engine
//!
//! Pure functions over a [`MotionProgram`]. Every result is expressed in the
//! program's start units; moves recorded under other units are converted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use millkit_core::{
    ArcGeometry, BoundingBox, Error, GeometryError, InstructionKind, ModalChange, MotionKind,
    MotionProgram, Move, Position, ReplayStep, Result, Units, EPSILON,
};

/// Settings for time estimation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeEstimateConfig {
    /// Rapid traverse rate in start units per minute
    pub rapid_rate: f64,
    /// Chord tolerance for arc lengths; 0 uses the exact arc length
    pub arc_tolerance: f64,
}

impl Default for TimeEstimateConfig {
    fn default() -> Self {
        Self {
            rapid_rate: 5000.0,
            arc_tolerance: 0.01,
        }
    }
}

impl TimeEstimateConfig {
    fn validate(&self) -> Result<()> {
        if !(self.rapid_rate.is_finite() && self.rapid_rate > 0.0) {
            return Err(Error::invalid_parameter(
                "rapid_rate",
                format!("must be positive, got {}", self.rapid_rate),
            ));
        }
        if !(self.arc_tolerance.is_finite() && self.arc_tolerance >= 0.0) {
            return Err(Error::invalid_parameter(
                "arc_tolerance",
                format!("must be >= 0, got {}", self.arc_tolerance),
            ));
        }
        Ok(())
    }
}

/// Travel split by motion type
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathLength {
    pub rapid: f64,
    pub cutting: f64,
}

impl PathLength {
    pub fn total(&self) -> f64 {
        self.rapid + self.cutting
    }
}

/// Timing and geometry of one move or dwell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub index: usize,
    pub line_number: Option<u32>,
    pub start: Position,
    pub end: Position,
    /// Effective feed rate; `None` for rapids and dwells
    pub feed: Option<f64>,
    pub length: f64,
    pub duration: Duration,
    /// Time from program start to the end of this instruction
    pub elapsed: Duration,
}

/// Overview of a program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub units: Units,
    pub instruction_count: usize,
    pub move_count: usize,
    pub tool_changes: usize,
    pub bounds: Option<BoundingBox>,
    pub path: PathLength,
    pub estimated_time: Duration,
    pub feed_rates: Vec<f64>,
    pub z_levels: Vec<f64>,
}

fn program_units(program: &MotionProgram) -> Units {
    program.start_state().units
}

/// Length of one move in the units active at that move.
fn move_length(step: &ReplayStep<'_>, mv: &Move, tolerance: f64) -> Result<f64> {
    let start = step.before.position;
    match mv.motion {
        MotionKind::Arc { direction, center } => {
            let arc = ArcGeometry::resolve(start, mv.target, center, direction, step.before.plane)
                .ok_or_else(|| GeometryError::DegenerateArc {
                    index: step.index,
                    reason: "zero radius".to_string(),
                })?;
            if tolerance > 0.0 {
                Ok(arc.linearized_length(tolerance))
            } else {
                Ok(arc.length())
            }
        }
        _ => Ok(start.distance(mv.target)),
    }
}

fn sorted_distinct(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup_by(|a, b| (*a - *b).abs() <= EPSILON);
    values
}

/// Bounding box of all move targets
pub fn bounding_box(program: &MotionProgram) -> Option<BoundingBox> {
    let units = program_units(program);
    BoundingBox::from_points(program.replay().filter_map(|step| {
        step.instruction
            .as_move()
            .map(|mv| mv.target.convert(step.before.units, units))
    }))
}

/// Center of the bounding box
pub fn center(program: &MotionProgram) -> Option<Position> {
    bounding_box(program).map(|b| b.center())
}

/// Rapid and cutting travel
///
/// Arcs are measured along their chords when `tolerance` is positive and
/// exactly otherwise.
pub fn path_length(program: &MotionProgram, tolerance: f64) -> Result<PathLength> {
    let units = program_units(program);
    let mut length = PathLength::default();
    for step in program.replay() {
        let Some(mv) = step.instruction.as_move() else {
            continue;
        };
        let d = step.before.units.convert(move_length(&step, mv, tolerance)?, units);
        if mv.motion.is_rapid() {
            length.rapid += d;
        } else {
            length.cutting += d;
        }
    }
    Ok(length)
}

fn duration_of(seconds: f64, index: usize) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        Error::invalid_parameter(
            "duration",
            format!("instruction {index} takes {seconds}s, which is not representable"),
        )
    })
}

/// Per-instruction timing for moves and dwells
///
/// Fails with [`Error::InvalidParameter`] when a feed move has a feed that
/// is zero, negative or not finite.
pub fn annotate(program: &MotionProgram, config: &TimeEstimateConfig) -> Result<Vec<Annotation>> {
    config.validate()?;
    let units = program_units(program);
    let mut annotations = Vec::new();
    let mut elapsed = Duration::ZERO;

    for step in program.replay() {
        let start = step.before.position.convert(step.before.units, units);
        let (end, feed, length, duration) = match &step.instruction.kind {
            InstructionKind::Move(mv) => {
                let local = move_length(&step, mv, config.arc_tolerance)?;
                let length = step.before.units.convert(local, units);
                let end = mv.target.convert(step.before.units, units);
                if mv.motion.is_rapid() {
                    let minutes = length / config.rapid_rate;
                    (end, None, length, duration_of(minutes * 60.0, step.index)?)
                } else {
                    let feed = step.after.feed_rate.ok_or(Error::MissingFeedRate {
                        index: step.index,
                        line_number: step.instruction.line_number,
                    })?;
                    if !(feed > 0.0 && feed.is_finite()) {
                        return Err(Error::invalid_parameter(
                            "feed",
                            format!("feed move at instruction {} has feed {feed}", step.index),
                        ));
                    }
                    let minutes = local / feed;
                    let feed = step.before.units.convert(feed, units);
                    (end, Some(feed), length, duration_of(minutes * 60.0, step.index)?)
                }
            }
            InstructionKind::Dwell { seconds } => {
                (start, None, 0.0, duration_of(seconds.max(0.0), step.index)?)
            }
            _ => continue,
        };

        elapsed += duration;
        annotations.push(Annotation {
            index: step.index,
            line_number: step.instruction.line_number,
            start,
            end,
            feed,
            length,
            duration,
            elapsed,
        });
    }
    Ok(annotations)
}

/// Estimated run time
///
/// Fails with [`Error::MissingFeedRate`] when a feed move has no active
/// feed rate.
pub fn estimated_time(program: &MotionProgram, config: &TimeEstimateConfig) -> Result<Duration> {
    let total = annotate(program, config)?
        .last()
        .map(|a| a.elapsed)
        .unwrap_or(Duration::ZERO);
    tracing::debug!(
        "Estimated {:.1}s for {} instructions",
        total.as_secs_f64(),
        program.len()
    );
    Ok(total)
}

/// Indices of tool change instructions
pub fn tool_change_indices(program: &MotionProgram) -> Vec<usize> {
    program
        .iter()
        .enumerate()
        .filter(|(_, i)| matches!(i.kind, InstructionKind::ToolChange { .. }))
        .map(|(index, _)| index)
        .collect()
}

/// Distinct feed rates, ascending
pub fn feed_rates(program: &MotionProgram) -> Vec<f64> {
    let units = program_units(program);
    let feeds = program
        .replay()
        .filter_map(|step| {
            let feed = match &step.instruction.kind {
                InstructionKind::Move(mv) => mv.feed,
                InstructionKind::Modal(ModalChange::Feed(f)) => Some(*f),
                _ => None,
            };
            feed.map(|f| step.before.units.convert(f, units))
        })
        .collect();
    sorted_distinct(feeds)
}

/// Distinct laser powers in percent, ascending
pub fn laser_powers(program: &MotionProgram) -> Vec<f64> {
    let powers = program
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::Laser(laser) if laser.enabled => Some(laser.power_percent),
            _ => None,
        })
        .collect();
    sorted_distinct(powers)
}

/// Distinct Z heights reached by moves, ascending
pub fn z_levels(program: &MotionProgram) -> Vec<f64> {
    let units = program_units(program);
    let levels = program
        .replay()
        .filter_map(|step| {
            step.instruction
                .as_move()
                .map(|mv| step.before.units.convert(mv.target.z, units))
        })
        .collect();
    sorted_distinct(levels)
}

/// Collect the common queries in one value
pub fn summarize(program: &MotionProgram, config: &TimeEstimateConfig) -> Result<ProgramSummary> {
    let summary = ProgramSummary {
        units: program_units(program),
        instruction_count: program.len(),
        move_count: program.iter().filter(|i| i.is_move()).count(),
        tool_changes: tool_change_indices(program).len(),
        bounds: bounding_box(program),
        path: path_length(program, config.arc_tolerance)?,
        estimated_time: estimated_time(program, config)?,
        feed_rates: feed_rates(program),
        z_levels: z_levels(program),
    };
    tracing::debug!(
        "Summarized program: {} moves, {:.3} {} cutting",
        summary.move_count,
        summary.path.cutting,
        summary.units
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::{
        ArcDirection, Instruction, LaserMode, LaserState, ModalState, ProgramBuilder,
    };

    fn square() -> MotionProgram {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(0.0, 0.0, 5.0))
            .linear_z(-1.0, 60.0)
            .linear_to(Position::new(100.0, 0.0, -1.0), 600.0)
            .linear_to(Position::new(100.0, 50.0, -1.0), 600.0)
            .tool_change(2)
            .dwell(1.5)
            .rapid_z(5.0);
        b.build()
    }

    #[test]
    fn test_bounding_box() {
        let bbox = bounding_box(&square()).unwrap();
        assert_eq!(bbox.min, Position::new(0.0, 0.0, -1.0));
        assert_eq!(bbox.max, Position::new(100.0, 50.0, 5.0));
        assert_eq!(center(&square()), Some(Position::new(50.0, 25.0, 2.0)));
        assert!(bounding_box(&MotionProgram::empty(ModalState::default())).is_none());
    }

    #[test]
    fn test_path_length() {
        let length = path_length(&square(), 0.0).unwrap();
        assert!((length.rapid - 11.0).abs() < 1e-9);
        assert!((length.cutting - 156.0).abs() < 1e-9);
        assert!((length.total() - 167.0).abs() < 1e-9);
    }

    #[test]
    fn test_arc_length_exact_and_chorded() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(10.0, 0.0, 0.0)).arc_to(
            Position::new(-10.0, 0.0, 0.0),
            Position::new(-10.0, 0.0, 0.0),
            ArcDirection::CounterClockwise,
            100.0,
        );
        let program = b.build();
        let exact = path_length(&program, 0.0).unwrap().cutting;
        assert!((exact - 10.0 * std::f64::consts::PI).abs() < 1e-9);
        let chorded = path_length(&program, 0.01).unwrap().cutting;
        assert!(chorded < exact && exact - chorded < 0.1);
    }

    #[test]
    fn test_estimated_time() {
        let config = TimeEstimateConfig {
            rapid_rate: 600.0,
            arc_tolerance: 0.0,
        };
        // 6mm plunge at 60, 150mm at 600, 1.5s dwell, 11mm of rapids at 600
        let expected = 6.0 + 15.0 + 1.5 + 1.1;
        let time = estimated_time(&square(), &config).unwrap();
        assert!((time.as_secs_f64() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_missing_feed_rate() {
        let program = MotionProgram::new(
            ModalState::default(),
            vec![Instruction::linear(Position::new(1.0, 0.0, 0.0), None).with_line(7)],
        );
        let err = estimated_time(&program, &TimeEstimateConfig::default()).unwrap_err();
        assert_eq!(
            err,
            Error::MissingFeedRate {
                index: 0,
                line_number: Some(7)
            }
        );
    }

    #[test]
    fn test_zero_feed_is_an_error() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(10.0, 0.0, 0.0), 0.0);
        let program = b.build();
        let config = TimeEstimateConfig::default();
        let err = estimated_time(&program, &config).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "feed"));
        assert!(summarize(&program, &config).is_err());
    }

    #[test]
    fn test_infinite_dwell_is_an_error() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.dwell(f64::INFINITY);
        let err = estimated_time(&b.build(), &TimeEstimateConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_rejects_bad_rapid_rate() {
        let config = TimeEstimateConfig {
            rapid_rate: 0.0,
            arc_tolerance: 0.0,
        };
        assert!(matches!(
            estimated_time(&square(), &config),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_annotate() {
        let annotations = annotate(&square(), &TimeEstimateConfig::default()).unwrap();
        assert_eq!(annotations.len(), 6);
        assert_eq!(annotations[2].feed, Some(600.0));
        assert_eq!(annotations[2].start, Position::new(0.0, 0.0, -1.0));
        assert_eq!(annotations[4].index, 5);
        assert!(annotations.windows(2).all(|w| w[0].elapsed <= w[1].elapsed));
    }

    #[test]
    fn test_value_queries() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.laser(LaserState::on(40.0, LaserMode::Constant))
            .linear_to(Position::new(1.0, 0.0, 0.0), 300.0)
            .laser(LaserState::on(20.0, LaserMode::Constant))
            .linear_to(Position::new(2.0, 0.0, -1.0), 100.0)
            .laser(LaserState::on(40.0, LaserMode::Constant))
            .linear_to(Position::new(3.0, 0.0, 0.0), 300.0);
        let program = b.build();
        assert_eq!(feed_rates(&program), vec![100.0, 300.0]);
        assert_eq!(laser_powers(&program), vec![20.0, 40.0]);
        assert_eq!(z_levels(&program), vec![-1.0, 0.0]);
        assert_eq!(tool_change_indices(&square()), vec![4]);
    }

    #[test]
    fn test_results_in_start_units() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(10.0, 0.0, 0.0), 100.0)
            .modal(ModalChange::Units(Units::Inches))
            .linear_to(Position::new(1.0, 0.0, 0.0), 10.0);
        let program = b.build();
        let bbox = bounding_box(&program).unwrap();
        assert!((bbox.max.x - 25.4).abs() < 1e-9);
        let length = path_length(&program, 0.0).unwrap();
        assert!((length.cutting - 25.4).abs() < 1e-9);
        assert_eq!(feed_rates(&program), vec![100.0, 254.0]);
    }

    #[test]
    fn test_queries_are_repeatable() {
        let program = square();
        let config = TimeEstimateConfig::default();
        let first = summarize(&program, &config).unwrap();
        assert_eq!(summarize(&program, &config).unwrap(), first);
        assert_eq!(first.tool_changes, 1);
        assert_eq!(first.move_count, 5);
    }
}
