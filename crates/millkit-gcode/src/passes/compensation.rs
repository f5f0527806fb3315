//! Tool-radius compensation
//!
//! Offsets each move target by the tool radius, perpendicular to the
//! in-plane direction of travel, so the cutting edge rather than the tool
//! center follows the programmed path. Where consecutive segments meet at
//! a corner, a straight bridge move joins the two offset lines.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use millkit_core::{
    ArcDirection, ArcGeometry, GeometryError, Instruction, InstructionKind, MotionKind,
    MotionProgram, Plane, Position, Result, Tool, UnsupportedFeatureError, EPSILON,
};

use crate::pipeline::Pass;

/// Which side of the path the tool runs on, looking along the direction of
/// travel from above the plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationSide {
    /// G41
    Left,
    /// G42
    Right,
}

impl CompensationSide {
    fn sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }
}

/// Offsets the path by the tool radius
#[derive(Debug, Clone)]
pub struct ToolRadiusCompensation {
    tool: Arc<Tool>,
    side: CompensationSide,
    passes: u32,
}

impl ToolRadiusCompensation {
    /// Create a new compensation pass
    pub fn new(tool: Arc<Tool>, side: CompensationSide) -> Self {
        Self {
            tool,
            side,
            passes: 1,
        }
    }

    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = passes;
        self
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    pub fn side(&self) -> CompensationSide {
        self.side
    }
}

/// In-plane component of a vector.
fn in_plane(v: Position, plane: Plane) -> Position {
    let (a, b) = plane.axes();
    Position::ZERO.with(a, v.get(a)).with(b, v.get(b))
}

/// Unit normal to the left of in-plane direction `d`.
fn left_normal(d: Position, plane: Plane) -> Position {
    let (a, b) = plane.axes();
    let len = d.norm();
    Position::ZERO
        .with(a, -d.get(b) / len)
        .with(b, d.get(a) / len)
}

impl Pass for ToolRadiusCompensation {
    fn name(&self) -> &str {
        "tool_radius_compensation"
    }

    fn description(&self) -> &str {
        "Offsets move targets by the tool radius to one side of the path"
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        if self.passes > 1 {
            return Err(UnsupportedFeatureError {
                feature_id: self.name().to_string(),
                kind: "multi-pass compensation".to_string(),
                reason: format!("{} passes requested, only one is supported", self.passes),
            }
            .into());
        }

        let radius = self.tool.radius();
        let mut output = Vec::with_capacity(program.len());
        let mut last_offset = Position::ZERO;
        let mut emitted_position = program.start_state().position;
        let mut compensating = false;

        for step in program.replay() {
            let state = step.before;
            self.tool
                .units
                .ensure_matches(state.units, "tool radius compensation")?;

            let InstructionKind::Move(mv) = &step.instruction.kind else {
                output.push(step.instruction.clone());
                continue;
            };

            let plane = state.plane;
            let start = state.position;
            let travel = mv.target - start;
            if travel.norm() <= EPSILON && !mv.motion.is_arc() {
                return Err(GeometryError::ZeroLengthSegment {
                    index: step.index,
                    at: mv.target,
                }
                .into());
            }

            let mut out = *mv;
            let (start_offset, end_offset, arc_center) = match mv.motion {
                MotionKind::Arc { direction, center } => {
                    let arc = ArcGeometry::resolve(start, mv.target, center, direction, plane)
                        .ok_or_else(|| GeometryError::DegenerateArc {
                            index: step.index,
                            reason: "zero radius".to_string(),
                        })?;
                    // Counter-clockwise travel has the center on its left.
                    let inward = match direction {
                        ArcDirection::CounterClockwise => self.side.sign(),
                        ArcDirection::Clockwise => -self.side.sign(),
                    };
                    let new_radius = arc.radius - inward * radius;
                    if new_radius <= EPSILON {
                        return Err(GeometryError::CompensationCollapse {
                            index: step.index,
                            radius: arc.radius,
                            tool_radius: radius,
                        }
                        .into());
                    }
                    let scale = new_radius / arc.radius - 1.0;
                    (
                        in_plane(start - arc.center, plane) * scale,
                        in_plane(mv.target - arc.center, plane) * scale,
                        Some(arc.center),
                    )
                }
                _ => {
                    let d = in_plane(travel, plane);
                    if d.norm() > EPSILON {
                        let offset = left_normal(d, plane) * (radius * self.side.sign());
                        (offset, offset, None)
                    } else {
                        (last_offset, last_offset, None)
                    }
                }
            };

            // Bridge a corner so the segment starts on its own offset line.
            let corner = start + start_offset;
            if compensating && !emitted_position.approx_eq(corner, EPSILON) {
                let bridge = if mv.motion.is_rapid() {
                    Instruction::rapid(corner)
                } else {
                    Instruction::linear(corner, mv.feed)
                };
                output.push(bridge);
                emitted_position = corner;
            }

            out.target = mv.target + end_offset;
            if let (MotionKind::Arc { direction, .. }, Some(arc_center)) =
                (mv.motion, arc_center)
            {
                out.motion = MotionKind::Arc {
                    direction,
                    center: in_plane(arc_center - emitted_position, plane),
                };
            }
            last_offset = end_offset;
            compensating = true;

            emitted_position = out.target;
            output.push(step.instruction.with_move(out));
        }

        tracing::debug!(
            "Compensated {} instructions by tool radius {}",
            output.len(),
            radius
        );
        Ok(program.with_instructions(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::{Error, ModalState, ProgramBuilder, Units};

    fn tool(diameter: f64) -> Arc<Tool> {
        Arc::new(Tool::flat_end_mill(diameter, 20.0, Units::Millimeters).unwrap())
    }

    fn line_program() -> MotionProgram {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(10.0, 0.0, 0.0), 100.0)
            .linear_z(-2.0, 50.0)
            .linear_to(Position::new(10.0, 10.0, -2.0), 100.0);
        b.build()
    }

    fn targets(program: &MotionProgram) -> Vec<Position> {
        program
            .iter()
            .filter_map(|i| i.as_move().map(|m| m.target))
            .collect()
    }

    #[test]
    fn test_left_offset_of_line() {
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left);
        let out = pass.apply(&line_program()).unwrap();
        let t = targets(&out);
        assert!(t[0].approx_eq(Position::new(10.0, 1.0, 0.0), 1e-12));
        // Plunge keeps the previous offset.
        assert!(t[1].approx_eq(Position::new(10.0, 1.0, -2.0), 1e-12));
        // Corner bridge onto the second edge's offset line.
        assert!(t[2].approx_eq(Position::new(9.0, 0.0, -2.0), 1e-12));
        assert!(t[3].approx_eq(Position::new(9.0, 10.0, -2.0), 1e-12));
    }

    /// Start and end of every move in the compensated program.
    fn segments(program: &MotionProgram) -> Vec<(Position, Position)> {
        program
            .replay()
            .filter_map(|step| {
                step.instruction
                    .as_move()
                    .map(|m| (step.before.position, m.target))
            })
            .collect()
    }

    #[test]
    fn test_square_edges_stay_one_radius_from_the_boundary() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(10.0, 0.0, 0.0), 100.0)
            .linear_to(Position::new(10.0, 10.0, 0.0), 100.0)
            .linear_to(Position::new(0.0, 10.0, 0.0), 100.0)
            .linear_to(Position::new(0.0, 0.0, 0.0), 100.0);
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left);
        let out = pass.apply(&b.build()).unwrap();

        let segs = segments(&out);
        // Lead-in, then a bridge before each of the three later edges.
        assert_eq!(segs.len(), 7);
        assert!(segs[0].1.approx_eq(Position::new(10.0, 1.0, 0.0), 1e-12));

        let (from, to) = segs[2];
        assert!((from.x - 9.0).abs() < 1e-12 && (to.x - 9.0).abs() < 1e-12);
        let mid = (from + to) * 0.5;
        assert!(((10.0 - mid.x) - 1.0).abs() < 1e-12);

        let (from, to) = segs[4];
        assert!((from.y - 9.0).abs() < 1e-12 && (to.y - 9.0).abs() < 1e-12);

        let (from, to) = segs[6];
        assert!((from.x - 1.0).abs() < 1e-12 && (to.x - 1.0).abs() < 1e-12);
        assert!(to.approx_eq(Position::new(1.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn test_tangent_arc_needs_no_bridge() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(10.0, 0.0, 0.0), 100.0).arc_to(
            Position::new(20.0, 10.0, 0.0),
            Position::new(0.0, 10.0, 0.0),
            ArcDirection::CounterClockwise,
            100.0,
        );
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left);
        let out = pass.apply(&b.build()).unwrap();
        let t = targets(&out);
        assert_eq!(t.len(), 2);
        assert!(t[1].approx_eq(Position::new(19.0, 10.0, 0.0), 1e-9));
    }

    #[test]
    fn test_right_offset_of_line() {
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Right);
        let out = pass.apply(&line_program()).unwrap();
        assert!(targets(&out)[0].approx_eq(Position::new(10.0, -1.0, 0.0), 1e-12));
    }

    #[test]
    fn test_zero_length_segment_fails() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.linear_to(Position::new(5.0, 0.0, 0.0), 100.0)
            .linear_to(Position::new(5.0, 0.0, 0.0), 100.0);
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left);
        let err = pass.apply(&b.build()).unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(GeometryError::ZeroLengthSegment { index: 1, .. })
        ));
    }

    #[test]
    fn test_arc_offsets_radially() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(10.0, 0.0, 0.0)).arc_to(
            Position::new(0.0, 10.0, 0.0),
            Position::new(-10.0, 0.0, 0.0),
            ArcDirection::CounterClockwise,
            100.0,
        );
        // Counter-clockwise with the tool on the left runs inside the arc.
        let pass = ToolRadiusCompensation::new(tool(4.0), CompensationSide::Left);
        let out = pass.apply(&b.build()).unwrap();
        let t = targets(&out);
        assert!(t[1].approx_eq(Position::new(8.0, 0.0, 0.0), 1e-9));
        assert!(t[2].approx_eq(Position::new(0.0, 8.0, 0.0), 1e-9));
    }

    #[test]
    fn test_arc_collapse() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(1.0, 0.0, 0.0)).arc_to(
            Position::new(-1.0, 0.0, 0.0),
            Position::new(-1.0, 0.0, 0.0),
            ArcDirection::CounterClockwise,
            100.0,
        );
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left);
        let err = pass.apply(&b.build()).unwrap_err();
        assert!(matches!(
            err,
            Error::Geometry(GeometryError::CompensationCollapse { index: 1, .. })
        ));
    }

    #[test]
    fn test_multi_pass_is_unsupported() {
        let pass = ToolRadiusCompensation::new(tool(2.0), CompensationSide::Left).with_passes(2);
        assert!(pass.apply(&line_program()).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_unit_mismatch() {
        let inch_tool = Arc::new(Tool::flat_end_mill(0.25, 1.0, Units::Inches).unwrap());
        let pass = ToolRadiusCompensation::new(inch_tool, CompensationSide::Left);
        assert!(pass.apply(&line_program()).unwrap_err().is_unit_mismatch());
    }
}
