//! Arc linearization and redundancy removal

use millkit_core::{
    ArcGeometry, Error, GeometryError, Instruction, InstructionKind, ModalState, MotionKind,
    MotionProgram, Result,
};

use crate::pipeline::{Pass, PassScope};

/// Replaces arcs with chains of linear moves
///
/// Chord sagitta stays within `tolerance` of the true arc.
#[derive(Debug, Clone)]
pub struct ArcLinearize {
    tolerance: f64,
}

impl ArcLinearize {
    /// Create a new arc linearizer
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(Error::invalid_parameter(
                "tolerance",
                format!("must be positive, got {}", tolerance),
            ));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl Pass for ArcLinearize {
    fn name(&self) -> &str {
        "arc_linearize"
    }

    fn description(&self) -> &str {
        "Converts arc moves to linear segments"
    }

    fn transform(
        &self,
        index: usize,
        instruction: &Instruction,
        state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        let Some(mv) = instruction.as_move() else {
            return Ok(vec![instruction.clone()]);
        };
        let MotionKind::Arc { direction, center } = mv.motion else {
            return Ok(vec![instruction.clone()]);
        };

        let arc = ArcGeometry::resolve(state.position, mv.target, center, direction, state.plane)
            .ok_or_else(|| GeometryError::DegenerateArc {
                index,
                reason: "zero radius".to_string(),
            })?;
        let points = arc.linearize(self.tolerance);
        let last = points.len().saturating_sub(1);

        Ok(points
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let mut segment = Instruction::linear(p, if i == 0 { mv.feed } else { None });
                segment.line_number = instruction.line_number;
                if i == last {
                    segment.comment = instruction.comment.clone();
                }
                segment
            })
            .collect())
    }
}

/// Drops instructions that do not change the running state
///
/// Repeated modal words, spindle, laser and tool commands that restate the
/// active value are removed, and repeated feed words are stripped from
/// moves. Comments on dropped instructions are kept as comment lines.
#[derive(Debug, Clone, Default)]
pub struct RemoveRedundant;

impl RemoveRedundant {
    /// Create a new redundancy filter
    pub fn new() -> Self {
        Self
    }
}

impl Pass for RemoveRedundant {
    fn name(&self) -> &str {
        "remove_redundant"
    }

    fn description(&self) -> &str {
        "Removes modal, spindle, laser and tool commands that change nothing"
    }

    fn scope(&self) -> PassScope {
        PassScope::WholeProgram
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        let mut state = *program.start_state();
        let mut output = Vec::with_capacity(program.len());
        let mut dropped = 0usize;

        for instruction in program.iter() {
            let kept = match &instruction.kind {
                InstructionKind::Modal(_)
                | InstructionKind::Spindle(_)
                | InstructionKind::Laser(_)
                | InstructionKind::ToolChange { .. } => {
                    if state.after(instruction) == state {
                        instruction.comment.clone().map(Instruction::comment)
                    } else {
                        Some(instruction.clone())
                    }
                }
                InstructionKind::Move(mv) if mv.feed.is_some() && mv.feed == state.feed_rate => {
                    let mut mv = *mv;
                    mv.feed = None;
                    Some(instruction.with_move(mv))
                }
                _ => Some(instruction.clone()),
            };

            match kept {
                Some(instr) => {
                    state.apply(&instr);
                    output.push(instr);
                }
                None => dropped += 1,
            }
        }

        tracing::debug!("Removed {} redundant instructions", dropped);
        Ok(program.with_instructions(output))
    }
}
