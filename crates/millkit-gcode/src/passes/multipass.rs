//! Z multipass expansion for 2.5D programs

use millkit_core::{
    Axis, Error, GeometryError, Instruction, InstructionKind, ModalChange, ModalState, MotionKind,
    MotionProgram, Plane, Position, Result, EPSILON,
};

use crate::pipeline::{Pass, PassScope};

/// Run of instructions that starts with a Z change and stays at that Z.
#[derive(Debug)]
struct ZBlock<'a> {
    /// Z reached by the first move
    z: Option<f64>,
    /// State before the block
    before: ModalState,
    instructions: Vec<&'a Instruction>,
}

impl ZBlock<'_> {
    /// Position after the last move of the block.
    fn end(&self) -> Position {
        self.instructions
            .iter()
            .rev()
            .find_map(|i| i.as_move().map(|m| m.target))
            .unwrap_or(self.before.position)
    }
}

/// Split a program into Z blocks.
///
/// A new block starts at every move whose target Z differs from the current
/// Z. Instructions before the first such move form a block without a Z.
fn z_blocks(program: &MotionProgram) -> Vec<ZBlock<'_>> {
    let mut blocks = vec![ZBlock {
        z: None,
        before: *program.start_state(),
        instructions: Vec::new(),
    }];
    for step in program.replay() {
        if let Some(mv) = step.instruction.as_move() {
            if (mv.target.z - step.before.position.z).abs() > EPSILON {
                blocks.push(ZBlock {
                    z: Some(mv.target.z),
                    before: step.before,
                    instructions: Vec::new(),
                });
            }
        }
        if let Some(block) = blocks.last_mut() {
            block.instructions.push(step.instruction);
        }
    }
    blocks
}

/// Turns a single full-depth cut into several stepped passes
///
/// Blocks cut at the deepest Z are repeated at levels from
/// `z_top - stepdown` down to the deepest Z. Between passes the tool lifts
/// to the Z it had before the block and moves back to the block's start.
#[derive(Debug, Clone)]
pub struct ZMultipass {
    z_top: f64,
    stepdown: f64,
}

impl ZMultipass {
    /// Create a new multipass expander; the sign of `stepdown` is ignored
    pub fn new(z_top: f64, stepdown: f64) -> Result<Self> {
        if !z_top.is_finite() {
            return Err(Error::invalid_parameter("z_top", "must be finite"));
        }
        if !stepdown.is_finite() || stepdown.abs() <= EPSILON {
            return Err(Error::invalid_parameter(
                "stepdown",
                format!("must be non-zero, got {}", stepdown),
            ));
        }
        Ok(Self {
            z_top,
            stepdown: stepdown.abs(),
        })
    }

    /// Pass depths for a cut whose deepest point is `z_min`.
    pub fn levels(&self, z_min: f64) -> Vec<f64> {
        let mut levels = Vec::new();
        let mut z = self.z_top - self.stepdown;
        while z > z_min + EPSILON {
            levels.push(z);
            z -= self.stepdown;
        }
        levels.push(z_min);
        levels
    }

    fn retarget(
        &self,
        instruction: &Instruction,
        z: f64,
        index: usize,
        plane: Plane,
    ) -> Result<Instruction> {
        let Some(mv) = instruction.as_move() else {
            return Ok(instruction.clone());
        };
        if mv.motion.is_arc() && plane != Plane::Xy {
            return Err(GeometryError::InvalidTransform {
                reason: format!(
                    "arc at instruction {} is outside the XY plane and cannot be re-levelled",
                    index
                ),
            }
            .into());
        }
        let mut out = *mv;
        out.target = mv.target.with(Axis::Z, z);
        if let MotionKind::Arc { direction, center } = mv.motion {
            out.motion = MotionKind::Arc {
                direction,
                center: center.with(Axis::Z, 0.0),
            };
        }
        Ok(instruction.with_move(out))
    }
}

impl Pass for ZMultipass {
    fn name(&self) -> &str {
        "z_multipass"
    }

    fn description(&self) -> &str {
        "Repeats full-depth cuts at stepped Z levels"
    }

    fn scope(&self) -> PassScope {
        PassScope::WholeProgram
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        let z_min = program
            .iter()
            .filter_map(|i| i.as_move())
            .map(|m| m.target.z)
            .fold(f64::INFINITY, f64::min);
        if !z_min.is_finite() {
            return Ok(program.clone());
        }
        let levels = self.levels(z_min);
        if levels.len() < 2 {
            return Ok(program.clone());
        }

        let blocks = z_blocks(program);
        let mut output = Vec::with_capacity(program.len() * levels.len());
        let mut operation = 0usize;
        let mut index = 0usize;

        for block in &blocks {
            let deep = block.z.is_some_and(|z| (z - z_min).abs() <= EPSILON);
            if !deep {
                output.extend(block.instructions.iter().map(|i| (*i).clone()));
                index += block.instructions.len();
                continue;
            }

            operation += 1;
            let start = block.before.position;
            for (pass, z) in levels.iter().enumerate() {
                output.push(Instruction::comment(format!(
                    "Operation {}, pass {}/{}, z={}",
                    operation,
                    pass + 1,
                    levels.len(),
                    z
                )));
                if pass > 0 {
                    output.push(Instruction::rapid(start));
                }
                let mut plane = block.before.plane;
                for (offset, instruction) in block.instructions.iter().enumerate() {
                    output.push(self.retarget(instruction, *z, index + offset, plane)?);
                    if let InstructionKind::Modal(ModalChange::Plane(p)) = instruction.kind {
                        plane = p;
                    }
                }
                if pass + 1 < levels.len() {
                    output.push(Instruction::rapid(block.end().with(Axis::Z, start.z)));
                }
            }
            index += block.instructions.len();
        }

        tracing::debug!(
            "Expanded {} deep blocks into {} passes each",
            operation,
            levels.len()
        );
        Ok(program.with_instructions(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::ProgramBuilder;

    fn pocket() -> MotionProgram {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(0.0, 0.0, 5.0))
            .linear_z(-3.0, 100.0)
            .linear_to(Position::new(10.0, 0.0, -3.0), 300.0)
            .linear_to(Position::new(10.0, 10.0, -3.0), 300.0)
            .rapid_z(5.0);
        b.build()
    }

    #[test]
    fn test_levels() {
        let pass = ZMultipass::new(0.0, 1.0).unwrap();
        assert_eq!(pass.levels(-3.0), vec![-1.0, -2.0, -3.0]);
        assert_eq!(pass.levels(-2.5), vec![-1.0, -2.0, -2.5]);
        let pass = ZMultipass::new(0.0, -1.0).unwrap();
        assert_eq!(pass.levels(-0.5), vec![-0.5]);
    }

    #[test]
    fn test_rejects_zero_stepdown() {
        assert!(ZMultipass::new(0.0, 0.0).is_err());
    }

    #[test]
    fn test_expands_deep_block() {
        let out = ZMultipass::new(0.0, 1.0).unwrap().apply(&pocket()).unwrap();
        let cut_depths: Vec<f64> = out
            .iter()
            .filter_map(|i| i.as_move())
            .filter(|m| m.is_feed_move() && m.target.x == 10.0 && m.target.y == 10.0)
            .map(|m| m.target.z)
            .collect();
        assert_eq!(cut_depths, vec![-1.0, -2.0, -3.0]);

        let comments = out
            .iter()
            .filter(|i| matches!(i.kind, InstructionKind::Comment(_)))
            .count();
        assert_eq!(comments, 3);
        assert_eq!(out.end_state().position, Position::new(10.0, 10.0, 5.0));
    }

    #[test]
    fn test_shallow_program_unchanged() {
        let pass = ZMultipass::new(0.0, 5.0).unwrap();
        assert_eq!(pass.apply(&pocket()).unwrap(), pocket());
    }
}
