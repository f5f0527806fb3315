//! Cut ordering optimizer
//!
//! Splits a program into cut groups (leading rapids followed by feed moves)
//! and visits them nearest-neighbour first. Groups never cross a barrier:
//! tool, spindle, laser and modal changes, dwells, raw lines and program
//! end keep their position relative to the cuts around them.

use rayon::prelude::*;

use millkit_core::{
    Instruction, InstructionKind, MotionProgram, Position, ReplayStep, Result, EPSILON,
};

use crate::pipeline::{Pass, PassScope};

/// Leading rapids and comments followed by feed moves.
#[derive(Debug, Default)]
struct CutGroup {
    leading: Vec<Instruction>,
    cuts: Vec<Instruction>,
    /// Position where the first feed move starts
    entry: Position,
    /// Target of the last feed move
    exit: Position,
}

impl CutGroup {
    fn has_lead_rapid(&self) -> bool {
        self.leading
            .iter()
            .any(|i| i.as_move().is_some_and(|m| m.motion.is_rapid()))
    }

    fn has_cuts(&self) -> bool {
        self.cuts.iter().any(Instruction::is_move)
    }

    fn into_instructions(self) -> impl Iterator<Item = Instruction> {
        self.leading.into_iter().chain(self.cuts)
    }
}

fn is_barrier(instruction: &Instruction) -> bool {
    !matches!(
        instruction.kind,
        InstructionKind::Move(_) | InstructionKind::Comment(_)
    )
}

fn xy_distance(a: Position, b: Position) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Split a barrier-free run into cut groups.
fn cut_groups(run: &[ReplayStep<'_>]) -> Vec<CutGroup> {
    let mut groups = Vec::new();
    let mut current = CutGroup::default();

    for step in run {
        let instruction = step.instruction;
        match &instruction.kind {
            InstructionKind::Move(mv) if mv.motion.is_rapid() => {
                if current.has_cuts() {
                    groups.push(std::mem::take(&mut current));
                }
                current.leading.push(instruction.clone());
            }
            InstructionKind::Move(mv) => {
                let mut cut = *mv;
                if !current.has_cuts() {
                    current.entry = step.before.position;
                    // The group may run after a different feed; make it explicit.
                    cut.feed = mv.feed.or(step.before.feed_rate);
                }
                current.exit = mv.target;
                current.cuts.push(instruction.with_move(cut));
            }
            _ => {
                if current.has_cuts() {
                    current.cuts.push(instruction.clone());
                } else {
                    current.leading.push(instruction.clone());
                }
            }
        }
    }
    if !current.leading.is_empty() || !current.cuts.is_empty() {
        groups.push(current);
    }
    groups
}

/// Reorders cut groups to shorten rapid travel
#[derive(Debug, Clone)]
pub struct ReorderPaths {
    safe_z: f64,
}

impl ReorderPaths {
    /// Create a new reorder pass
    ///
    /// Reordered groups are entered from `safe_z`.
    pub fn new(safe_z: f64) -> Self {
        Self { safe_z }
    }

    pub fn safe_z(&self) -> f64 {
        self.safe_z
    }

    fn rapid(&self, output: &mut Vec<Instruction>, position: &mut Position, target: Position) {
        if !position.approx_eq(target, EPSILON) {
            output.push(Instruction::rapid(target));
            *position = target;
        }
    }

    /// Retract, travel and descend to `entry`.
    fn approach(&self, output: &mut Vec<Instruction>, position: &mut Position, entry: Position) {
        let retract = Position::new(position.x, position.y, self.safe_z);
        self.rapid(output, position, retract);
        self.rapid(output, position, Position::new(entry.x, entry.y, self.safe_z));
        self.rapid(output, position, entry);
    }

    /// Reorder one run, appending to `output`.
    ///
    /// With `restore` set, a run that would otherwise finish somewhere else
    /// returns to its original end position. Returns the number of groups
    /// that were reordered.
    fn reorder_run(
        &self,
        run: &[ReplayStep<'_>],
        restore: bool,
        output: &mut Vec<Instruction>,
    ) -> usize {
        let Some(first) = run.first() else {
            return 0;
        };
        let original_end = run
            .last()
            .map(|s| s.after.position)
            .unwrap_or(first.before.position);

        let mut groups = cut_groups(run);
        let mut position = first.before.position;

        let mut head = Vec::new();
        if groups
            .first()
            .is_some_and(|g| g.has_cuts() && !g.has_lead_rapid())
        {
            head.push(groups.remove(0));
        }
        let tail: Vec<CutGroup> = match groups.iter().rposition(CutGroup::has_cuts) {
            Some(last) => groups.split_off(last + 1),
            None => std::mem::take(&mut groups),
        };

        if groups.len() < 2 {
            output.extend(run.iter().map(|s| s.instruction.clone()));
            return 0;
        }

        for group in head {
            position = group.exit;
            output.extend(group.into_instructions());
        }

        let reordered = groups.len();
        let mut remaining = groups;
        while !remaining.is_empty() {
            let from = position;
            let costs: Vec<f64> = remaining
                .par_iter()
                .map(|g| xy_distance(from, g.entry))
                .collect();
            let mut best = 0;
            for (i, cost) in costs.iter().enumerate() {
                if *cost < costs[best] {
                    best = i;
                }
            }

            let group = remaining.remove(best);
            output.extend(
                group
                    .leading
                    .into_iter()
                    .filter(|i| !i.is_move()),
            );
            self.approach(output, &mut position, group.entry);
            output.extend(group.cuts);
            position = group.exit;
        }

        if tail.is_empty() {
            if restore && !position.approx_eq(original_end, EPSILON) {
                self.approach(output, &mut position, original_end);
            }
        } else {
            for group in tail {
                output.extend(group.into_instructions());
            }
        }
        reordered
    }
}

impl Pass for ReorderPaths {
    fn name(&self) -> &str {
        "reorder_paths"
    }

    fn description(&self) -> &str {
        "Reorders cut groups nearest-neighbour first to shorten rapid travel"
    }

    fn scope(&self) -> PassScope {
        PassScope::WholeProgram
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        let mut output = Vec::with_capacity(program.len());
        let mut run: Vec<ReplayStep<'_>> = Vec::new();
        let mut reordered = 0;
        let last_move = program.iter().rposition(Instruction::is_move);

        for step in program.replay() {
            if is_barrier(step.instruction) {
                let restore = last_move.is_some_and(|last| last > step.index);
                reordered += self.reorder_run(&run, restore, &mut output);
                run.clear();
                output.push(step.instruction.clone());
            } else {
                run.push(step);
            }
        }
        reordered += self.reorder_run(&run, false, &mut output);

        tracing::debug!("Reordered {} cut groups", reordered);
        Ok(program.with_instructions(output))
    }
}
