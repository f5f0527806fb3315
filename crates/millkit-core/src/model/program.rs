//! Motion programs and replay

use serde::{Deserialize, Serialize};
use std::iter::Enumerate;
use std::slice;

use crate::geometry::{ArcDirection, Axis, Position};

use super::instruction::{
    Instruction, InstructionKind, LaserState, ModalChange, SpindleState,
};
use super::modal::ModalState;

/// An ordered, immutable sequence of instructions plus the modal state it
/// starts from.
///
/// Replaying from the start state never needs look-ahead: every instruction
/// is self-sufficient given the running [`ModalState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MotionProgram {
    start: ModalState,
    instructions: Vec<Instruction>,
}

/// One replay step: the instruction with the state before and after it.
#[derive(Debug, Clone, Copy)]
pub struct ReplayStep<'a> {
    pub index: usize,
    pub instruction: &'a Instruction,
    pub before: ModalState,
    pub after: ModalState,
}

/// Iterator returned by [`MotionProgram::replay`].
pub struct Replay<'a> {
    iter: Enumerate<slice::Iter<'a, Instruction>>,
    state: ModalState,
}

impl<'a> Iterator for Replay<'a> {
    type Item = ReplayStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, instruction) = self.iter.next()?;
        let before = self.state;
        self.state.apply(instruction);
        Some(ReplayStep {
            index,
            instruction,
            before,
            after: self.state,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl MotionProgram {
    pub fn new(start: ModalState, instructions: Vec<Instruction>) -> Self {
        Self {
            start,
            instructions,
        }
    }

    /// Program with no instructions.
    pub fn empty(start: ModalState) -> Self {
        Self::new(start, Vec::new())
    }

    pub fn start_state(&self) -> &ModalState {
        &self.start
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    /// Walk the program, tracking modal state.
    pub fn replay(&self) -> Replay<'_> {
        Replay {
            iter: self.instructions.iter().enumerate(),
            state: self.start,
        }
    }

    /// Modal state after the last instruction.
    pub fn end_state(&self) -> ModalState {
        self.instructions.iter().fold(self.start, |mut state, instr| {
            state.apply(instr);
            state
        })
    }

    /// New program with the same start state.
    pub fn with_instructions(&self, instructions: Vec<Instruction>) -> Self {
        Self::new(self.start, instructions)
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Append `other`, inserting the modal words needed to reach its start
    /// state (units, plane, distance mode).
    pub fn concat(&self, other: &MotionProgram) -> MotionProgram {
        let end = self.end_state();
        let mut instructions = self.instructions.clone();
        if end.units != other.start.units {
            instructions.push(Instruction::modal(ModalChange::Units(other.start.units)));
        }
        if end.plane != other.start.plane {
            instructions.push(Instruction::modal(ModalChange::Plane(other.start.plane)));
        }
        if end.distance_mode != other.start.distance_mode {
            instructions.push(Instruction::modal(ModalChange::Distance(
                other.start.distance_mode,
            )));
        }
        instructions.extend(other.instructions.iter().cloned());
        Self::new(self.start, instructions)
    }
}

impl<'a> IntoIterator for &'a MotionProgram {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

/// Incremental construction of a [`MotionProgram`].
///
/// Tracks the running state so helpers like [`ProgramBuilder::rapid_z`] can
/// keep the other coordinates.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    start: ModalState,
    state: ModalState,
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    pub fn new(start: ModalState) -> Self {
        Self {
            start,
            state: start,
            instructions: Vec::new(),
        }
    }

    /// Current running state.
    pub fn state(&self) -> &ModalState {
        &self.state
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.state.position
    }

    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.state.apply(&instruction);
        self.instructions.push(instruction);
        self
    }

    pub fn extend<I>(&mut self, instructions: I) -> &mut Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        for instruction in instructions {
            self.push(instruction);
        }
        self
    }

    pub fn rapid_to(&mut self, target: Position) -> &mut Self {
        self.push(Instruction::rapid(target))
    }

    /// Rapid along one axis, keeping the others.
    pub fn rapid_axis(&mut self, axis: Axis, value: f64) -> &mut Self {
        let target = self.position().with(axis, value);
        self.rapid_to(target)
    }

    pub fn rapid_z(&mut self, z: f64) -> &mut Self {
        self.rapid_axis(Axis::Z, z)
    }

    /// Rapid in XY at the current height.
    pub fn rapid_xy(&mut self, x: f64, y: f64) -> &mut Self {
        let target = Position::new(x, y, self.position().z);
        self.rapid_to(target)
    }

    /// Linear move; the feed word is written only when it changes.
    pub fn linear_to(&mut self, target: Position, feed: f64) -> &mut Self {
        let feed = self.feed_word(feed);
        self.push(Instruction::linear(target, feed))
    }

    pub fn linear_z(&mut self, z: f64, feed: f64) -> &mut Self {
        let target = self.position().with(Axis::Z, z);
        self.linear_to(target, feed)
    }

    /// Arc move with `center` given as an offset from the current position.
    pub fn arc_to(
        &mut self,
        target: Position,
        center: Position,
        direction: ArcDirection,
        feed: f64,
    ) -> &mut Self {
        let feed = self.feed_word(feed);
        self.push(Instruction::arc(target, direction, center, feed))
    }

    pub fn modal(&mut self, change: ModalChange) -> &mut Self {
        self.push(Instruction::modal(change))
    }

    pub fn spindle(&mut self, spindle: SpindleState) -> &mut Self {
        self.push(Instruction::new(InstructionKind::Spindle(spindle)))
    }

    pub fn laser(&mut self, laser: LaserState) -> &mut Self {
        self.push(Instruction::new(InstructionKind::Laser(laser)))
    }

    pub fn tool_change(&mut self, tool: u32) -> &mut Self {
        self.push(Instruction::new(InstructionKind::ToolChange { tool }))
    }

    pub fn dwell(&mut self, seconds: f64) -> &mut Self {
        self.push(Instruction::new(InstructionKind::Dwell { seconds }))
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Instruction::comment(text))
    }

    pub fn end(&mut self) -> &mut Self {
        self.push(Instruction::new(InstructionKind::ProgramEnd { rewind: false }))
    }

    pub fn build(self) -> MotionProgram {
        MotionProgram::new(self.start, self.instructions)
    }

    fn feed_word(&self, feed: f64) -> Option<f64> {
        match self.state.feed_rate {
            Some(active) if active == feed => None,
            _ => Some(feed),
        }
    }
}
