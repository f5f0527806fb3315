//! G-code emitter
//!
//! Writes the minimal G-code for a [`MotionProgram`]: modal words only when
//! they change, axis words only when the coordinate changes, fixed word
//! order. The emitter tracks the state a controller would reconstruct from
//! the rounded text, so rounding never accumulates in relative mode.

use serde::{Deserialize, Serialize};

use millkit_core::{
    Axis, DistanceMode, Instruction, InstructionKind, LaserMode, LaserState, ModalChange,
    ModalState, MotionKind, MotionMode, MotionProgram, Move, Position, SpindleDirection,
    SpindleState, EPSILON,
};

/// How comments are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentStyle {
    /// `(text)`
    #[default]
    Parentheses,
    /// `; text`
    Semicolon,
}

/// Emitter configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Decimal places for every number
    pub precision: usize,
    pub comment_style: CommentStyle,
    /// S value that corresponds to 100% laser power
    pub laser_max: f64,
    /// Start with a line that puts a default controller into the program's
    /// start state
    pub emit_preamble: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            precision: 3,
            comment_style: CommentStyle::Parentheses,
            laser_max: 1000.0,
            emit_preamble: true,
        }
    }
}

/// Emitted text plus the state a controller ends in after running it.
#[derive(Debug, Clone)]
pub struct EmitOutput {
    pub lines: Vec<String>,
    pub end_state: ModalState,
}

impl EmitOutput {
    /// Lines joined with newlines, with a trailing newline.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

/// G-code emitter
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    config: EmitterConfig,
}

impl Emitter {
    /// Create a new emitter
    pub fn new(config: EmitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Emit a whole program.
    pub fn emit(&self, program: &MotionProgram) -> EmitOutput {
        let (preamble, state) = self.preamble(program.start_state());
        let mut output = self.emit_from(program, state);
        if let Some(line) = preamble {
            output.lines.insert(0, line);
        }
        output
    }

    /// Emit a program assuming the controller is already in `state`.
    ///
    /// No preamble is written.
    pub fn emit_from(&self, program: &MotionProgram, mut state: ModalState) -> EmitOutput {
        let lines: Vec<String> = program
            .iter()
            .filter_map(|instr| self.emit_instruction(instr, &mut state))
            .collect();
        tracing::debug!("Emitted {} lines for {} instructions", lines.len(), program.len());
        EmitOutput {
            lines,
            end_state: state,
        }
    }

    /// Lazily emit lines for a stream of instructions starting at `start`.
    pub fn emit_iter<I>(&self, start: ModalState, instructions: I) -> EmitIter<I::IntoIter>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let (preamble, state) = self.preamble(&start);
        EmitIter {
            emitter: self.clone(),
            state,
            pending: preamble,
            inner: instructions.into_iter(),
        }
    }

    /// Emit one instruction against the running emitted state.
    ///
    /// Returns `None` when the instruction changes nothing and carries no
    /// comment.
    pub fn emit_instruction(&self, instruction: &Instruction, state: &mut ModalState) -> Option<String> {
        let mut words: Vec<String> = Vec::new();
        match &instruction.kind {
            InstructionKind::Move(mv) => self.emit_move(mv, state, &mut words),
            InstructionKind::Modal(change) => self.emit_modal(*change, state, &mut words),
            InstructionKind::ToolChange { tool } => {
                words.push(format!("T{}", tool));
                words.push("M6".to_string());
                state.tool = Some(*tool);
            }
            InstructionKind::Spindle(spindle) => self.emit_spindle(*spindle, state, &mut words),
            InstructionKind::Laser(laser) => self.emit_laser(*laser, state, &mut words),
            InstructionKind::Dwell { seconds } => {
                words.push("G4".to_string());
                words.push(format!("P{}", self.format(*seconds)));
            }
            InstructionKind::Comment(text) => {
                return Some(self.format_comment(text));
            }
            InstructionKind::RawPassthrough(text) => {
                let mut line = text.clone();
                if let Some(comment) = &instruction.comment {
                    line.push(' ');
                    line.push_str(&self.format_comment(comment));
                }
                return Some(line);
            }
            InstructionKind::ProgramEnd { rewind } => {
                words.push(if *rewind { "M30" } else { "M2" }.to_string());
            }
        }

        if let Some(comment) = &instruction.comment {
            words.push(self.format_comment(comment));
        }
        if words.is_empty() {
            None
        } else {
            Some(words.join(" "))
        }
    }

    /// Format a number with the configured precision, trailing zeros
    /// trimmed.
    pub fn format(&self, value: f64) -> String {
        format_number(value, self.config.precision)
    }

    fn quantize(&self, value: f64) -> (String, f64) {
        let text = self.format(value);
        let parsed = text.parse::<f64>().unwrap_or(value);
        (text, parsed)
    }

    fn preamble(&self, start: &ModalState) -> (Option<String>, ModalState) {
        if !self.config.emit_preamble {
            return (None, *start);
        }
        let mut words = vec![
            format!("G{}", start.units.gcode()),
            format!("G{}", start.plane.gcode()),
            format!("G{}", start.distance_mode.gcode()),
        ];
        let mut state = ModalState::with_units(start.units);
        state.plane = start.plane;
        state.distance_mode = start.distance_mode;
        if start.motion != MotionMode::default() {
            words.push(format!("G{}", start.motion.gcode()));
            state.motion = start.motion;
        }
        if let Some(feed) = start.feed_rate {
            let (text, value) = self.quantize(feed);
            words.push(format!("F{}", text));
            state.feed_rate = Some(value);
        }
        (Some(words.join(" ")), state)
    }

    fn emit_modal(&self, change: ModalChange, state: &mut ModalState, words: &mut Vec<String>) {
        match change {
            ModalChange::Units(units) if units != state.units => {
                words.push(format!("G{}", units.gcode()));
                state.apply_change(change);
            }
            ModalChange::Plane(plane) if plane != state.plane => {
                words.push(format!("G{}", plane.gcode()));
                state.plane = plane;
            }
            ModalChange::Distance(mode) if mode != state.distance_mode => {
                words.push(format!("G{}", mode.gcode()));
                state.distance_mode = mode;
            }
            ModalChange::Motion(mode) if mode != state.motion => {
                words.push(format!("G{}", mode.gcode()));
                state.motion = mode;
            }
            ModalChange::Feed(feed) => {
                if let Some(value) = self.feed_word(feed, state, words) {
                    state.feed_rate = Some(value);
                }
            }
            _ => {}
        }
    }

    fn emit_move(&self, mv: &Move, state: &mut ModalState, words: &mut Vec<String>) {
        let mut position = state.position;
        let mut axis_words = Vec::new();

        for axis in Axis::ALL {
            let current = state.position.get(axis);
            let (text, value) = self.quantize(mv.target.get(axis));
            match state.distance_mode {
                DistanceMode::Absolute => {
                    if text != self.format(current) {
                        axis_words.push(format!("{}{}", axis.letter(), text));
                        position = position.with(axis, value);
                    }
                }
                DistanceMode::Relative => {
                    let (delta_text, delta) = self.quantize(value - current);
                    if delta_text != "0" {
                        axis_words.push(format!("{}{}", axis.letter(), delta_text));
                        position = position.with(axis, current + delta);
                    }
                }
            }
        }

        let mut center_words = Vec::new();
        let mut motion = mv.motion;
        if let MotionKind::Arc { direction, center } = mv.motion {
            let mut offset = Position::ZERO;
            for axis in state.plane.center_axes() {
                let (text, value) = self.quantize(center.get(axis));
                center_words.push(format!("{}{}", axis.center_letter(), text));
                offset = offset.with(axis, value);
            }
            if offset.norm() <= EPSILON {
                // Center rounds to zero at this precision.
                tracing::debug!("Arc center {:?} rounds to zero, writing a line", center);
                center_words.clear();
                motion = MotionKind::Linear;
            } else {
                motion = MotionKind::Arc {
                    direction,
                    center: offset,
                };
            }
        }
        let mode = motion.mode();

        let mut feed_words = Vec::new();
        let mut feed = None;
        if let Some(f) = mv.feed {
            feed = self.feed_word(f, state, &mut feed_words);
        }

        if axis_words.is_empty() && center_words.is_empty() {
            // Nothing moves: keep only the modal part of the line.
            if mode != state.motion {
                words.push(format!("G{}", mode.gcode()));
                state.motion = mode;
            }
            words.extend(feed_words);
            if let Some(value) = feed {
                state.feed_rate = Some(value);
            }
            return;
        }

        if mode != state.motion {
            words.push(format!("G{}", mode.gcode()));
        }
        words.extend(axis_words);
        words.extend(center_words);
        words.extend(feed_words);

        state.apply(&Instruction::new(InstructionKind::Move(Move {
            target: position,
            motion,
            feed,
        })));
    }

    /// Push an F word when `feed` differs from the active feed rate.
    fn feed_word(&self, feed: f64, state: &ModalState, words: &mut Vec<String>) -> Option<f64> {
        let (text, value) = self.quantize(feed);
        let unchanged = state
            .feed_rate
            .map(|active| self.format(active) == text)
            .unwrap_or(false);
        if unchanged {
            None
        } else {
            words.push(format!("F{}", text));
            Some(value)
        }
    }

    fn emit_spindle(&self, spindle: SpindleState, state: &mut ModalState, words: &mut Vec<String>) {
        let (text, speed) = self.quantize(spindle.speed);
        let speed_changed = text != self.format(state.spindle.speed);
        let direction_changed = spindle.direction != state.spindle.direction;

        match spindle.direction {
            SpindleDirection::Off => {
                if direction_changed {
                    words.push("M5".to_string());
                }
            }
            SpindleDirection::Clockwise if direction_changed => words.push("M3".to_string()),
            SpindleDirection::CounterClockwise if direction_changed => {
                words.push("M4".to_string())
            }
            _ => {}
        }
        if speed_changed || (direction_changed && spindle.is_on()) {
            words.push(format!("S{}", text));
        }

        state.spindle = SpindleState {
            direction: spindle.direction,
            speed: if speed_changed { speed } else { state.spindle.speed },
        };
    }

    fn emit_laser(&self, laser: LaserState, state: &mut ModalState, words: &mut Vec<String>) {
        let max = self.config.laser_max;
        let (text, s_value) = self.quantize(laser.power_percent / 100.0 * max);
        let power_changed = text != self.format(state.laser.power_percent / 100.0 * max);
        let switched = laser.enabled != state.laser.enabled
            || (laser.enabled && laser.mode != state.laser.mode);

        if switched {
            words.push(
                match (laser.enabled, laser.mode) {
                    (false, _) => "M5",
                    (true, LaserMode::Constant) => "M3",
                    (true, LaserMode::Dynamic) => "M4",
                }
                .to_string(),
            );
        }
        if power_changed || (switched && laser.enabled) {
            words.push(format!("S{}", text));
        }

        let power_percent = if power_changed {
            s_value / max * 100.0
        } else {
            state.laser.power_percent
        };
        state.laser = LaserState {
            enabled: laser.enabled,
            power_percent,
            mode: if laser.enabled { laser.mode } else { state.laser.mode },
        };
    }

    fn format_comment(&self, text: &str) -> String {
        match self.config.comment_style {
            CommentStyle::Parentheses => {
                format!("({})", text.replace('(', "[").replace(')', "]"))
            }
            CommentStyle::Semicolon => format!("; {}", text),
        }
    }
}

/// Lazy line iterator returned by [`Emitter::emit_iter`].
pub struct EmitIter<I> {
    emitter: Emitter,
    state: ModalState,
    pending: Option<String>,
    inner: I,
}

impl<I> EmitIter<I> {
    /// Emitted state so far.
    pub fn state(&self) -> &ModalState {
        &self.state
    }
}

impl<I> Iterator for EmitIter<I>
where
    I: Iterator<Item = Instruction>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(line) = self.pending.take() {
            return Some(line);
        }
        loop {
            let instruction = self.inner.next()?;
            if let Some(line) = self.emitter.emit_instruction(&instruction, &mut self.state) {
                return Some(line);
            }
        }
    }
}

/// Format `value` with `precision` decimals, trimming trailing zeros.
pub fn format_number(value: f64, precision: usize) -> String {
    let mut text = format!("{:.*}", precision, value);
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::{ArcDirection, ProgramBuilder, Units};

    fn emitter() -> Emitter {
        Emitter::default()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.5, 3), "1.5");
        assert_eq!(format_number(2.0, 3), "2");
        assert_eq!(format_number(-0.0001, 3), "0");
        assert_eq!(format_number(0.12345, 3), "0.123");
        assert_eq!(format_number(-12.5, 0), "-12");
        assert_eq!(format_number(100.0, 0), "100");
    }

    #[test]
    fn test_minimal_output() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(0.0, 0.0, 5.0))
            .linear_z(-1.0, 100.0)
            .linear_to(Position::new(10.0, 0.0, -1.0), 300.0)
            .linear_to(Position::new(10.0, 10.0, -1.0), 300.0)
            .end();
        let output = emitter().emit(&b.build());
        assert_eq!(
            output.lines,
            vec!["G21 G17 G90", "Z5", "G1 Z-1 F100", "X10 F300", "Y10", "M2"]
        );
        assert_eq!(output.end_state.position, Position::new(10.0, 10.0, -1.0));
    }

    #[test]
    fn test_relative_mode_writes_deltas() {
        let mut start = ModalState::default();
        start.distance_mode = DistanceMode::Relative;
        let mut b = ProgramBuilder::new(start);
        b.rapid_to(Position::new(1.0004, 0.0, 0.0))
            .rapid_to(Position::new(2.0008, 0.0, 0.0));
        let output = emitter().emit(&b.build());
        assert_eq!(output.lines, vec!["G21 G17 G91", "X1", "X1.001"]);
        assert!((output.end_state.position.x - 2.001).abs() < 1e-12);
    }

    #[test]
    fn test_arc_always_has_center_words() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_to(Position::new(10.0, 0.0, 0.0)).arc_to(
            Position::new(10.0, 0.0, 0.0),
            Position::new(-10.0, 0.0, 0.0),
            ArcDirection::Clockwise,
            200.0,
        );
        let output = emitter().emit(&b.build());
        assert_eq!(output.lines[2], "G2 I-10 J0 F200");
    }

    #[test]
    fn test_arc_with_tiny_center_becomes_a_line() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.arc_to(
            Position::new(-0.0008, 0.0, 0.0),
            Position::new(-0.0004, 0.0, 0.0),
            ArcDirection::Clockwise,
            100.0,
        );
        let output = emitter().emit(&b.build());
        assert_eq!(output.lines[1], "G1 X-0.001 F100");

        let parsed = crate::parser::GcodeParser::default()
            .parse_str(&output.to_text(), ModalState::default());
        assert!(parsed.is_clean());
        assert!(parsed.end_state.approx_eq(&output.end_state, 1e-9));
    }

    #[test]
    fn test_spindle_tool_and_dwell() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.tool_change(3)
            .spindle(SpindleState::on(SpindleDirection::Clockwise, 12000.0))
            .spindle(SpindleState::on(SpindleDirection::Clockwise, 12000.0))
            .spindle(SpindleState::on(SpindleDirection::Clockwise, 8000.0))
            .dwell(1.5)
            .spindle(SpindleState::off(8000.0));
        let output = emitter().emit(&b.build());
        assert_eq!(
            output.lines,
            vec!["G21 G17 G90", "T3 M6", "M3 S12000", "S8000", "G4 P1.5", "M5"]
        );
    }

    #[test]
    fn test_laser_power_scaling() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.laser(LaserState::on(25.0, LaserMode::Dynamic))
            .laser(LaserState::on(50.0, LaserMode::Dynamic))
            .laser(LaserState::on(50.0, LaserMode::Dynamic).off());
        let output = emitter().emit(&b.build());
        assert_eq!(output.lines[1..], ["M4 S250", "S500", "M5"]);
    }

    #[test]
    fn test_comment_styles() {
        let program = MotionProgram::new(
            ModalState::default(),
            vec![
                Instruction::comment("setup (fixture)"),
                Instruction::rapid(Position::new(1.0, 0.0, 0.0)).with_comment("go"),
            ],
        );
        let parens = emitter().emit(&program);
        assert_eq!(parens.lines[1..], ["(setup [fixture])", "X1 (go)"]);

        let semicolon = Emitter::new(EmitterConfig {
            comment_style: CommentStyle::Semicolon,
            emit_preamble: false,
            ..EmitterConfig::default()
        })
        .emit(&program);
        assert_eq!(semicolon.lines, vec!["; setup (fixture)", "X1 ; go"]);
    }

    #[test]
    fn test_preamble_with_inch_start_and_feed() {
        let mut start = ModalState::with_units(Units::Inches);
        start.feed_rate = Some(20.0);
        let program = MotionProgram::empty(start);
        let output = emitter().emit(&program);
        assert_eq!(output.lines, vec!["G20 G17 G90 F20"]);
    }

    #[test]
    fn test_redundant_modal_is_skipped() {
        let program = MotionProgram::new(
            ModalState::default(),
            vec![
                Instruction::modal(ModalChange::Units(Units::Millimeters)),
                Instruction::modal(ModalChange::Distance(DistanceMode::Relative)),
            ],
        );
        let output = emitter().emit(&program);
        assert_eq!(output.lines, vec!["G21 G17 G90", "G91"]);
    }

    #[test]
    fn test_emit_iter_is_lazy_and_matches_emit() {
        let mut b = ProgramBuilder::new(ModalState::default());
        b.rapid_xy(5.0, 5.0).linear_z(-2.0, 50.0).rapid_z(3.0);
        let program = b.build();
        let eager = emitter().emit(&program).lines;
        let lazy: Vec<String> = emitter()
            .emit_iter(*program.start_state(), program.instructions().to_vec())
            .collect();
        assert_eq!(eager, lazy);
    }
}
