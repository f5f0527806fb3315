//! G-code parser with explicit modal state threading
//!
//! Lines are turned into [`Instruction`]s against a running [`ModalState`]
//! that the caller passes in and gets back. Lines outside the recognized
//! subset are kept as [`InstructionKind::RawPassthrough`]; malformed numbers
//! on recognized lines are collected as [`ParseError`]s and parsing goes on.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use millkit_core::{
    ArcDirection, ArcGeometry, Axis, DistanceMode, Instruction, InstructionKind, LaserMode,
    LaserState, ModalChange, ModalState, MotionKind, MotionMode, MotionProgram, Move, ParseError,
    Plane, Position, SpindleDirection, SpindleState, Units, EPSILON,
};

/// Parser configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Interpret M3/M4/M5 and S as laser commands instead of spindle commands
    pub laser_mode: bool,
    /// S value that corresponds to 100% laser power
    pub laser_max: f64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            laser_mode: false,
            laser_max: 1000.0,
        }
    }
}

/// Result of parsing a whole text.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    /// Best-effort program, including raw passthrough for rejected lines
    pub program: MotionProgram,
    /// Line errors, in source order
    pub errors: Vec<ParseError>,
    /// Modal state after the last line
    pub end_state: ModalState,
}

impl ParseOutput {
    /// True when no line produced an error.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The program, or every collected error if there was any.
    pub fn into_strict(self) -> Result<MotionProgram, Vec<ParseError>> {
        if self.errors.is_empty() {
            Ok(self.program)
        } else {
            Err(self.errors)
        }
    }
}

/// Outcome of classifying one line.
enum LineKind {
    /// Nothing but whitespace
    Empty,
    /// Outside the recognized subset; keep verbatim
    Passthrough,
    /// Recognized words to interpret
    Words(Vec<Word>),
}

#[derive(Debug, Clone, Copy)]
struct Word {
    letter: char,
    value: f64,
}

/// Words collected from one line, grouped by meaning.
#[derive(Debug, Default)]
struct LineWords {
    motion: Option<MotionMode>,
    dwell: bool,
    units: Option<Units>,
    plane: Option<Plane>,
    distance: Option<DistanceMode>,
    spindle_on: Option<SpindleDirection>,
    spindle_off: bool,
    tool_change: bool,
    program_end: Option<bool>,
    axes: [Option<f64>; 3],
    centers: [Option<f64>; 3],
    radius: Option<f64>,
    feed: Option<f64>,
    speed: Option<f64>,
    tool: Option<u32>,
    p: Option<f64>,
}

impl LineWords {
    fn has_axes(&self) -> bool {
        self.axes.iter().any(Option::is_some)
    }

    fn has_center(&self) -> bool {
        self.centers.iter().any(Option::is_some) || self.radius.is_some()
    }
}

/// G-code parser
#[derive(Debug, Clone, Default)]
pub struct GcodeParser {
    config: ParserConfig,
}

impl GcodeParser {
    /// Create a new G-code parser
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a block of text starting from `start`.
    pub fn parse_str(&self, text: &str, start: ModalState) -> ParseOutput {
        self.parse_lines(text.lines(), start)
    }

    /// Parse a sequence of lines starting from `start`.
    ///
    /// Line numbers are 1-based positions in the sequence.
    pub fn parse_lines<I, S>(&self, lines: I, start: ModalState) -> ParseOutput
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = start;
        let mut instructions = Vec::new();
        let mut errors = Vec::new();

        for (index, line) in lines.into_iter().enumerate() {
            let line_number = (index + 1) as u32;
            let line = line.as_ref();
            match self.parse_line(line_number, line, &state) {
                Ok((produced, next)) => {
                    instructions.extend(produced);
                    state = next;
                }
                Err(err) => {
                    tracing::warn!("{}", err);
                    instructions.push(Instruction::raw(line.trim()).with_line(line_number));
                    errors.push(err);
                }
            }
        }

        tracing::debug!(
            "Parsed {} instructions with {} errors",
            instructions.len(),
            errors.len()
        );

        ParseOutput {
            program: MotionProgram::new(start, instructions),
            errors,
            end_state: state,
        }
    }

    /// Parse one line against `state`.
    ///
    /// Returns the produced instructions and the state after them. On error
    /// the caller's state is untouched.
    pub fn parse_line(
        &self,
        line_number: u32,
        line: &str,
        state: &ModalState,
    ) -> Result<(Vec<Instruction>, ModalState), ParseError> {
        let text = line.trim();
        let (code, comment) = split_comment(text);

        let words = match classify(&code, line_number, text)? {
            LineKind::Empty => {
                let produced = comment
                    .map(|c| Instruction::comment(c).with_line(line_number))
                    .into_iter()
                    .collect();
                return Ok((produced, *state));
            }
            LineKind::Passthrough => {
                tracing::debug!("Line {} kept as raw passthrough: {}", line_number, text);
                let raw = Instruction::raw(text).with_line(line_number);
                return Ok((vec![raw], *state));
            }
            LineKind::Words(words) => words,
        };

        let grouped = match group_words(&words, line_number, text)? {
            Some(grouped) => grouped,
            None => {
                tracing::debug!("Line {} kept as raw passthrough: {}", line_number, text);
                let raw = Instruction::raw(text).with_line(line_number);
                return Ok((vec![raw], *state));
            }
        };

        let mut next = *state;
        let mut produced = self.interpret(&grouped, &mut next, line_number, text)?;
        for instr in produced.iter_mut() {
            instr.line_number = Some(line_number);
        }

        if let Some(comment) = comment {
            match produced.last_mut() {
                Some(last) => last.comment = Some(comment),
                None => produced.push(Instruction::comment(comment).with_line(line_number)),
            }
        }

        Ok((produced, next))
    }

    fn interpret(
        &self,
        words: &LineWords,
        state: &mut ModalState,
        line_number: u32,
        line: &str,
    ) -> Result<Vec<Instruction>, ParseError> {
        let err = |reason: String| ParseError::new(line_number, line, reason);
        let mut out = Vec::new();
        let push = |out: &mut Vec<Instruction>, state: &mut ModalState, instr: Instruction| {
            state.apply(&instr);
            out.push(instr);
        };

        // Modal groups take effect before any coordinate word on the line.
        if let Some(units) = words.units {
            push(&mut out, state, Instruction::modal(ModalChange::Units(units)));
        }
        if let Some(plane) = words.plane {
            push(&mut out, state, Instruction::modal(ModalChange::Plane(plane)));
        }
        if let Some(distance) = words.distance {
            push(&mut out, state, Instruction::modal(ModalChange::Distance(distance)));
        }

        if let Some(tool) = words.tool {
            push(&mut out, state, tool_change(tool));
        } else if words.tool_change {
            let tool = state
                .tool
                .ok_or_else(|| err("M6 without a selected tool".to_string()))?;
            push(&mut out, state, tool_change(tool));
        }

        if words.spindle_on.is_some() || words.speed.is_some() {
            let instr = self.spindle_on(words, state, &err)?;
            push(&mut out, state, instr);
        }

        if words.dwell {
            let seconds = words
                .p
                .ok_or_else(|| err("G4 requires a P word".to_string()))?;
            if seconds < 0.0 {
                return Err(err(format!("negative dwell P{}", seconds)));
            }
            push(&mut out, state, Instruction::new(InstructionKind::Dwell { seconds }));
        }

        let mode = words.motion.unwrap_or(state.motion);
        let is_arc = mode.arc_direction().is_some();
        if words.has_axes() || (is_arc && words.has_center()) {
            let mv = resolve_move(words, mode, state).map_err(err)?;
            push(&mut out, state, Instruction::new(InstructionKind::Move(mv)));
        } else {
            if words.has_center() {
                return Err(err("arc center words without an arc move".to_string()));
            }
            if let Some(motion) = words.motion {
                push(&mut out, state, Instruction::modal(ModalChange::Motion(motion)));
            }
            if let Some(feed) = words.feed {
                push(&mut out, state, Instruction::modal(ModalChange::Feed(feed)));
            }
        }

        if words.spindle_off {
            let instr = if self.config.laser_mode {
                Instruction::new(InstructionKind::Laser(state.laser.off()))
            } else {
                Instruction::new(InstructionKind::Spindle(SpindleState::off(
                    state.spindle.speed,
                )))
            };
            push(&mut out, state, instr);
        }

        if let Some(rewind) = words.program_end {
            push(
                &mut out,
                state,
                Instruction::new(InstructionKind::ProgramEnd { rewind }),
            );
        }

        Ok(out)
    }

    fn spindle_on(
        &self,
        words: &LineWords,
        state: &ModalState,
        err: &dyn Fn(String) -> ParseError,
    ) -> Result<Instruction, ParseError> {
        if self.config.laser_mode {
            let power_percent = match words.speed {
                Some(s) => {
                    if s > self.config.laser_max {
                        return Err(err(format!(
                            "laser power S{} exceeds maximum {}",
                            s, self.config.laser_max
                        )));
                    }
                    s / self.config.laser_max * 100.0
                }
                None => state.laser.power_percent,
            };
            let laser = match words.spindle_on {
                Some(SpindleDirection::Clockwise) => LaserState::on(power_percent, LaserMode::Constant),
                Some(SpindleDirection::CounterClockwise) => {
                    LaserState::on(power_percent, LaserMode::Dynamic)
                }
                _ => LaserState {
                    power_percent,
                    ..state.laser
                },
            };
            Ok(Instruction::new(InstructionKind::Laser(laser)))
        } else {
            let speed = words.speed.unwrap_or(state.spindle.speed);
            let direction = words.spindle_on.unwrap_or(state.spindle.direction);
            Ok(Instruction::new(InstructionKind::Spindle(SpindleState {
                direction,
                speed,
            })))
        }
    }
}

fn tool_change(tool: u32) -> Instruction {
    Instruction::new(InstructionKind::ToolChange { tool })
}

/// Split a line into its code part and joined comment text.
fn split_comment(line: &str) -> (String, Option<String>) {
    static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = COMMENT_REGEX
        .get_or_init(|| Regex::new(r"\(([^)]*)(?:\)|$)|;(.*)$").expect("invalid regex pattern"));

    let comments: Vec<&str> = regex
        .captures_iter(line)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .filter(|text| !text.is_empty())
        .collect();
    let code = regex.replace_all(line, " ").to_string();

    let comment = if comments.is_empty() {
        None
    } else {
        Some(comments.join(" "))
    };
    (code, comment)
}

/// Tokenize the code part of a line into words.
fn classify(code: &str, line_number: u32, line: &str) -> Result<LineKind, ParseError> {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        WORD_REGEX.get_or_init(|| Regex::new(r"([A-Za-z])([^A-Za-z]*)").expect("invalid regex pattern"));

    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(LineKind::Empty);
    }
    let well_formed = compact.starts_with(|c: char| c.is_ascii_alphabetic())
        && compact
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-'));
    if !well_formed {
        return Ok(LineKind::Passthrough);
    }

    let mut raw_words = Vec::new();
    for caps in regex.captures_iter(&compact) {
        let letter = caps[1].chars().next().unwrap_or(' ').to_ascii_uppercase();
        if !"GMXYZIJKRFSTPN".contains(letter) {
            return Ok(LineKind::Passthrough);
        }
        raw_words.push((letter, caps[2].to_string()));
    }

    let mut words = Vec::with_capacity(raw_words.len());
    for (letter, raw) in raw_words {
        let value = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ParseError::new(
                    line_number,
                    line,
                    format!("invalid number '{}' for {}", raw, letter),
                )
            })?;
        words.push(Word { letter, value });
    }
    Ok(LineKind::Words(words))
}

/// Integral code value of a G or M word, if it has one.
fn code_value(value: f64) -> Option<u8> {
    if value.fract() == 0.0 && (0.0..=255.0).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// Group words by meaning. `Ok(None)` means an unknown G/M code.
fn group_words(
    words: &[Word],
    line_number: u32,
    line: &str,
) -> Result<Option<LineWords>, ParseError> {
    let err = |reason: String| ParseError::new(line_number, line, reason);
    let mut grouped = LineWords::default();

    fn set<T>(slot: &mut Option<T>, value: T, letter: char) -> Result<(), String> {
        if slot.is_some() {
            return Err(format!("{} word repeated", letter));
        }
        *slot = Some(value);
        Ok(())
    }

    for word in words {
        let letter = word.letter;
        match letter {
            'G' => {
                let Some(code) = code_value(word.value) else {
                    return Ok(None);
                };
                if let Some(mode) = MotionMode::from_gcode(code) {
                    set(&mut grouped.motion, mode, letter)
                        .map_err(|_| err("conflicting motion words".to_string()))?;
                } else if code == 4 {
                    grouped.dwell = true;
                } else if let Some(plane) = Plane::from_gcode(code) {
                    set(&mut grouped.plane, plane, letter).map_err(err)?;
                } else if let Some(units) = Units::from_gcode(code) {
                    set(&mut grouped.units, units, letter).map_err(err)?;
                } else if let Some(distance) = DistanceMode::from_gcode(code) {
                    set(&mut grouped.distance, distance, letter).map_err(err)?;
                } else {
                    return Ok(None);
                }
            }
            'M' => match code_value(word.value) {
                Some(3) => set(&mut grouped.spindle_on, SpindleDirection::Clockwise, letter)
                    .map_err(|_| err("conflicting spindle words".to_string()))?,
                Some(4) => {
                    set(&mut grouped.spindle_on, SpindleDirection::CounterClockwise, letter)
                        .map_err(|_| err("conflicting spindle words".to_string()))?
                }
                Some(5) => grouped.spindle_off = true,
                Some(6) => grouped.tool_change = true,
                Some(2) => grouped.program_end = Some(false),
                Some(30) => grouped.program_end = Some(true),
                _ => return Ok(None),
            },
            'X' => set(&mut grouped.axes[0], word.value, letter).map_err(err)?,
            'Y' => set(&mut grouped.axes[1], word.value, letter).map_err(err)?,
            'Z' => set(&mut grouped.axes[2], word.value, letter).map_err(err)?,
            'I' => set(&mut grouped.centers[0], word.value, letter).map_err(err)?,
            'J' => set(&mut grouped.centers[1], word.value, letter).map_err(err)?,
            'K' => set(&mut grouped.centers[2], word.value, letter).map_err(err)?,
            'R' => set(&mut grouped.radius, word.value, letter).map_err(err)?,
            'F' => {
                if word.value <= 0.0 {
                    return Err(err(format!("feed rate must be positive, got F{}", word.value)));
                }
                set(&mut grouped.feed, word.value, letter).map_err(err)?
            }
            'S' => {
                if word.value < 0.0 {
                    return Err(err(format!("negative S{}", word.value)));
                }
                set(&mut grouped.speed, word.value, letter).map_err(err)?
            }
            'T' => {
                let valid = word.value.fract() == 0.0
                    && word.value >= 0.0
                    && word.value <= f64::from(u32::MAX);
                if !valid {
                    return Err(err(format!("invalid tool number T{}", word.value)));
                }
                let tool = word.value as u32;
                set(&mut grouped.tool, tool, letter).map_err(err)?
            }
            'P' => set(&mut grouped.p, word.value, letter).map_err(err)?,
            // Block numbers carry no meaning for the motion model.
            'N' => {}
            _ => return Ok(None),
        }
    }

    if grouped.spindle_on.is_some() && grouped.spindle_off {
        return Err(err("conflicting spindle words".to_string()));
    }

    Ok(Some(grouped))
}

/// Resolve axis words against the running position.
fn resolve_target(words: &LineWords, state: &ModalState) -> Position {
    Axis::ALL
        .iter()
        .zip(words.axes.iter())
        .fold(state.position, |target, (axis, word)| match word {
            Some(value) => match state.distance_mode {
                DistanceMode::Absolute => target.with(*axis, *value),
                DistanceMode::Relative => target.with(*axis, state.position.get(*axis) + value),
            },
            None => target,
        })
}

fn resolve_move(words: &LineWords, mode: MotionMode, state: &ModalState) -> Result<Move, String> {
    let target = resolve_target(words, state);
    let motion = match mode.arc_direction() {
        None => {
            if words.has_center() {
                return Err("arc center words without an arc move".to_string());
            }
            if mode == MotionMode::Rapid {
                MotionKind::Rapid
            } else {
                MotionKind::Linear
            }
        }
        Some(direction) => {
            let center = match words.radius {
                Some(radius) => radius_center(state.position, target, radius, direction, state.plane)?,
                None => {
                    let [a, b] = state.plane.center_axes();
                    let idx = |axis: Axis| match axis {
                        Axis::X => 0,
                        Axis::Y => 1,
                        Axis::Z => 2,
                    };
                    if words.centers[idx(a)].is_none() && words.centers[idx(b)].is_none() {
                        return Err(format!(
                            "arc needs {} or {} center words in the active plane",
                            a.center_letter(),
                            b.center_letter()
                        ));
                    }
                    Position::ZERO
                        .with(a, words.centers[idx(a)].unwrap_or(0.0))
                        .with(b, words.centers[idx(b)].unwrap_or(0.0))
                }
            };
            if ArcGeometry::resolve(state.position, target, center, direction, state.plane)
                .is_none()
            {
                return Err("arc has zero radius".to_string());
            }
            MotionKind::Arc { direction, center }
        }
    };

    Ok(Move {
        target,
        motion,
        feed: words.feed,
    })
}

/// Center offset of an R-form arc. Negative `radius` selects the long arc.
fn radius_center(
    start: Position,
    end: Position,
    radius: f64,
    direction: ArcDirection,
    plane: Plane,
) -> Result<Position, String> {
    let (a, b) = plane.axes();
    let da = end.get(a) - start.get(a);
    let db = end.get(b) - start.get(b);
    let chord = da.hypot(db);
    if chord <= EPSILON {
        return Err("R-form arc cannot describe a full circle".to_string());
    }
    let r = radius.abs();
    if r <= EPSILON || chord > 2.0 * r + EPSILON {
        return Err(format!("radius R{} too small for chord {:.4}", radius, chord));
    }

    let h = (r * r - chord * chord / 4.0).max(0.0).sqrt();
    let side = match direction {
        ArcDirection::CounterClockwise => 1.0,
        ArcDirection::Clockwise => -1.0,
    } * radius.signum();
    let (na, nb) = (-db / chord, da / chord);
    let ca = da / 2.0 + na * h * side;
    let cb = db / 2.0 + nb * h * side;
    Ok(Position::ZERO.with(a, ca).with(b, cb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseOutput {
        GcodeParser::default().parse_str(text, ModalState::default())
    }

    fn moves(output: &ParseOutput) -> Vec<Move> {
        output
            .program
            .iter()
            .filter_map(|i| i.as_move().copied())
            .collect()
    }

    #[test]
    fn test_parse_linear_moves() {
        let output = parse("G0 X10 Y10\nG1 X20 F500\nY20");
        assert!(output.is_clean());
        let mv = moves(&output);
        assert_eq!(mv.len(), 3);
        assert_eq!(mv[0].target, Position::new(10.0, 10.0, 0.0));
        assert!(mv[0].motion.is_rapid());
        assert_eq!(mv[1].feed, Some(500.0));
        assert_eq!(mv[2].target, Position::new(20.0, 20.0, 0.0));
        assert_eq!(mv[2].motion, MotionKind::Linear);
        assert_eq!(output.end_state.feed_rate, Some(500.0));
    }

    #[test]
    fn test_modal_words_apply_before_coordinates() {
        let output = parse("G0 X5 Y5\nG91 G0 X1 Y-1");
        let mv = moves(&output);
        assert_eq!(mv[1].target, Position::new(6.0, 4.0, 0.0));
        assert_eq!(output.end_state.distance_mode, DistanceMode::Relative);
    }

    #[test]
    fn test_units_switch() {
        let output = parse("G1 X25.4 F100\nG20\nG1 X2");
        let end = output.end_state;
        assert_eq!(end.units, Units::Inches);
        assert_eq!(end.position.x, 2.0);
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        let output = parse("G54\nM8\n%\nG1 A10\n#1=5");
        assert!(output.is_clean());
        let raw: Vec<&str> = output
            .program
            .iter()
            .filter_map(|i| match &i.kind {
                InstructionKind::RawPassthrough(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(raw, vec!["G54", "M8", "%", "G1 A10", "#1=5"]);
    }

    #[test]
    fn test_numeric_error_is_collected() {
        let output = parse("G1 X1.2.3\nG1 X5 F100");
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].line_number, 1);
        assert_eq!(output.program.len(), 2);
        assert_eq!(output.end_state.position.x, 5.0);
    }

    #[test]
    fn test_comments() {
        let output = parse("(header)\nG0 X1 ; go\nG0 X2 (first) (second)");
        let instrs = output.program.instructions();
        assert_eq!(instrs[0].kind, InstructionKind::Comment("header".to_string()));
        assert_eq!(instrs[1].comment.as_deref(), Some("go"));
        assert_eq!(instrs[2].comment.as_deref(), Some("first second"));
    }

    #[test]
    fn test_arc_ijk_and_full_circle() {
        let output = parse("G0 X10 Y0\nG2 X0 Y-10 I-10 J0 F200\nG2 I0 J10");
        assert!(output.is_clean());
        let mv = moves(&output);
        assert_eq!(
            mv[1].motion,
            MotionKind::Arc {
                direction: ArcDirection::Clockwise,
                center: Position::new(-10.0, 0.0, 0.0)
            }
        );
        assert_eq!(mv[2].target, Position::new(0.0, -10.0, 0.0));
    }

    #[test]
    fn test_arc_radius_form() {
        let output = parse("G0 X10 Y0\nG3 X0 Y10 R10 F100");
        let mv = moves(&output);
        match mv[1].motion {
            MotionKind::Arc { center, .. } => {
                assert!(center.approx_eq(Position::new(-10.0, 0.0, 0.0), 1e-9));
            }
            other => panic!("expected arc, got {:?}", other),
        }
    }

    #[test]
    fn test_arc_without_center_is_error() {
        let output = parse("G2 X10 Y0 F100");
        assert_eq!(output.errors.len(), 1);
    }

    #[test]
    fn test_spindle_and_tool() {
        let output = parse("T2 M6\nM3 S12000\nG4 P1.5\nM5\nM30");
        assert!(output.is_clean());
        let kinds: Vec<&InstructionKind> = output.program.iter().map(|i| &i.kind).collect();
        assert_eq!(kinds[0], &InstructionKind::ToolChange { tool: 2 });
        assert_eq!(
            kinds[1],
            &InstructionKind::Spindle(SpindleState::on(SpindleDirection::Clockwise, 12000.0))
        );
        assert_eq!(kinds[2], &InstructionKind::Dwell { seconds: 1.5 });
        assert_eq!(kinds[3], &InstructionKind::Spindle(SpindleState::off(12000.0)));
        assert_eq!(kinds[4], &InstructionKind::ProgramEnd { rewind: true });
    }

    #[test]
    fn test_laser_mode() {
        let parser = GcodeParser::new(ParserConfig {
            laser_mode: true,
            laser_max: 1000.0,
        });
        let output = parser.parse_str("M4 S250\nG1 X10 F600\nS500\nM5", ModalState::default());
        assert!(output.is_clean());
        let lasers: Vec<LaserState> = output
            .program
            .iter()
            .filter_map(|i| match i.kind {
                InstructionKind::Laser(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(lasers[0], LaserState::on(25.0, LaserMode::Dynamic));
        assert_eq!(lasers[1], LaserState::on(50.0, LaserMode::Dynamic));
        assert!(!lasers[2].enabled);
        assert_eq!(lasers[2].power_percent, 50.0);
    }

    #[test]
    fn test_line_numbers_and_block_numbers() {
        let output = parse("\nN10 G0 X1\n\nN20 G1 X2 F10");
        let lines: Vec<Option<u32>> = output.program.iter().map(|i| i.line_number).collect();
        assert_eq!(lines, vec![Some(2), Some(4)]);
    }

    #[test]
    fn test_m6_without_tool_is_error() {
        let output = parse("M6");
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].reason.contains("M6"));
    }

    #[test]
    fn test_parse_line_leaves_state_on_error() {
        let parser = GcodeParser::default();
        let state = ModalState::default();
        assert!(parser.parse_line(1, "G1 X1 X2", &state).is_err());
        let (instrs, next) = parser.parse_line(1, "g1 x1 f100", &state).unwrap();
        assert_eq!(instrs.len(), 1);
        assert_eq!(next.position.x, 1.0);
    }
}
