use proptest::prelude::*;

use millkit_core::{
    ArcDirection, DistanceMode, Instruction, InstructionKind, LaserMode, LaserState, ModalChange,
    ModalState, MotionProgram, Position, SpindleDirection, SpindleState, Units,
};
use millkit_gcode::{Emitter, EmitterConfig, GcodeParser, ParserConfig};

#[derive(Debug, Clone)]
enum Step {
    Rapid(Position),
    Linear(Position, Option<f64>),
    /// Arc from the current position: radius, angle of the start point and
    /// of the end point around the center
    Arc {
        radius: f64,
        from: f64,
        to: f64,
        direction: ArcDirection,
        feed: Option<f64>,
    },
    Spindle(f64),
    SpindleOff,
    Laser(f64, LaserMode),
    LaserOff,
    Distance(DistanceMode),
    Dwell(f64),
    Tool(u32),
    Comment(String),
}

fn coord() -> impl Strategy<Value = f64> {
    -500.0..500.0f64
}

fn position() -> impl Strategy<Value = Position> {
    (coord(), coord(), -50.0..50.0f64).prop_map(|(x, y, z)| Position::new(x, y, z))
}

fn feed() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(1.0..5000.0f64)
}

fn motion_step() -> impl Strategy<Value = Step> {
    let angle = 0.0..std::f64::consts::TAU;
    let direction = prop_oneof![
        Just(ArcDirection::Clockwise),
        Just(ArcDirection::CounterClockwise)
    ];
    prop_oneof![
        position().prop_map(Step::Rapid),
        (position(), feed()).prop_map(|(p, f)| Step::Linear(p, f)),
        (1.0..20.0f64, angle.clone(), angle, direction, feed()).prop_map(
            |(radius, from, to, direction, feed)| Step::Arc {
                radius,
                from,
                to,
                direction,
                feed,
            }
        ),
        prop_oneof![Just(DistanceMode::Absolute), Just(DistanceMode::Relative)]
            .prop_map(Step::Distance),
        (0.0..10.0f64).prop_map(Step::Dwell),
        (1u32..20).prop_map(Step::Tool),
        "[a-z]{1,12}".prop_map(Step::Comment),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => motion_step(),
        1 => (0.0..24000.0f64).prop_map(Step::Spindle),
        1 => Just(Step::SpindleOff),
    ]
}

fn laser_step() -> impl Strategy<Value = Step> {
    let mode = prop_oneof![Just(LaserMode::Constant), Just(LaserMode::Dynamic)];
    prop_oneof![
        3 => motion_step(),
        1 => (0.0..100.0f64, mode).prop_map(|(power, mode)| Step::Laser(power, mode)),
        1 => Just(Step::LaserOff),
    ]
}

fn build(units: Units, steps: &[Step]) -> MotionProgram {
    let start = ModalState::default();
    let mut instructions = vec![Instruction::modal(ModalChange::Units(units))];
    let mut has_feed = false;
    let mut current = start.position;
    let mut laser = start.laser;
    // A feed move needs an active feed rate.
    let mut feed_word = |feed: Option<f64>| {
        let feed = if has_feed { feed } else { feed.or(Some(100.0)) };
        has_feed = true;
        feed
    };
    for step in steps {
        let instruction = match step {
            Step::Rapid(p) => {
                current = *p;
                Instruction::rapid(*p)
            }
            Step::Linear(p, feed) => {
                current = *p;
                Instruction::linear(*p, feed_word(*feed))
            }
            Step::Arc {
                radius,
                from,
                to,
                direction,
                feed,
            } => {
                let offset = Position::new(-radius * from.cos(), -radius * from.sin(), 0.0);
                let center = current + offset;
                let target = Position::new(
                    center.x + radius * to.cos(),
                    center.y + radius * to.sin(),
                    current.z,
                );
                current = target;
                Instruction::arc(target, *direction, offset, feed_word(*feed))
            }
            Step::Spindle(speed) => Instruction::new(InstructionKind::Spindle(SpindleState::on(
                SpindleDirection::Clockwise,
                *speed,
            ))),
            Step::SpindleOff => Instruction::new(InstructionKind::Spindle(SpindleState::off(0.0))),
            Step::Laser(power, mode) => {
                laser = LaserState::on(*power, *mode);
                Instruction::new(InstructionKind::Laser(laser))
            }
            Step::LaserOff => {
                laser = laser.off();
                Instruction::new(InstructionKind::Laser(laser))
            }
            Step::Distance(mode) => Instruction::modal(ModalChange::Distance(*mode)),
            Step::Dwell(seconds) => Instruction::new(InstructionKind::Dwell { seconds: *seconds }),
            Step::Tool(tool) => Instruction::new(InstructionKind::ToolChange { tool: *tool }),
            Step::Comment(text) => Instruction::comment(text.clone()),
        };
        instructions.push(instruction);
    }
    MotionProgram::new(start, instructions)
}

fn units() -> impl Strategy<Value = Units> {
    prop_oneof![Just(Units::Millimeters), Just(Units::Inches)]
}

fn laser_parser() -> GcodeParser {
    GcodeParser::new(ParserConfig {
        laser_mode: true,
        laser_max: EmitterConfig::default().laser_max,
    })
}

proptest! {
    #[test]
    fn emitted_text_parses_back_to_the_same_state(
        units in units(),
        steps in prop::collection::vec(step(), 0..40),
    ) {
        let program = build(units, &steps);
        let text = Emitter::new(EmitterConfig::default()).emit(&program).to_text();
        let parsed = GcodeParser::new(ParserConfig::default()).parse_str(&text, ModalState::default());

        prop_assert!(parsed.errors.is_empty(), "errors: {:?}\n{}", parsed.errors, text);
        let expected = program.end_state();
        prop_assert!(
            parsed.end_state.approx_eq(&expected, 1e-3),
            "parsed {:?}\nexpected {:?}\n{}",
            parsed.end_state,
            expected,
            text
        );
    }

    #[test]
    fn reemitting_a_parsed_program_is_stable(steps in prop::collection::vec(step(), 0..40)) {
        let emitter = Emitter::new(EmitterConfig::default());
        let parser = GcodeParser::new(ParserConfig::default());
        let first = emitter.emit(&build(Units::Millimeters, &steps)).to_text();
        let parsed = parser.parse_str(&first, ModalState::default());
        let second = emitter.emit(&parsed.program).to_text();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn laser_programs_parse_back_to_the_same_state(
        units in units(),
        steps in prop::collection::vec(laser_step(), 0..40),
    ) {
        let program = build(units, &steps);
        let emitter = Emitter::new(EmitterConfig::default());
        let first = emitter.emit(&program).to_text();
        let parsed = laser_parser().parse_str(&first, ModalState::default());

        prop_assert!(parsed.errors.is_empty(), "errors: {:?}\n{}", parsed.errors, first);
        let expected = program.end_state();
        prop_assert!(
            parsed.end_state.approx_eq(&expected, 1e-3),
            "parsed {:?}\nexpected {:?}\n{}",
            parsed.end_state,
            expected,
            first
        );
        let second = emitter.emit(&parsed.program).to_text();
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_round_trip_of_hand_written_program() {
    let text = "\
G21 G17 G90
(facing pass)
T1 M6
M3 S12000
G0 X0 Y0 Z5
G1 Z-1 F100
X50 F600 ; first row
G2 X60 Y10 I0 J10
G91 Y5
G90
G4 P0.5
M5
M2
";
    let parser = GcodeParser::new(ParserConfig::default());
    let first = parser.parse_str(text, ModalState::default());
    assert!(first.is_clean());

    let emitted = Emitter::new(EmitterConfig::default()).emit(&first.program);
    let second = parser.parse_str(&emitted.to_text(), ModalState::default());
    assert!(second.is_clean());
    assert!(second.end_state.approx_eq(&first.end_state, 1e-3));
    assert_eq!(second.end_state.position, Position::new(60.0, 15.0, -1.0));
}
