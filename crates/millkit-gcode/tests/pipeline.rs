use proptest::prelude::*;
use std::sync::Arc;

use millkit_core::{ArcDirection, ModalState, MotionProgram, Position, ProgramBuilder};
use millkit_gcode::query::{self, TimeEstimateConfig};
use millkit_gcode::{
    FeedOverride, Pass, PassSpec, ReorderPaths, Scale, TransformPipeline, Translate,
};

fn contour() -> MotionProgram {
    let mut b = ProgramBuilder::new(ModalState::default());
    b.rapid_to(Position::new(0.0, 0.0, 5.0))
        .linear_z(-1.0, 100.0)
        .linear_to(Position::new(40.0, 0.0, -1.0), 400.0)
        .arc_to(
            Position::new(50.0, 10.0, -1.0),
            Position::new(0.0, 10.0, 0.0),
            ArcDirection::CounterClockwise,
            400.0,
        )
        .linear_to(Position::new(50.0, 30.0, -1.0), 400.0)
        .rapid_z(5.0)
        .end();
    b.build()
}

fn targets(program: &MotionProgram) -> Vec<Position> {
    program
        .iter()
        .filter_map(|i| i.as_move().map(|m| m.target))
        .collect()
}

#[test]
fn test_identity_passes_return_input() {
    let program = contour();
    let identities: Vec<Arc<dyn Pass>> = vec![
        Arc::new(Translate::new(Position::ZERO)),
        Arc::new(Scale::uniform(1.0).unwrap()),
        Arc::new(FeedOverride::new(100.0).unwrap()),
    ];
    for pass in identities {
        let once = pass.apply(&program).unwrap();
        assert_eq!(once, program, "{} changed the program", pass.name());
        assert_eq!(pass.apply(&once).unwrap(), once);
    }
}

#[test]
fn test_pipeline_from_json_specs() {
    let specs: Vec<PassSpec> = serde_json::from_str(
        r#"[
            {"pass": "scale", "factors": {"x": 2.0, "y": 2.0, "z": 1.0}},
            {"pass": "translate", "offset": {"x": 10.0, "y": 0.0, "z": 0.0}},
            {"pass": "feed_override", "percent": 50.0}
        ]"#,
    )
    .unwrap();
    let pipeline = TransformPipeline::from_specs(&specs).unwrap();
    assert_eq!(pipeline.pass_count(), 3);

    let out = pipeline.run(&contour()).unwrap();
    let last = targets(&out)[4];
    assert!(last.approx_eq(Position::new(110.0, 60.0, -1.0), 1e-9));
    assert_eq!(out.end_state().feed_rate, Some(200.0));
    // Arc centers scale with the targets.
    let bbox = query::bounding_box(&out).unwrap();
    assert!(bbox.max.approx_eq(Position::new(110.0, 60.0, 5.0), 1e-9));
}

#[test]
fn test_failing_pass_aborts_pipeline() {
    let mut pipeline = TransformPipeline::new();
    pipeline
        .register(Arc::new(
            Scale::new(Position::new(2.0, 1.0, 1.0), Position::ZERO).unwrap(),
        ))
        .register(Arc::new(ReorderPaths::new(5.0)));
    let err = pipeline.run(&contour()).unwrap_err();
    assert!(err.is_geometry_error());
}

#[test]
fn test_queries_are_deterministic() {
    let program = contour();
    let config = TimeEstimateConfig::default();
    let first = (
        query::bounding_box(&program),
        query::path_length(&program, 0.01).unwrap(),
        query::estimated_time(&program, &config).unwrap(),
    );
    for _ in 0..3 {
        let again = (
            query::bounding_box(&program),
            query::path_length(&program, 0.01).unwrap(),
            query::estimated_time(&program, &config).unwrap(),
        );
        assert_eq!(again, first);
    }
}

proptest! {
    #[test]
    fn scaling_composes(a in 0.1..10.0f64, b in 0.1..10.0f64) {
        let program = contour();
        let twice = Scale::uniform(b)
            .unwrap()
            .apply(&Scale::uniform(a).unwrap().apply(&program).unwrap())
            .unwrap();
        let once = Scale::uniform(a * b).unwrap().apply(&program).unwrap();

        for (p, q) in targets(&twice).into_iter().zip(targets(&once)) {
            let tolerance = 1e-9 * (1.0 + q.norm());
            prop_assert!(p.approx_eq(q, tolerance), "{} != {}", p, q);
        }
        let length = query::path_length(&twice, 0.0).unwrap().total();
        let expected = query::path_length(&program, 0.0).unwrap().total() * a * b;
        prop_assert!((length - expected).abs() <= 1e-6 * expected);
    }

    #[test]
    fn translation_round_trips(dx in -100.0..100.0f64, dy in -100.0..100.0f64) {
        let program = contour();
        let there = Translate::new(Position::new(dx, dy, 0.0)).apply(&program).unwrap();
        let back = Translate::new(Position::new(-dx, -dy, 0.0)).apply(&there).unwrap();
        for (p, q) in targets(&back).into_iter().zip(targets(&program)) {
            prop_assert!(p.approx_eq(q, 1e-9));
        }
    }
}
