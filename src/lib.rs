//! # millkit
//!
//! A toolkit for machine-tool motion programs:
//! - Parse G-code into a typed motion model and emit it back
//! - Transform programs with composable passes (translate, scale, rotate,
//!   feed overrides, arc linearization, multipass, path reordering, ...)
//! - Compile bore and face operations from part features
//! - Generate test patterns for spindle and laser machines
//! - Query bounds, path length, time estimates and feed/power/Z summaries
//!
//! ## Architecture
//!
//! millkit is organized as a workspace with multiple crates:
//!
//! 1. **millkit-core** - Motion model, units, geometry, tools, stock and errors
//! 2. **millkit-gcode** - Parser, emitter, transform pipeline and queries
//! 3. **millkit-camtools** - Machining operations and test patterns
//! 4. **millkit-settings** - Configuration files and defaults
//! 5. **millkit** - This facade, plus logging setup

pub use millkit_core::{
    Anchor, ArcDirection, Axis, BoundingBox, DistanceMode, Error, Instruction, InstructionKind,
    LaserMode, LaserState, ModalChange, ModalState, Move, MotionKind, MotionProgram, Plane,
    Position, ProgramBuilder, Result, SpindleDirection, SpindleState, StockVolume, Tool,
    ToolType, Units,
};

pub use millkit_gcode::{
    query, AlignToOrigin, ArcLinearize, EmitOutput, Emitter, EmitterConfig, FeedOverride,
    GcodeParser, Mirror, ParseOutput, ParserConfig, Pass, PassRegistry, PassSpec,
    PositioningSpeedFix, RemoveRedundant, ReorderPaths, ReplaceValue, Rotate, Scale,
    TimeEstimateConfig, ToolRadiusCompensation, TransformPipeline, Translate, ZMultipass,
};

pub use millkit_camtools::{
    compile_bores, select_bores, BoreFeature, CamToolError, FaceFeature, Feature, FeatureKind,
    MachineLimits, Operation, OperationParams, PatternGenerator, PatternHead, PatternKind,
    PatternSpec,
};

pub use millkit_settings::{Config, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support, INFO otherwise
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    Ok(())
}

/// Initialize logging with one JSON object per event
pub fn init_json_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install JSON logger: {}", e))?;

    Ok(())
}
