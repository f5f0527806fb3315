//! # millkit G-code
//!
//! Text I/O and program processing for millkit: a line parser that collects
//! errors instead of aborting, a minimal canonical emitter, the transform
//! pass pipeline with its built-in passes, and read-only program queries.

pub mod emitter;
pub mod parser;
pub mod passes;
pub mod pipeline;
pub mod query;

pub use emitter::{format_number, CommentStyle, EmitIter, EmitOutput, Emitter, EmitterConfig};
pub use parser::{GcodeParser, ParseOutput, ParserConfig};
pub use passes::{
    AlignToOrigin, ArcLinearize, CompensationSide, FeedOverride, Mirror, PositioningSpeedFix,
    RemoveRedundant, ReorderPaths, ReplaceValue, Rotate, Scale, ToolRadiusCompensation, Translate,
    ValueTarget, ZMultipass,
};
pub use pipeline::{
    apply_streaming, Pass, PassConfig, PassHandle, PassRegistry, PassScope, PassSpec,
    TransformPipeline,
};
pub use query::{Annotation, PathLength, ProgramSummary, TimeEstimateConfig};
