//! Built-in transform passes

pub mod cleanup;
pub mod compensation;
pub mod feed;
pub mod multipass;
pub mod reorder;
pub mod transform;

pub use cleanup::{ArcLinearize, RemoveRedundant};
pub use compensation::{CompensationSide, ToolRadiusCompensation};
pub use feed::{FeedOverride, PositioningSpeedFix, ReplaceValue, ValueTarget};
pub use multipass::ZMultipass;
pub use reorder::ReorderPaths;
pub use transform::{AlignToOrigin, Mirror, Rotate, Scale, Translate};
