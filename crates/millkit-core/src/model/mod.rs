//! In-memory motion model
//!
//! This module provides:
//! - Tagged instructions (moves, tool/spindle/laser changes, dwell, comments)
//! - Explicit modal state and its replay step
//! - Immutable motion programs with replay and a builder

pub mod instruction;
pub mod modal;
pub mod program;

pub use instruction::*;
pub use modal::*;
pub use program::*;
