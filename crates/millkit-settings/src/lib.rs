//! millkit Settings Crate
//!
//! Handles configuration files, defaults and conversion into the parser,
//! emitter, query, operation and pipeline configuration types.

pub mod config;
pub mod error;

pub use config::{
    Config, EmitterSettings, MachineSettings, OperationDefaults, ParserSettings, QuerySettings,
};
pub use error::{ConfigError, SettingsError, SettingsResult};
