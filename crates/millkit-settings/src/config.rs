//! Configuration management for millkit
//!
//! Provides configuration file handling, defaults and validation. Supports
//! JSON and TOML file formats, picked by file extension.
//!
//! Configuration is organized into sections:
//! - Parser settings (laser mode, laser S scale)
//! - Emitter settings (precision, comment style)
//! - Query settings (rapid rate, arc tolerance)
//! - Machine limits and safe height
//! - Operation defaults
//! - A default transform pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use millkit_camtools::{MachineLimits, OperationParams};
use millkit_core::Units;
use millkit_gcode::{
    CommentStyle, EmitterConfig, ParserConfig, PassSpec, TimeEstimateConfig, TransformPipeline,
};

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Highest number of decimal places the emitter accepts
const MAX_PRECISION: usize = 9;

/// Parser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    /// Treat M3/M4/M5 and S as laser commands
    pub laser_mode: bool,
    /// S value at 100% laser power
    pub laser_max: f64,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            laser_mode: false,
            laser_max: 1000.0,
        }
    }
}

/// Emitter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterSettings {
    /// Decimal places for coordinates and feeds
    pub precision: usize,
    pub comment_style: CommentStyle,
    /// S value at 100% laser power
    pub laser_max: f64,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            precision: 3,
            comment_style: CommentStyle::Parentheses,
            laser_max: 1000.0,
        }
    }
}

/// Query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Chord tolerance for arc lengths
    pub arc_tolerance: f64,
    /// Rapid traverse rate in units/min
    pub rapid_rate: f64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            arc_tolerance: 0.01,
            rapid_rate: 5000.0,
        }
    }
}

/// Machine capability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    pub units: Units,
    /// Maximum feed rate in units/min
    pub max_feed: f64,
    pub max_power_percent: f64,
    pub max_spindle_rpm: f64,
    /// Height for positioning moves
    pub safe_z: f64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            units: Units::Millimeters,
            max_feed: 5000.0,
            max_power_percent: 100.0,
            max_spindle_rpm: 24000.0,
            safe_z: 5.0,
        }
    }
}

/// Default cutting parameters for new operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationDefaults {
    pub height_safe: f64,
    pub feed: f64,
    pub plunge_feed: f64,
    pub positioning_feed: f64,
    pub doc: f64,
    /// Fraction of the tool diameter
    pub woc: f64,
    pub stock_to_leave_radial: f64,
    pub stock_to_leave_axial: f64,
    pub spindle_speed: Option<f64>,
    pub peck_depth: Option<f64>,
}

impl Default for OperationDefaults {
    fn default() -> Self {
        OperationParams::default().into()
    }
}

impl From<OperationParams> for OperationDefaults {
    fn from(p: OperationParams) -> Self {
        Self {
            height_safe: p.height_safe,
            feed: p.feed,
            plunge_feed: p.plunge_feed,
            positioning_feed: p.positioning_feed,
            doc: p.doc,
            woc: p.woc,
            stock_to_leave_radial: p.stock_to_leave_radial,
            stock_to_leave_axial: p.stock_to_leave_axial,
            spindle_speed: p.spindle_speed,
            peck_depth: p.peck_depth,
        }
    }
}

impl From<&OperationDefaults> for OperationParams {
    fn from(d: &OperationDefaults) -> Self {
        Self {
            height_safe: d.height_safe,
            feed: d.feed,
            plunge_feed: d.plunge_feed,
            positioning_feed: d.positioning_feed,
            doc: d.doc,
            woc: d.woc,
            stock_to_leave_radial: d.stock_to_leave_radial,
            stock_to_leave_axial: d.stock_to_leave_axial,
            spindle_speed: d.spindle_speed,
            peck_depth: d.peck_depth,
        }
    }
}

/// Complete millkit configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub parser: ParserSettings,
    pub emitter: EmitterSettings,
    pub query: QuerySettings,
    pub machine: MachineSettings,
    pub operation: OperationDefaults,
    /// Passes applied by [`Config::build_pipeline`]
    pub pipeline: Vec<PassSpec>,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into()),
    }
}

fn positive(key: &str, value: f64) -> SettingsResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::invalid(
            key,
            format!("must be > 0, got {}", value),
        ))
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location: `<config dir>/millkit/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            SettingsError::ConfigDirectory("no configuration directory on this platform".into())
        })?;
        Ok(dir.join("millkit").join("config.toml"))
    }

    /// Load config from the default location, or defaults if there is no file
    pub fn load_or_default() -> SettingsResult<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    ///
    /// Missing parent directories are created.
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let format = format_of(path)?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        positive("parser.laser_max", self.parser.laser_max)?;

        if self.emitter.precision > MAX_PRECISION {
            return Err(ConfigError::ValueOutOfRange {
                key: "emitter.precision".to_string(),
                value: self.emitter.precision.to_string(),
            }
            .into());
        }
        positive("emitter.laser_max", self.emitter.laser_max)?;

        positive("query.rapid_rate", self.query.rapid_rate)?;
        if !(self.query.arc_tolerance.is_finite() && self.query.arc_tolerance >= 0.0) {
            return Err(SettingsError::invalid(
                "query.arc_tolerance",
                format!("must be >= 0, got {}", self.query.arc_tolerance),
            ));
        }

        positive("machine.max_feed", self.machine.max_feed)?;
        positive("machine.max_spindle_rpm", self.machine.max_spindle_rpm)?;
        if !(self.machine.max_power_percent > 0.0 && self.machine.max_power_percent <= 100.0) {
            return Err(SettingsError::invalid(
                "machine.max_power_percent",
                format!("must be in (0, 100], got {}", self.machine.max_power_percent),
            ));
        }
        if !self.machine.safe_z.is_finite() {
            return Err(SettingsError::invalid("machine.safe_z", "must be finite"));
        }

        self.operation_params()
            .validate()
            .map_err(|e| SettingsError::invalid("operation", e.to_string()))?;
        if self.operation.feed > self.machine.max_feed {
            return Err(SettingsError::invalid(
                "operation.feed",
                format!(
                    "{} exceeds machine.max_feed {}",
                    self.operation.feed, self.machine.max_feed
                ),
            ));
        }

        for spec in &self.pipeline {
            spec.build()?;
        }
        Ok(())
    }

    /// Merge another config into this one
    ///
    /// Sections of `other` that still hold their defaults leave this config's
    /// values alone; a non-empty pipeline replaces this one.
    pub fn merge(&mut self, other: &Config) {
        let defaults = Config::default();
        if other.parser.laser_mode != defaults.parser.laser_mode
            || other.parser.laser_max != defaults.parser.laser_max
        {
            self.parser = other.parser.clone();
        }
        if other.emitter.precision != defaults.emitter.precision
            || other.emitter.comment_style != defaults.emitter.comment_style
            || other.emitter.laser_max != defaults.emitter.laser_max
        {
            self.emitter = other.emitter.clone();
        }
        if other.query.rapid_rate != defaults.query.rapid_rate
            || other.query.arc_tolerance != defaults.query.arc_tolerance
        {
            self.query = other.query.clone();
        }
        if other.machine.units != defaults.machine.units
            || other.machine.max_feed != defaults.machine.max_feed
            || other.machine.max_power_percent != defaults.machine.max_power_percent
            || other.machine.max_spindle_rpm != defaults.machine.max_spindle_rpm
            || other.machine.safe_z != defaults.machine.safe_z
        {
            self.machine = other.machine.clone();
        }
        if OperationParams::from(&other.operation) != OperationParams::default() {
            self.operation = other.operation.clone();
        }
        if !other.pipeline.is_empty() {
            self.pipeline = other.pipeline.clone();
        }
    }

    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            laser_mode: self.parser.laser_mode,
            laser_max: self.parser.laser_max,
        }
    }

    pub fn emitter_config(&self) -> EmitterConfig {
        EmitterConfig {
            precision: self.emitter.precision,
            comment_style: self.emitter.comment_style,
            laser_max: self.emitter.laser_max,
            ..EmitterConfig::default()
        }
    }

    pub fn time_config(&self) -> TimeEstimateConfig {
        TimeEstimateConfig {
            rapid_rate: self.query.rapid_rate,
            arc_tolerance: self.query.arc_tolerance,
        }
    }

    pub fn machine_limits(&self) -> MachineLimits {
        MachineLimits {
            max_feed: self.machine.max_feed,
            max_power_percent: self.machine.max_power_percent,
            max_spindle_rpm: self.machine.max_spindle_rpm,
            units: self.machine.units,
        }
    }

    pub fn operation_params(&self) -> OperationParams {
        OperationParams::from(&self.operation)
    }

    /// Build the configured transform pipeline
    pub fn build_pipeline(&self) -> SettingsResult<TransformPipeline> {
        let pipeline = TransformPipeline::from_specs(&self.pipeline)?;
        tracing::debug!("Built pipeline with {} passes", pipeline.pass_count());
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.emitter_config(), EmitterConfig::default());
        assert_eq!(config.parser_config(), ParserConfig::default());
        assert_eq!(config.time_config(), TimeEstimateConfig::default());
        assert_eq!(config.machine_limits(), MachineLimits::default());
        assert_eq!(config.operation_params(), OperationParams::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new();
        config.emitter.precision = 12;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));

        let mut config = Config::new();
        config.query.rapid_rate = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));

        let mut config = Config::new();
        config.operation.woc = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.operation.feed = 9000.0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.pipeline.push(PassSpec::ArcLinearize { tolerance: 0.0 });
        assert!(matches!(config.validate(), Err(SettingsError::Pipeline(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::new()
            .save_to_file(Path::new("settings.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Config(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_merge_keeps_unset_sections() {
        let mut base = Config::new();
        base.query.rapid_rate = 3000.0;

        let mut other = Config::new();
        other.emitter.precision = 4;
        other.pipeline.push(PassSpec::RemoveRedundant);

        base.merge(&other);
        assert_eq!(base.query.rapid_rate, 3000.0);
        assert_eq!(base.emitter.precision, 4);
        assert_eq!(base.pipeline.len(), 1);
    }
}
