//! Transform pass pipeline and registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use millkit_core::{
    Anchor, Axis, Error, Instruction, ModalState, MotionProgram, Position, Result, Tool,
};

use crate::passes::{
    AlignToOrigin, ArcLinearize, CompensationSide, FeedOverride, Mirror, PositioningSpeedFix,
    RemoveRedundant, ReorderPaths, ReplaceValue, Rotate, Scale, ToolRadiusCompensation,
    Translate, ValueTarget, ZMultipass,
};

/// Configuration options for transform passes
///
/// Carries the enabled flag and free-form options for passes created through
/// a [`PassRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Whether this pass is enabled
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Pass-specific options
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl PassConfig {
    /// Create a new pass configuration
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: serde_json::Map::new(),
        }
    }

    /// Create a disabled pass configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            options: serde_json::Map::new(),
        }
    }

    /// Set a configuration option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Get a configuration option
    pub fn get_option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }

    /// Get a numeric option
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get_option(key).and_then(serde_json::Value::as_f64)
    }
}

impl Default for PassConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How a pass consumes its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassScope {
    /// One instruction at a time, given the state before it
    Streaming,
    /// Needs the whole program (reordering, alignment, multipass)
    WholeProgram,
}

/// Trait for motion program transform passes
///
/// Passes are pure: they take a program and return a new one. Streaming
/// passes implement [`Pass::transform`] and inherit [`Pass::apply`];
/// whole-program passes override `apply`.
pub trait Pass: Send + Sync {
    /// Get the name/identifier of this pass
    fn name(&self) -> &str;

    /// Get a description of what this pass does
    fn description(&self) -> &str;

    fn scope(&self) -> PassScope {
        PassScope::Streaming
    }

    /// Transform a single instruction
    ///
    /// # Arguments
    /// * `index` - Position of the instruction in the input program
    /// * `instruction` - The instruction to transform
    /// * `state` - Modal state before the instruction
    ///
    /// # Returns
    /// Zero or more replacement instructions.
    fn transform(
        &self,
        _index: usize,
        instruction: &Instruction,
        _state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        Ok(vec![instruction.clone()])
    }

    /// Apply the pass to a whole program
    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        apply_streaming(self, program)
    }

    /// Check if this pass is enabled
    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    /// Get the configuration for this pass
    fn config(&self) -> &PassConfig {
        static DEFAULT_CONFIG: std::sync::OnceLock<PassConfig> = std::sync::OnceLock::new();
        DEFAULT_CONFIG.get_or_init(PassConfig::new)
    }
}

/// Run `pass.transform` over every instruction of `program`.
pub fn apply_streaming<P>(pass: &P, program: &MotionProgram) -> Result<MotionProgram>
where
    P: Pass + ?Sized,
{
    let mut output = Vec::with_capacity(program.len());
    for step in program.replay() {
        output.extend(pass.transform(step.index, step.instruction, &step.before)?);
    }
    Ok(program.with_instructions(output))
}

/// Arc-wrapped pass for thread-safe sharing
pub type PassHandle = Arc<dyn Pass>;

/// Transform pass pipeline
///
/// Applies registered passes left to right; each pass sees the output of the
/// previous one.
///
/// # Example
/// ```ignore
/// let mut pipeline = TransformPipeline::new();
/// pipeline.register(Arc::new(Scale::uniform(2.0)?));
/// pipeline.register(Arc::new(Translate::new(Position::new(10.0, 0.0, 0.0))));
///
/// let placed = pipeline.run(&program)?;
/// ```
#[derive(Clone, Default)]
pub struct TransformPipeline {
    passes: Vec<PassHandle>,
}

impl TransformPipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Build a pipeline from built-in pass descriptions
    pub fn from_specs(specs: &[PassSpec]) -> Result<Self> {
        let mut pipeline = Self::new();
        for spec in specs {
            pipeline.register(spec.build()?);
        }
        Ok(pipeline)
    }

    /// Register a pass in the pipeline
    ///
    /// Passes are applied in the order they are registered.
    pub fn register(&mut self, pass: PassHandle) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Register multiple passes at once
    pub fn register_all(&mut self, passes: Vec<PassHandle>) -> &mut Self {
        self.passes.extend(passes);
        self
    }

    /// Get the number of registered passes
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn get_pass(&self, index: usize) -> Option<&PassHandle> {
        self.passes.get(index)
    }

    pub fn get_pass_by_name(&self, name: &str) -> Option<&PassHandle> {
        self.passes.iter().find(|p| p.name() == name)
    }

    /// List all registered passes as `(name, description, enabled)`
    pub fn list_passes(&self) -> Vec<(&str, &str, bool)> {
        self.passes
            .iter()
            .map(|p| (p.name(), p.description(), p.is_enabled()))
            .collect()
    }

    /// Run every enabled pass over `program`
    pub fn run(&self, program: &MotionProgram) -> Result<MotionProgram> {
        let mut current = program.clone();
        for pass in &self.passes {
            if !pass.is_enabled() {
                tracing::debug!("Skipping disabled pass '{}'", pass.name());
                continue;
            }
            let before = current.len();
            current = pass.apply(&current).map_err(|e| {
                tracing::warn!("Pass '{}' failed: {}", pass.name(), e);
                e
            })?;
            tracing::debug!(
                "Pass '{}' ({:?}): {} -> {} instructions",
                pass.name(),
                pass.scope(),
                before,
                current.len()
            );
        }
        Ok(current)
    }

    /// Clear all passes from the pipeline
    pub fn clear(&mut self) {
        self.passes.clear();
    }
}

fn default_passes() -> u32 {
    1
}

/// Serializable description of a pass
///
/// Used by configuration files to describe a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pass", rename_all = "snake_case")]
pub enum PassSpec {
    Translate {
        offset: Position,
    },
    Scale {
        factors: Position,
        #[serde(default)]
        pivot: Position,
    },
    Mirror {
        axis: Axis,
        #[serde(default)]
        about: f64,
    },
    Rotate {
        degrees: f64,
        #[serde(default)]
        pivot: Position,
    },
    AlignToOrigin {
        #[serde(default)]
        anchor: Anchor,
    },
    FeedOverride {
        percent: f64,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    ReplaceValue {
        target: ValueTarget,
        from: f64,
        to: f64,
    },
    PositioningSpeedFix {
        retract_height: f64,
        positioning_feed: f64,
    },
    ArcLinearize {
        tolerance: f64,
    },
    RemoveRedundant,
    ZMultipass {
        z_top: f64,
        stepdown: f64,
    },
    ReorderPaths {
        safe_z: f64,
    },
    ToolRadiusCompensation {
        tool: Tool,
        side: CompensationSide,
        #[serde(default = "default_passes")]
        passes: u32,
    },
    /// Pass provided by a [`PassRegistry`] factory
    Custom {
        name: String,
        #[serde(default)]
        config: PassConfig,
    },
}

impl PassSpec {
    /// Name of the pass this spec builds
    pub fn name(&self) -> &str {
        match self {
            Self::Translate { .. } => "translate",
            Self::Scale { .. } => "scale",
            Self::Mirror { .. } => "mirror",
            Self::Rotate { .. } => "rotate",
            Self::AlignToOrigin { .. } => "align_to_origin",
            Self::FeedOverride { .. } => "feed_override",
            Self::ReplaceValue { .. } => "replace_value",
            Self::PositioningSpeedFix { .. } => "positioning_speed_fix",
            Self::ArcLinearize { .. } => "arc_linearize",
            Self::RemoveRedundant => "remove_redundant",
            Self::ZMultipass { .. } => "z_multipass",
            Self::ReorderPaths { .. } => "reorder_paths",
            Self::ToolRadiusCompensation { .. } => "tool_radius_compensation",
            Self::Custom { name, .. } => name,
        }
    }

    /// Build a built-in pass
    ///
    /// `Custom` specs need a [`PassRegistry`].
    pub fn build(&self) -> Result<PassHandle> {
        let pass: PassHandle = match self {
            Self::Translate { offset } => Arc::new(Translate::new(*offset)),
            Self::Scale { factors, pivot } => Arc::new(Scale::new(*factors, *pivot)?),
            Self::Mirror { axis, about } => Arc::new(Mirror::new(*axis, *about)),
            Self::Rotate { degrees, pivot } => Arc::new(Rotate::about_z(*degrees, *pivot)),
            Self::AlignToOrigin { anchor } => Arc::new(AlignToOrigin::new(*anchor)),
            Self::FeedOverride { percent, min, max } => {
                Arc::new(FeedOverride::new(*percent)?.with_bounds(*min, *max)?)
            }
            Self::ReplaceValue { target, from, to } => {
                Arc::new(ReplaceValue::new(*target, *from, *to)?)
            }
            Self::PositioningSpeedFix {
                retract_height,
                positioning_feed,
            } => Arc::new(PositioningSpeedFix::new(*retract_height, *positioning_feed)?),
            Self::ArcLinearize { tolerance } => Arc::new(ArcLinearize::new(*tolerance)?),
            Self::RemoveRedundant => Arc::new(RemoveRedundant::new()),
            Self::ZMultipass { z_top, stepdown } => Arc::new(ZMultipass::new(*z_top, *stepdown)?),
            Self::ReorderPaths { safe_z } => Arc::new(ReorderPaths::new(*safe_z)),
            Self::ToolRadiusCompensation { tool, side, passes } => Arc::new(
                ToolRadiusCompensation::new(Arc::new(tool.clone()), *side).with_passes(*passes),
            ),
            Self::Custom { name, .. } => {
                return Err(Error::invalid_parameter(
                    name.clone(),
                    "custom passes must be built through a pass registry",
                ))
            }
        };
        Ok(pass)
    }
}

type PassFactory = Arc<dyn Fn(&PassConfig) -> Result<PassHandle> + Send + Sync>;

/// Pass registry for custom passes
///
/// Maps names to factories and builds pipelines from [`PassSpec`] lists,
/// resolving `Custom` entries through the registered factories.
#[derive(Clone, Default)]
pub struct PassRegistry {
    factories: HashMap<String, PassFactory>,
}

impl PassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with a factory for every built-in pass
    ///
    /// Built-in factories read their parameters from the config options,
    /// using the same field names as [`PassSpec`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for name in [
            "translate",
            "scale",
            "mirror",
            "rotate",
            "align_to_origin",
            "feed_override",
            "replace_value",
            "positioning_speed_fix",
            "arc_linearize",
            "remove_redundant",
            "z_multipass",
            "reorder_paths",
            "tool_radius_compensation",
        ] {
            registry.register(name, move |config: &PassConfig| {
                let mut fields = config.options.clone();
                fields.insert("pass".to_string(), serde_json::Value::from(name));
                let spec: PassSpec = serde_json::from_value(serde_json::Value::Object(fields))
                    .map_err(|e| Error::invalid_parameter(name, e.to_string()))?;
                spec.build()
            });
        }
        registry
    }

    /// Register a pass factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PassConfig) -> Result<PassHandle> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Create a pass by name
    pub fn create(&self, name: &str, config: &PassConfig) -> Result<PassHandle> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::invalid_parameter(name, "unknown pass"))?;
        factory(config)
    }

    /// Build a pipeline from pass descriptions
    ///
    /// Disabled custom entries are left out.
    pub fn build_pipeline(&self, specs: &[PassSpec]) -> Result<TransformPipeline> {
        let mut pipeline = TransformPipeline::new();
        for spec in specs {
            match spec {
                PassSpec::Custom { name, config } => {
                    if !config.enabled {
                        tracing::debug!("Pass '{}' disabled in configuration", name);
                        continue;
                    }
                    pipeline.register(self.create(name, config)?);
                }
                builtin => {
                    pipeline.register(builtin.build()?);
                }
            }
        }
        Ok(pipeline)
    }

    /// List all registered pass names
    pub fn list_registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
