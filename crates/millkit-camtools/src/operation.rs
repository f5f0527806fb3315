//! Machining operations
//!
//! An [`Operation`] links a feature, a tool and the stock to the motion
//! program that machines it. Programs are compiled once, in the
//! constructor; changing parameters produces a new operation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use millkit_core::{
    ArcDirection, DistanceMode, ModalChange, ModalState, MotionProgram, Position, ProgramBuilder,
    SpindleDirection, SpindleState, StockVolume, Tool, ToolTooLargeError,
    UnreachableFeatureError, UnsupportedFeatureError, Units, EPSILON,
};
use millkit_gcode::{TransformPipeline, Translate};

use crate::error::{
    ensure_non_negative, ensure_positive, CamToolError, CamToolResult, ParameterError,
    ParameterResult,
};
use crate::feature::{BoreFeature, FaceFeature, Feature, FeatureKind};

/// Tolerance for treating the tool as exactly the bore size
const FIT_TOLERANCE: f64 = 1e-9;

/// Cutting parameters shared by all operations
///
/// Lengths are in the units of the feature being machined; feeds are in
/// those units per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationParams {
    /// Clearance above the stock top for positioning moves
    pub height_safe: f64,
    pub feed: f64,
    pub plunge_feed: f64,
    pub positioning_feed: f64,
    /// Depth of cut per pass
    pub doc: f64,
    /// Width of cut as a fraction of the tool diameter
    pub woc: f64,
    pub stock_to_leave_radial: f64,
    pub stock_to_leave_axial: f64,
    pub spindle_speed: Option<f64>,
    /// Peck depth for plunge boring; `None` plunges in one move
    pub peck_depth: Option<f64>,
}

impl Default for OperationParams {
    fn default() -> Self {
        Self {
            height_safe: 5.0,
            feed: 100.0,
            plunge_feed: 50.0,
            positioning_feed: 1000.0,
            doc: 0.3,
            woc: 0.5,
            stock_to_leave_radial: 0.0,
            stock_to_leave_axial: 0.0,
            spindle_speed: None,
            peck_depth: None,
        }
    }
}

impl OperationParams {
    /// Validate parameter domains
    pub fn validate(&self) -> ParameterResult<()> {
        ensure_non_negative("height_safe", self.height_safe)?;
        ensure_positive("feed", self.feed)?;
        ensure_positive("plunge_feed", self.plunge_feed)?;
        ensure_positive("positioning_feed", self.positioning_feed)?;
        ensure_positive("doc", self.doc)?;
        if !(self.woc.is_finite() && self.woc > 0.0 && self.woc <= 1.0) {
            return Err(ParameterError::out_of_range("woc", self.woc, 0.0, 1.0));
        }
        ensure_non_negative("stock_to_leave_radial", self.stock_to_leave_radial)?;
        ensure_non_negative("stock_to_leave_axial", self.stock_to_leave_axial)?;
        if let Some(speed) = self.spindle_speed {
            ensure_positive("spindle_speed", speed)?;
        }
        if let Some(peck) = self.peck_depth {
            ensure_positive("peck_depth", peck)?;
        }
        Ok(())
    }

    /// Smallest bore diameter worth boring with a tool of `tool_diameter`.
    pub fn bore_diameter_min(&self, tool_diameter: f64) -> f64 {
        (1.1 * tool_diameter).max(tool_diameter + 2.0 * self.stock_to_leave_radial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Bore,
    Face,
}

/// Compiled machining intent
#[derive(Debug, Clone)]
pub struct Operation {
    id: Uuid,
    name: String,
    kind: OperationKind,
    feature: Feature,
    tool: Arc<Tool>,
    stock: Arc<StockVolume>,
    params: OperationParams,
    program: MotionProgram,
}

fn unsupported(feature: &Feature, reason: impl Into<String>) -> CamToolError {
    UnsupportedFeatureError {
        feature_id: feature.id.clone(),
        kind: feature.kind.label().to_string(),
        reason: reason.into(),
    }
    .into()
}

fn ensure_units(feature: &Feature, tool: &Tool, stock: &StockVolume) -> CamToolResult<()> {
    feature
        .units
        .ensure_matches(tool.units, format!("tool for feature '{}'", feature.id))?;
    feature
        .units
        .ensure_matches(stock.units(), format!("stock for feature '{}'", feature.id))?;
    Ok(())
}

fn start_state(units: Units) -> ModalState {
    ModalState::with_units(units)
}

/// Units and absolute distance words, then the spindle if requested.
fn preamble(b: &mut ProgramBuilder, units: Units, params: &OperationParams) {
    b.modal(ModalChange::Units(units))
        .modal(ModalChange::Distance(DistanceMode::Absolute));
    if let Some(speed) = params.spindle_speed {
        b.spindle(SpindleState::on(SpindleDirection::Clockwise, speed));
    }
}

fn postamble(b: &mut ProgramBuilder, params: &OperationParams) {
    if let Some(speed) = params.spindle_speed {
        b.spindle(SpindleState::off(speed));
    }
}

impl Operation {
    /// Compile a bore operation
    ///
    /// Checks run in order: units, feature kind and axis, parameters and
    /// dimensions, tool fit, then reach. The program is built with the bore
    /// top at the origin and placed with a translation.
    pub fn bore(
        name: impl Into<String>,
        feature: Feature,
        tool: Arc<Tool>,
        stock: Arc<StockVolume>,
        params: OperationParams,
    ) -> CamToolResult<Self> {
        ensure_units(&feature, &tool, &stock)?;

        let bore = match &feature.kind {
            FeatureKind::Bore(bore) => *bore,
            FeatureKind::CurvedWire { .. } | FeatureKind::SweptVolume { .. } => {
                return Err(unsupported(
                    &feature,
                    "curved and swept geometry is not machined",
                ));
            }
            FeatureKind::Face(_) => {
                return Err(unsupported(&feature, "bore operation needs a bore feature"));
            }
        };
        if !bore.is_vertical() {
            return Err(unsupported(
                &feature,
                format!("bore axis {} is not parallel to -Z", bore.direction),
            ));
        }

        params.validate()?;
        ensure_positive("diameter", bore.diameter)?;
        ensure_positive("depth", bore.depth)?;

        let effective = bore.diameter - 2.0 * params.stock_to_leave_radial;
        if tool.diameter > effective + FIT_TOLERANCE {
            return Err(ToolTooLargeError {
                feature_id: feature.id.clone(),
                tool_diameter: tool.diameter,
                feature_diameter: effective,
            }
            .into());
        }

        for point in [bore.top, bore.bottom()] {
            if !stock.contains(point) {
                return Err(UnreachableFeatureError {
                    feature_id: feature.id.clone(),
                    point,
                    stock_min: stock.bounds().min,
                    stock_max: stock.bounds().max,
                }
                .into());
            }
        }

        let local = bore_program(&feature.id, &bore, &tool, &stock, &params, effective);
        let mut pipeline = TransformPipeline::new();
        pipeline.register(Arc::new(Translate::new(bore.top)));
        let program = pipeline.run(&local)?;

        tracing::info!(
            "Compiled bore '{}' (d={}, depth={}) with {}: {} instructions",
            feature.id,
            bore.diameter,
            bore.depth,
            tool.name,
            program.len()
        );

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: OperationKind::Bore,
            feature,
            tool,
            stock,
            params,
            program,
        })
    }

    /// Compile a face operation
    ///
    /// Rasters along Y across the whole stock, indexing in X by
    /// `woc * tool diameter`, stepping down by `doc` from the stock top to
    /// the face height plus the axial stock to leave.
    pub fn face(
        name: impl Into<String>,
        feature: Feature,
        tool: Arc<Tool>,
        stock: Arc<StockVolume>,
        params: OperationParams,
    ) -> CamToolResult<Self> {
        ensure_units(&feature, &tool, &stock)?;
        let face = match &feature.kind {
            FeatureKind::Face(face) => *face,
            FeatureKind::CurvedWire { .. } | FeatureKind::SweptVolume { .. } => {
                return Err(unsupported(
                    &feature,
                    "curved and swept geometry is not machined",
                ));
            }
            FeatureKind::Bore(_) => {
                return Err(unsupported(&feature, "face operation needs a face feature"));
            }
        };
        params.validate()?;
        if params.stock_to_leave_radial > 0.0 {
            tracing::warn!(
                "Face operation ignores radial stock to leave ({})",
                params.stock_to_leave_radial
            );
        }

        let z_min = face.top_z + params.stock_to_leave_axial;
        if z_min >= stock.top() - EPSILON {
            return Err(ParameterError::Inconsistent(format!(
                "face height {} is not below the stock top {}",
                z_min,
                stock.top()
            ))
            .into());
        }
        if z_min < stock.bottom() - EPSILON {
            let point = Position::new(stock.bounds().center().x, stock.bounds().center().y, z_min);
            return Err(UnreachableFeatureError {
                feature_id: feature.id.clone(),
                point,
                stock_min: stock.bounds().min,
                stock_max: stock.bounds().max,
            }
            .into());
        }

        let program = face_program(&feature.id, &face, &tool, &stock, &params, z_min);
        tracing::info!(
            "Compiled face '{}' down to z={} with {}: {} instructions",
            feature.id,
            z_min,
            tool.name,
            program.len()
        );

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: OperationKind::Face,
            feature,
            tool,
            stock,
            params,
            program,
        })
    }

    /// Compile the same feature again with new parameters
    ///
    /// The result is a new operation with its own id.
    pub fn recompile(&self, params: OperationParams) -> CamToolResult<Self> {
        let name = self.name.clone();
        let feature = self.feature.clone();
        let tool = Arc::clone(&self.tool);
        let stock = Arc::clone(&self.stock);
        match self.kind {
            OperationKind::Bore => Self::bore(name, feature, tool, stock, params),
            OperationKind::Face => Self::face(name, feature, tool, stock, params),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn tool(&self) -> &Arc<Tool> {
        &self.tool
    }

    pub fn stock(&self) -> &Arc<StockVolume> {
        &self.stock
    }

    pub fn params(&self) -> &OperationParams {
        &self.params
    }

    pub fn program(&self) -> &MotionProgram {
        &self.program
    }
}

/// Bore motion with the bore top at the origin.
fn bore_program(
    id: &str,
    bore: &BoreFeature,
    tool: &Tool,
    stock: &StockVolume,
    params: &OperationParams,
    effective: f64,
) -> MotionProgram {
    let units = tool.units;
    let safe_z = stock.top() + params.height_safe - bore.top.z;
    let clearance = params.doc / 2.0;
    let bottom = -bore.depth;

    let mut b = ProgramBuilder::new(start_state(units));
    preamble(&mut b, units, params);
    b.comment(format!(
        "Bore {}: d={}, depth={}",
        id, bore.diameter, bore.depth
    ));

    if (tool.diameter - effective).abs() <= FIT_TOLERANCE {
        b.rapid_z(safe_z).rapid_xy(0.0, 0.0).rapid_z(clearance);
        match params.peck_depth {
            Some(peck) => {
                let mut z = 0.0;
                loop {
                    z = (z - peck).max(bottom);
                    b.linear_z(z, params.plunge_feed);
                    if z <= bottom + EPSILON {
                        break;
                    }
                    b.rapid_z(clearance).rapid_z(z + clearance);
                }
            }
            None => {
                b.linear_z(bottom, params.plunge_feed);
            }
        }
    } else {
        let radius = (effective - tool.diameter) / 2.0;
        let center = Position::new(-radius, 0.0, 0.0);
        b.rapid_z(safe_z).rapid_xy(radius, 0.0).rapid_z(clearance);

        let mut z = clearance;
        loop {
            z = (z - params.doc).max(bottom);
            b.arc_to(
                Position::new(radius, 0.0, z),
                center,
                ArcDirection::Clockwise,
                params.feed,
            );
            if z <= bottom + EPSILON {
                break;
            }
        }
        // Finishing revolution at full depth.
        b.arc_to(
            Position::new(radius, 0.0, bottom),
            center,
            ArcDirection::Clockwise,
            params.feed,
        );
        b.linear_to(Position::new(0.0, 0.0, bottom), params.feed);
    }

    b.rapid_z(safe_z);
    postamble(&mut b, params);
    b.build()
}

/// Face motion in stock coordinates.
fn face_program(
    id: &str,
    face: &FaceFeature,
    tool: &Tool,
    stock: &StockVolume,
    params: &OperationParams,
    z_min: f64,
) -> MotionProgram {
    let units = tool.units;
    let bounds = stock.bounds();
    let safe_z = stock.top() + params.height_safe;
    let step = params.woc * tool.diameter;
    let y_min = bounds.min.y - 1.1 * tool.radius();
    let y_max = bounds.max.y + 1.1 * tool.radius();
    let x_start = bounds.min.x - tool.radius() + step;
    let x_max = bounds.max.x;

    let mut levels = Vec::new();
    let mut z = stock.top() - params.doc;
    while z > z_min + EPSILON {
        levels.push(z);
        z -= params.doc;
    }
    levels.push(z_min);

    let mut b = ProgramBuilder::new(start_state(units));
    preamble(&mut b, units, params);
    b.comment(format!("Face {}: top_z={}", id, face.top_z));

    for (pass, z) in levels.iter().enumerate() {
        b.comment(format!("Pass {}/{}, z={}", pass + 1, levels.len(), z));
        b.rapid_z(safe_z).rapid_xy(x_start, y_min).rapid_z(*z);

        let mut x = x_start;
        let mut forward = true;
        loop {
            let y = if forward { y_max } else { y_min };
            b.linear_to(Position::new(x, y, *z), params.feed);
            if x >= x_max - EPSILON {
                break;
            }
            x = (x + step).min(x_max);
            b.linear_to(Position::new(x, y, *z), params.feed);
            forward = !forward;
        }
    }

    b.rapid_z(safe_z);
    postamble(&mut b, params);
    b.build()
}

/// Bores a tool can machine
///
/// Keeps bores with `diameter_min <= d <= diameter_max`, where
/// `diameter_min = max(1.1 * tool diameter, tool diameter + 2 * radial stock to leave)`.
/// A bore in other units than the tool is an error.
pub fn select_bores<'a>(
    features: &'a [Feature],
    tool: &Tool,
    params: &OperationParams,
    diameter_max: Option<f64>,
) -> CamToolResult<Vec<&'a Feature>> {
    let diameter_min = params.bore_diameter_min(tool.diameter);
    let diameter_max = diameter_max.unwrap_or(f64::INFINITY);
    if diameter_max < diameter_min {
        return Err(ParameterError::out_of_range(
            "diameter_max",
            diameter_max,
            diameter_min,
            f64::INFINITY,
        )
        .into());
    }

    let mut selected = Vec::new();
    for feature in features {
        let Some(bore) = feature.as_bore() else {
            continue;
        };
        feature
            .units
            .ensure_matches(tool.units, format!("tool for feature '{}'", feature.id))?;
        if bore.diameter + EPSILON >= diameter_min && bore.diameter <= diameter_max + EPSILON {
            selected.push(feature);
        }
    }
    tracing::debug!(
        "Selected {} of {} features for boring (d >= {})",
        selected.len(),
        features.len(),
        diameter_min
    );
    Ok(selected)
}

/// One bore operation per qualifying bore
pub fn compile_bores(
    name: &str,
    features: &[Feature],
    tool: Arc<Tool>,
    stock: Arc<StockVolume>,
    params: OperationParams,
    diameter_max: Option<f64>,
) -> CamToolResult<Vec<Operation>> {
    let selected = select_bores(features, &tool, &params, diameter_max)?;
    if selected.is_empty() {
        return Err(CamToolError::NoFeatures(format!(
            "no bore of {} features fits tool '{}'",
            features.len(),
            tool.name
        )));
    }
    selected
        .into_iter()
        .map(|feature| {
            Operation::bore(
                format!("{} ({})", name, feature.id),
                feature.clone(),
                Arc::clone(&tool),
                Arc::clone(&stock),
                params,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use millkit_core::{BoundingBox, InstructionKind, MotionKind};

    fn stock() -> Arc<StockVolume> {
        Arc::new(
            StockVolume::new(
                BoundingBox::new(Position::new(0.0, 0.0, -20.0), Position::new(100.0, 60.0, 0.0)),
                Units::Millimeters,
            )
            .unwrap(),
        )
    }

    fn mill(d: f64) -> Arc<Tool> {
        Arc::new(Tool::flat_end_mill(d, 30.0, Units::Millimeters).unwrap())
    }

    fn hole(d: f64) -> Feature {
        Feature::bore(
            "hole",
            Units::Millimeters,
            BoreFeature::vertical(Position::new(20.0, 30.0, 0.0), d, 3.0),
        )
    }

    #[test]
    fn test_plunge_when_tool_fits_exactly() {
        let op = Operation::bore("b", hole(6.0), mill(6.0), stock(), OperationParams::default())
            .unwrap();
        let program = op.program();
        assert!(program.iter().all(|i| !i.as_move().is_some_and(|m| m.motion.is_arc())));
        let end = program.end_state();
        assert_eq!(end.position, Position::new(20.0, 30.0, 5.0));
        let deepest = program
            .iter()
            .filter_map(|i| i.as_move())
            .map(|m| m.target.z)
            .fold(f64::INFINITY, f64::min);
        assert!((deepest + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_peck_retracts_between_pecks() {
        let params = OperationParams {
            peck_depth: Some(1.0),
            ..OperationParams::default()
        };
        let op = Operation::bore("b", hole(6.0), mill(6.0), stock(), params).unwrap();
        let plunges: Vec<f64> = op
            .program()
            .iter()
            .filter_map(|i| i.as_move())
            .filter(|m| m.is_feed_move())
            .map(|m| m.target.z)
            .collect();
        assert_eq!(plunges.len(), 3);
        assert!((plunges[0] + 1.0).abs() < 1e-9);
        assert!((plunges[2] + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_helical_bore() {
        let params = OperationParams {
            doc: 1.0,
            spindle_speed: Some(12000.0),
            ..OperationParams::default()
        };
        let op = Operation::bore("b", hole(10.0), mill(6.0), stock(), params).unwrap();
        let program = op.program();

        let arcs: Vec<_> = program
            .replay()
            .filter_map(|s| s.instruction.as_move().map(|m| (s.before.position, *m)))
            .filter(|(_, m)| m.motion.is_arc())
            .collect();
        // 0.5 clearance, 1.0 per revolution down to -3, then a finishing circle
        assert_eq!(arcs.len(), 5);
        for (start, mv) in &arcs {
            assert!((start.x - 22.0).abs() < 1e-9 && (start.y - 30.0).abs() < 1e-9);
            assert!(matches!(
                mv.motion,
                MotionKind::Arc {
                    direction: ArcDirection::Clockwise,
                    ..
                }
            ));
        }
        assert!((arcs[4].1.target.z + 3.0).abs() < 1e-9);

        let spindle: Vec<_> = program
            .iter()
            .filter(|i| matches!(i.kind, InstructionKind::Spindle(_)))
            .collect();
        assert_eq!(spindle.len(), 2);
        assert!(!program.end_state().spindle.is_on());
    }

    #[test]
    fn test_bore_validation_order() {
        let inch = Feature::bore(
            "inch",
            Units::Inches,
            BoreFeature::vertical(Position::new(1.0, 1.0, 0.0), 0.5, 0.2),
        );
        let err = Operation::bore("b", inch, mill(6.0), stock(), OperationParams::default())
            .unwrap_err();
        assert!(err.is_unit_mismatch());

        let tilted = Feature::bore(
            "tilted",
            Units::Millimeters,
            BoreFeature {
                direction: Position::new(0.0, 1.0, -1.0),
                ..BoreFeature::vertical(Position::new(20.0, 30.0, 0.0), 10.0, 3.0)
            },
        );
        let err = Operation::bore("b", tilted, mill(6.0), stock(), OperationParams::default())
            .unwrap_err();
        assert!(err.is_unsupported());

        let outside = Feature::bore(
            "outside",
            Units::Millimeters,
            BoreFeature::vertical(Position::new(150.0, 30.0, 0.0), 10.0, 3.0),
        );
        let err = Operation::bore("b", outside, mill(6.0), stock(), OperationParams::default())
            .unwrap_err();
        assert!(err.is_unreachable());

        let too_deep = Feature::bore(
            "deep",
            Units::Millimeters,
            BoreFeature::vertical(Position::new(20.0, 30.0, 0.0), 10.0, 25.0),
        );
        let err = Operation::bore("b", too_deep, mill(6.0), stock(), OperationParams::default())
            .unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_stock_to_leave_shrinks_bore() {
        let params = OperationParams {
            stock_to_leave_radial: 0.5,
            ..OperationParams::default()
        };
        let err = Operation::bore("b", hole(6.5), mill(6.0), stock(), params).unwrap_err();
        assert!(err.is_tool_too_large());
    }

    #[test]
    fn test_recompile_gets_new_id() {
        let op = Operation::bore("b", hole(10.0), mill(6.0), stock(), OperationParams::default())
            .unwrap();
        let again = op
            .recompile(OperationParams {
                doc: 1.5,
                ..OperationParams::default()
            })
            .unwrap();
        assert_ne!(op.id(), again.id());
        assert_eq!(again.params().doc, 1.5);
        assert!(again.program().len() < op.program().len());
    }

    #[test]
    fn test_face_levels_and_extents() {
        let params = OperationParams {
            doc: 0.5,
            ..OperationParams::default()
        };
        let face = Feature::face("top", Units::Millimeters, -1.2);
        let op = Operation::face("f", face, mill(6.0), stock(), params).unwrap();
        let moves: Vec<_> = op
            .program()
            .iter()
            .filter_map(|i| i.as_move())
            .filter(|m| m.is_feed_move())
            .collect();

        let mut depths: Vec<f64> = moves.iter().map(|m| m.target.z).collect();
        depths.dedup();
        assert_eq!(depths, vec![-0.5, -1.0, -1.2]);

        let max_x = moves.iter().map(|m| m.target.x).fold(f64::MIN, f64::max);
        let min_y = moves.iter().map(|m| m.target.y).fold(f64::MAX, f64::min);
        assert!((max_x - 100.0).abs() < 1e-9);
        assert!((min_y + 3.3).abs() < 1e-9);
    }

    #[test]
    fn test_face_above_stock_is_rejected() {
        let face = Feature::face("top", Units::Millimeters, 1.0);
        let err = Operation::face("f", face, mill(6.0), stock(), OperationParams::default())
            .unwrap_err();
        assert!(err.is_parameter_error());
    }

    #[test]
    fn test_select_bores() {
        let features = vec![
            hole(6.0),
            hole(6.6),
            hole(12.0),
            Feature::face("top", Units::Millimeters, -1.0),
        ];
        let tool = mill(6.0);
        let params = OperationParams::default();
        let selected = select_bores(&features, &tool, &params, None).unwrap();
        assert_eq!(selected.len(), 2);
        let selected = select_bores(&features, &tool, &params, Some(10.0)).unwrap();
        assert_eq!(selected.len(), 1);

        let ops = compile_bores("bore", &features, tool, stock(), params, None).unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn test_compile_bores_needs_a_bore() {
        let features = vec![hole(6.0)];
        let err = compile_bores(
            "bore",
            &features,
            mill(6.0),
            stock(),
            OperationParams::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CamToolError::NoFeatures(_)));
    }
}
