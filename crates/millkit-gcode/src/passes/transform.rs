//! Geometric transform passes: translate, scale, mirror, rotate and align

use nalgebra::{Matrix3, Rotation3, Vector3};

use millkit_core::{
    Anchor, Axis, GeometryError, Instruction, InstructionKind, ModalState, MotionKind,
    MotionProgram, Move, Position, Result, EPSILON,
};

use crate::pipeline::{apply_streaming, Pass, PassScope};
use crate::query;

/// Apply a streaming pass and map the start position with the same point
/// transform, so arcs that start at the program origin stay consistent.
fn apply_with_start<P, F>(pass: &P, program: &MotionProgram, map: F) -> Result<MotionProgram>
where
    P: Pass + ?Sized,
    F: Fn(Position) -> Position,
{
    let transformed = apply_streaming(pass, program)?;
    let mut start = *program.start_state();
    start.position = map(start.position);
    Ok(MotionProgram::new(start, transformed.into_instructions()))
}

/// Replace the move of `instruction` with `mv` mapped through `f`.
fn map_move<F>(instruction: &Instruction, f: F) -> Result<Vec<Instruction>>
where
    F: FnOnce(&Move) -> Result<Move>,
{
    match &instruction.kind {
        InstructionKind::Move(mv) => Ok(vec![instruction.with_move(f(mv)?)]),
        _ => Ok(vec![instruction.clone()]),
    }
}

/// Translates every move target by a fixed offset
///
/// Arc center offsets are relative and stay unchanged.
#[derive(Debug, Clone)]
pub struct Translate {
    offset: Position,
}

impl Translate {
    /// Create a new translate pass
    pub fn new(offset: Position) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Position {
        self.offset
    }

    fn is_identity(&self) -> bool {
        self.offset.norm() == 0.0
    }
}

impl Pass for Translate {
    fn name(&self) -> &str {
        "translate"
    }

    fn description(&self) -> &str {
        "Translates move targets by a fixed offset"
    }

    fn transform(
        &self,
        _index: usize,
        instruction: &Instruction,
        _state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        map_move(instruction, |mv| {
            let mut mv = *mv;
            mv.target = mv.target + self.offset;
            Ok(mv)
        })
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        if self.is_identity() {
            return Ok(program.clone());
        }
        apply_with_start(self, program, |p| p + self.offset)
    }
}

/// Scales move targets about a pivot
///
/// Arcs survive only when both in-plane factors have the same magnitude; a
/// sign difference between them reverses the arc direction.
#[derive(Debug, Clone)]
pub struct Scale {
    factors: Position,
    pivot: Position,
}

impl Scale {
    /// Create a new scale pass; every factor must be finite and non-zero
    pub fn new(factors: Position, pivot: Position) -> Result<Self> {
        for axis in Axis::ALL {
            let f = factors.get(axis);
            if !f.is_finite() || f.abs() <= EPSILON {
                return Err(GeometryError::InvalidTransform {
                    reason: format!("scale factor for {} must be non-zero, got {}", axis, f),
                }
                .into());
            }
        }
        Ok(Self { factors, pivot })
    }

    /// Uniform scale about the origin
    pub fn uniform(factor: f64) -> Result<Self> {
        Self::new(Position::new(factor, factor, factor), Position::ZERO)
    }

    /// Uniform scale about `pivot`
    pub fn about(factor: f64, pivot: Position) -> Result<Self> {
        Self::new(Position::new(factor, factor, factor), pivot)
    }

    pub fn factors(&self) -> Position {
        self.factors
    }

    fn is_identity(&self) -> bool {
        self.factors == Position::new(1.0, 1.0, 1.0)
    }

    fn map_point(&self, p: Position) -> Position {
        self.pivot + (p - self.pivot).scale_by(self.factors)
    }
}

impl Pass for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn description(&self) -> &str {
        "Scales move targets about a pivot point"
    }

    fn transform(
        &self,
        index: usize,
        instruction: &Instruction,
        state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        map_move(instruction, |mv| {
            let mut out = *mv;
            out.target = self.map_point(mv.target);
            if let MotionKind::Arc { direction, center } = mv.motion {
                let (a, b) = state.plane.axes();
                let (fa, fb) = (self.factors.get(a), self.factors.get(b));
                if (fa.abs() - fb.abs()).abs() > EPSILON {
                    return Err(GeometryError::NonUniformArcScale {
                        index,
                        first: fa,
                        second: fb,
                    }
                    .into());
                }
                out.motion = MotionKind::Arc {
                    direction: if fa * fb < 0.0 {
                        direction.reversed()
                    } else {
                        direction
                    },
                    center: center.scale_by(self.factors),
                };
            }
            Ok(out)
        })
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        if self.is_identity() {
            return Ok(program.clone());
        }
        apply_with_start(self, program, |p| self.map_point(p))
    }
}

/// Mirrors one axis about a coordinate
#[derive(Debug, Clone)]
pub struct Mirror {
    axis: Axis,
    about: f64,
    scale: Scale,
}

impl Mirror {
    /// Create a new mirror pass
    pub fn new(axis: Axis, about: f64) -> Self {
        let factors = Position::new(1.0, 1.0, 1.0).with(axis, -1.0);
        let pivot = Position::ZERO.with(axis, about);
        Self {
            axis,
            about,
            scale: Scale { factors, pivot },
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn about(&self) -> f64 {
        self.about
    }
}

impl Pass for Mirror {
    fn name(&self) -> &str {
        "mirror"
    }

    fn description(&self) -> &str {
        "Mirrors one axis, reversing arcs in planes that contain it"
    }

    fn transform(
        &self,
        index: usize,
        instruction: &Instruction,
        state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        self.scale.transform(index, instruction, state)
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        self.scale.apply(program)
    }
}

fn to_vector(p: Position) -> Vector3<f64> {
    Vector3::new(p.x, p.y, p.z)
}

fn from_vector(v: Vector3<f64>) -> Position {
    Position::new(v.x, v.y, v.z)
}

/// Rotates move targets about a pivot
#[derive(Debug, Clone)]
pub struct Rotate {
    rotation: Rotation3<f64>,
    pivot: Position,
}

impl Rotate {
    /// Rotation about the Z axis through `pivot`, counter-clockwise degrees
    pub fn about_z(degrees: f64, pivot: Position) -> Self {
        Self {
            rotation: Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians()),
            pivot,
        }
    }

    /// Rotation from a 3x3 matrix
    ///
    /// The matrix must be orthonormal with a positive determinant.
    pub fn from_matrix(matrix: Matrix3<f64>, pivot: Position) -> Result<Self> {
        let tolerance = 1e-9;
        let orthonormal = (matrix * matrix.transpose() - Matrix3::identity()).abs().max() <= tolerance;
        if !orthonormal || matrix.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::InvalidTransform {
                reason: "rotation matrix is not orthonormal".to_string(),
            }
            .into());
        }
        if matrix.determinant() <= 0.0 {
            return Err(GeometryError::InvalidTransform {
                reason: "rotation matrix contains a reflection".to_string(),
            }
            .into());
        }
        Ok(Self {
            rotation: Rotation3::from_matrix_unchecked(matrix),
            pivot,
        })
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    fn is_identity(&self) -> bool {
        self.rotation.angle().abs() <= EPSILON
    }

    fn map_point(&self, p: Position) -> Position {
        self.pivot + self.map_vector(p - self.pivot)
    }

    fn map_vector(&self, v: Position) -> Position {
        from_vector(self.rotation * to_vector(v))
    }
}

impl Pass for Rotate {
    fn name(&self) -> &str {
        "rotate"
    }

    fn description(&self) -> &str {
        "Rotates move targets about a pivot point"
    }

    fn transform(
        &self,
        index: usize,
        instruction: &Instruction,
        state: &ModalState,
    ) -> Result<Vec<Instruction>> {
        map_move(instruction, |mv| {
            let mut out = *mv;
            out.target = self.map_point(mv.target);
            if let MotionKind::Arc { direction, center } = mv.motion {
                let normal = state.plane.normal_vector();
                let rotated = self.map_vector(normal);
                let direction = if (rotated - normal).norm() <= 1e-9 {
                    direction
                } else if (rotated + normal).norm() <= 1e-9 {
                    direction.reversed()
                } else {
                    return Err(GeometryError::ArcPlaneNotPreserved { index }.into());
                };
                out.motion = MotionKind::Arc {
                    direction,
                    center: self.map_vector(center),
                };
            }
            Ok(out)
        })
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        if self.is_identity() {
            return Ok(program.clone());
        }
        apply_with_start(self, program, |p| self.map_point(p))
    }
}

/// Moves the program so a bounding-box anchor lands on the XY origin
#[derive(Debug, Clone)]
pub struct AlignToOrigin {
    anchor: Anchor,
}

impl AlignToOrigin {
    /// Create a new align pass
    pub fn new(anchor: Anchor) -> Self {
        Self { anchor }
    }
}

impl Pass for AlignToOrigin {
    fn name(&self) -> &str {
        "align_to_origin"
    }

    fn description(&self) -> &str {
        "Translates the program so its bounding-box anchor sits at the XY origin"
    }

    fn scope(&self) -> PassScope {
        PassScope::WholeProgram
    }

    fn apply(&self, program: &MotionProgram) -> Result<MotionProgram> {
        let Some(bbox) = query::bounding_box(program) else {
            return Ok(program.clone());
        };
        let anchor = bbox.anchor(self.anchor);
        Translate::new(Position::new(-anchor.x, -anchor.y, 0.0)).apply(program)
    }
}
