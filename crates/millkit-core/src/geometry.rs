//! Geometric primitives shared by the motion model and the machining code
//!
//! Positions are plain `f64` triples. Arc math works in the active plane using
//! a right-handed in-plane basis, so "counter-clockwise" always means a
//! positive rotation about the plane normal.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::units::Units;

/// Tolerance used for geometric equality checks.
pub const EPSILON: f64 = 1e-9;

/// Upper bound on the chords used to approximate one arc.
pub const MAX_ARC_SEGMENTS: usize = 10_000;

/// Linear machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three linear axes in canonical order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Axis word letter
    pub fn letter(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
        }
    }

    /// Arc center word letter for this axis (I, J or K).
    pub fn center_letter(self) -> char {
        match self {
            Self::X => 'I',
            Self::Y => 'J',
            Self::Z => 'K',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A point (or vector) in machine space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// The origin.
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Read one coordinate.
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Return a copy with one coordinate replaced.
    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
        self
    }

    /// Multiply each coordinate by the matching component of `factors`.
    pub fn scale_by(&self, factors: Position) -> Position {
        Position::new(self.x * factors.x, self.y * factors.y, self.z * factors.z)
    }

    pub fn dot(&self, other: Position) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length when treated as a vector.
    pub fn norm(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    pub fn distance(&self, other: Position) -> f64 {
        (*self - other).norm()
    }

    /// Componentwise approximate equality.
    pub fn approx_eq(&self, other: Position, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }

    /// Convert a position expressed in `from` units into `to` units.
    pub fn convert(&self, from: Units, to: Units) -> Position {
        *self * from.factor_to(to)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Position {
        Position::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position::new(-self.x, -self.y, -self.z)
    }
}

/// Arc plane selection (G17, G18, G19)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Plane {
    #[default]
    Xy,
    Xz,
    Yz,
}

impl Plane {
    pub fn gcode(self) -> u8 {
        match self {
            Self::Xy => 17,
            Self::Xz => 18,
            Self::Yz => 19,
        }
    }

    pub fn from_gcode(code: u8) -> Option<Self> {
        match code {
            17 => Some(Self::Xy),
            18 => Some(Self::Xz),
            19 => Some(Self::Yz),
            _ => None,
        }
    }

    /// In-plane axes `(a, b)` ordered so that `a x b` points along the normal.
    pub fn axes(self) -> (Axis, Axis) {
        match self {
            Self::Xy => (Axis::X, Axis::Y),
            Self::Xz => (Axis::Z, Axis::X),
            Self::Yz => (Axis::Y, Axis::Z),
        }
    }

    /// Axis perpendicular to the plane.
    pub fn normal(self) -> Axis {
        match self {
            Self::Xy => Axis::Z,
            Self::Xz => Axis::Y,
            Self::Yz => Axis::X,
        }
    }

    /// Unit normal vector.
    pub fn normal_vector(self) -> Position {
        Position::ZERO.with(self.normal(), 1.0)
    }

    /// Center words the emitter writes for arcs in this plane, in I/J/K order.
    pub fn center_axes(self) -> [Axis; 2] {
        match self {
            Self::Xy => [Axis::X, Axis::Y],
            Self::Xz => [Axis::X, Axis::Z],
            Self::Yz => [Axis::Y, Axis::Z],
        }
    }
}

/// Arc rotation sense as seen from the positive end of the plane normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArcDirection {
    /// G2
    Clockwise,
    /// G3
    CounterClockwise,
}

impl ArcDirection {
    pub fn gcode(self) -> u8 {
        match self {
            Self::Clockwise => 2,
            Self::CounterClockwise => 3,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }
}

/// Reference point of a bounding box used for alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Center,
    LowerLeft,
    LowerRight,
    UpperLeft,
    UpperRight,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

impl BoundingBox {
    /// Box spanning two corners given in any order.
    pub fn new(a: Position, b: Position) -> Self {
        Self {
            min: Position::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Position::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Degenerate box holding one point.
    pub fn from_point(p: Position) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box holding every point, or `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::from_point(first);
        for p in iter {
            bbox.include(p);
        }
        Some(bbox)
    }

    /// Grow the box to hold `p`.
    pub fn include(&mut self, p: Position) {
        self.min = Position::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Position::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut merged = *self;
        merged.include(other.min);
        merged.include(other.max);
        merged
    }

    pub fn center(&self) -> Position {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Position {
        self.max - self.min
    }

    /// Inclusive containment test with a tolerance on every axis.
    pub fn contains(&self, p: Position, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }

    /// Inclusive containment ignoring Z.
    pub fn contains_xy(&self, p: Position, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
    }

    /// XY location of an anchor; Z is the box minimum.
    pub fn anchor(&self, anchor: Anchor) -> Position {
        let c = self.center();
        match anchor {
            Anchor::Center => Position::new(c.x, c.y, self.min.z),
            Anchor::LowerLeft => Position::new(self.min.x, self.min.y, self.min.z),
            Anchor::LowerRight => Position::new(self.max.x, self.min.y, self.min.z),
            Anchor::UpperLeft => Position::new(self.min.x, self.max.y, self.min.z),
            Anchor::UpperRight => Position::new(self.max.x, self.max.y, self.min.z),
        }
    }

    pub fn convert(&self, from: Units, to: Units) -> BoundingBox {
        BoundingBox::new(self.min.convert(from, to), self.max.convert(from, to))
    }
}

/// A circular (possibly helical) arc resolved to absolute geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcGeometry {
    pub start: Position,
    pub end: Position,
    pub center: Position,
    pub radius: f64,
    /// Angle of the start point in the plane basis, radians
    pub start_angle: f64,
    /// Signed sweep, positive counter-clockwise
    pub sweep: f64,
    pub plane: Plane,
}

impl ArcGeometry {
    /// Resolve an arc from its start point, end point and center offset.
    ///
    /// Returns `None` when the radius is zero. An end point that coincides
    /// with the start in the arc plane describes a full circle.
    pub fn resolve(
        start: Position,
        end: Position,
        center_offset: Position,
        direction: ArcDirection,
        plane: Plane,
    ) -> Option<Self> {
        let (a, b) = plane.axes();
        let normal = plane.normal();
        let center = (start + center_offset).with(normal, start.get(normal));

        let sa = start.get(a) - center.get(a);
        let sb = start.get(b) - center.get(b);
        let radius = sa.hypot(sb);
        if radius <= EPSILON || !radius.is_finite() {
            return None;
        }

        let start_angle = sb.atan2(sa);
        let end_angle = (end.get(b) - center.get(b)).atan2(end.get(a) - center.get(a));
        let mut sweep = end_angle - start_angle;
        match direction {
            ArcDirection::CounterClockwise => {
                while sweep <= EPSILON {
                    sweep += TAU;
                }
            }
            ArcDirection::Clockwise => {
                while sweep >= -EPSILON {
                    sweep -= TAU;
                }
            }
        }

        Some(Self {
            start,
            end,
            center,
            radius,
            start_angle,
            sweep,
            plane,
        })
    }

    pub fn direction(&self) -> ArcDirection {
        if self.sweep >= 0.0 {
            ArcDirection::CounterClockwise
        } else {
            ArcDirection::Clockwise
        }
    }

    /// Travel along the plane normal between start and end.
    pub fn rise(&self) -> f64 {
        let n = self.plane.normal();
        self.end.get(n) - self.start.get(n)
    }

    /// Exact helical length.
    pub fn length(&self) -> f64 {
        (self.radius * self.sweep.abs()).hypot(self.rise())
    }

    /// Point at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Position {
        let (a, b) = self.plane.axes();
        let n = self.plane.normal();
        let angle = self.start_angle + self.sweep * t;
        Position::ZERO
            .with(a, self.center.get(a) + self.radius * angle.cos())
            .with(b, self.center.get(b) + self.radius * angle.sin())
            .with(n, self.start.get(n) + self.rise() * t)
    }

    /// Number of chords needed to keep the sagitta under `tolerance`,
    /// capped at [`MAX_ARC_SEGMENTS`].
    pub fn segment_count(&self, tolerance: f64) -> usize {
        let step = if tolerance > 0.0 && tolerance < self.radius {
            2.0 * (1.0 - tolerance / self.radius).acos()
        } else {
            std::f64::consts::PI
        };
        if self.sweep.abs() <= EPSILON {
            return 1;
        }
        if step <= EPSILON {
            return MAX_ARC_SEGMENTS;
        }
        let count = (self.sweep.abs() / step).ceil();
        (count as usize).clamp(1, MAX_ARC_SEGMENTS)
    }

    /// Chord end points, excluding the start and ending exactly at `end`.
    pub fn linearize(&self, tolerance: f64) -> Vec<Position> {
        let n = self.segment_count(tolerance);
        let mut points: Vec<Position> = (1..n)
            .map(|i| self.point_at(i as f64 / n as f64))
            .collect();
        points.push(self.end);
        points
    }

    /// Length of the chord approximation at `tolerance`.
    pub fn linearized_length(&self, tolerance: f64) -> f64 {
        let mut previous = self.start;
        self.linearize(tolerance)
            .into_iter()
            .map(|p| {
                let d = previous.distance(p);
                previous = p;
                d
            })
            .sum()
    }
}
