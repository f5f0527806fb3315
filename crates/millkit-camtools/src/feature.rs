//! Geometric features supplied by the geometry collaborator

use serde::{Deserialize, Serialize};

use millkit_core::{Position, Units, EPSILON};

/// Circular bore, described at its top center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoreFeature {
    /// Center of the bore's top circle
    pub top: Position,
    /// Axis direction pointing into the material
    pub direction: Position,
    pub diameter: f64,
    pub depth: f64,
}

impl BoreFeature {
    /// Bore cut straight down along -Z.
    pub fn vertical(top: Position, diameter: f64, depth: f64) -> Self {
        Self {
            top,
            direction: Position::new(0.0, 0.0, -1.0),
            diameter,
            depth,
        }
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// True when the axis is parallel to -Z.
    pub fn is_vertical(&self) -> bool {
        let norm = self.direction.norm();
        norm > EPSILON
            && (self.direction.x / norm).abs() <= 1e-9
            && (self.direction.y / norm).abs() <= 1e-9
            && self.direction.z < 0.0
    }

    /// Center of the bore bottom.
    pub fn bottom(&self) -> Position {
        let norm = self.direction.norm();
        if norm <= EPSILON {
            return self.top;
        }
        self.top + self.direction * (self.depth / norm)
    }
}

/// Flat face to be milled down to `top_z`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceFeature {
    pub top_z: f64,
}

/// Kind of machinable geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    Bore(BoreFeature),
    Face(FaceFeature),
    /// Wire with curved edges, such as a free-form outline
    CurvedWire { description: String },
    /// Volume produced by sweeping a profile along a path
    SweptVolume { description: String },
}

impl FeatureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bore(_) => "bore",
            Self::Face(_) => "face",
            Self::CurvedWire { .. } => "curved_wire",
            Self::SweptVolume { .. } => "swept_volume",
        }
    }
}

/// A feature with an identity and an explicit unit system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub units: Units,
    pub kind: FeatureKind,
}

impl Feature {
    pub fn new(id: impl Into<String>, units: Units, kind: FeatureKind) -> Self {
        Self {
            id: id.into(),
            units,
            kind,
        }
    }

    pub fn bore(id: impl Into<String>, units: Units, bore: BoreFeature) -> Self {
        Self::new(id, units, FeatureKind::Bore(bore))
    }

    pub fn face(id: impl Into<String>, units: Units, top_z: f64) -> Self {
        Self::new(id, units, FeatureKind::Face(FaceFeature { top_z }))
    }

    pub fn as_bore(&self) -> Option<&BoreFeature> {
        match &self.kind {
            FeatureKind::Bore(bore) => Some(bore),
            _ => None,
        }
    }

    pub fn as_face(&self) -> Option<&FaceFeature> {
        match &self.kind {
            FeatureKind::Face(face) => Some(face),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bore_bottom() {
        let bore = BoreFeature::vertical(Position::new(10.0, 20.0, 0.0), 8.0, 5.0);
        assert!(bore.is_vertical());
        assert_eq!(bore.bottom(), Position::new(10.0, 20.0, -5.0));
        assert_eq!(bore.radius(), 4.0);

        let tilted = BoreFeature {
            direction: Position::new(1.0, 0.0, -1.0),
            ..bore
        };
        assert!(!tilted.is_vertical());
    }

    #[test]
    fn test_feature_serde() {
        let feature = Feature::face("top", Units::Millimeters, -0.5);
        let json = serde_json::to_string(&feature).unwrap();
        assert!(json.contains("\"kind\":\"face\""));
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feature);
    }
}
