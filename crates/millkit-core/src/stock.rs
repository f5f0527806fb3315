//! Stock volume supplied by the geometry collaborator

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Position, EPSILON};
use crate::units::Units;

/// Axis-aligned raw material volume, read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockVolume {
    bounds: BoundingBox,
    margin: f64,
    units: Units,
}

impl StockVolume {
    /// Stock with explicit bounds and no margin.
    pub fn new(bounds: BoundingBox, units: Units) -> Result<Self> {
        if !(bounds.min.is_finite() && bounds.max.is_finite()) {
            return Err(Error::invalid_parameter("bounds", "stock bounds must be finite"));
        }
        let size = bounds.size();
        if size.x <= 0.0 || size.y <= 0.0 || size.z < 0.0 {
            return Err(Error::invalid_parameter(
                "bounds",
                format!("stock must have positive XY extent, got {}", size),
            ));
        }
        Ok(Self {
            bounds,
            margin: 0.0,
            units,
        })
    }

    /// Stock fitted around a part.
    ///
    /// XY grows by `margin` on every side; Z grows only at the top, the
    /// bottom stays on the part bottom.
    pub fn around(part: BoundingBox, margin: f64, units: Units) -> Result<Self> {
        if !(margin.is_finite() && margin >= 0.0) {
            return Err(Error::invalid_parameter(
                "margin",
                format!("stock margin must be >= 0, got {}", margin),
            ));
        }
        let bounds = BoundingBox::new(
            Position::new(part.min.x - margin, part.min.y - margin, part.min.z),
            Position::new(part.max.x + margin, part.max.y + margin, part.max.z + margin),
        );
        let mut stock = Self::new(bounds, units)?;
        stock.margin = margin;
        Ok(stock)
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Top face height.
    pub fn top(&self) -> f64 {
        self.bounds.max.z
    }

    /// Bottom face height.
    pub fn bottom(&self) -> f64 {
        self.bounds.min.z
    }

    /// Inclusive containment.
    pub fn contains(&self, point: Position) -> bool {
        self.bounds.contains(point, EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part() -> BoundingBox {
        BoundingBox::new(Position::new(0.0, 0.0, -10.0), Position::new(50.0, 30.0, 0.0))
    }

    #[test]
    fn test_around_adds_margin_on_top_only() {
        let stock = StockVolume::around(part(), 2.0, Units::Millimeters).unwrap();
        assert_eq!(stock.bounds().min, Position::new(-2.0, -2.0, -10.0));
        assert_eq!(stock.bounds().max, Position::new(52.0, 32.0, 2.0));
        assert_eq!(stock.top(), 2.0);
        assert_eq!(stock.bottom(), -10.0);
        assert_eq!(stock.margin(), 2.0);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let stock = StockVolume::new(part(), Units::Millimeters).unwrap();
        assert!(stock.contains(Position::new(50.0, 30.0, 0.0)));
        assert!(!stock.contains(Position::new(50.1, 30.0, 0.0)));
    }

    #[test]
    fn test_rejects_degenerate_and_negative_margin() {
        let flat = BoundingBox::new(Position::ZERO, Position::new(0.0, 10.0, 1.0));
        assert!(StockVolume::new(flat, Units::Millimeters).is_err());
        assert!(StockVolume::around(part(), -1.0, Units::Millimeters).is_err());
    }
}
