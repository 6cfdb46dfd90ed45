//! Model unit systems

use serde::{Deserialize, Serialize};

/// Length unit of a document or an exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Millimeters,
    Centimeters,
    #[default]
    Meters,
    Inches,
    Feet,
}

impl UnitSystem {
    pub fn meters_per_unit(self) -> f64 {
        match self {
            Self::Millimeters => 0.001,
            Self::Centimeters => 0.01,
            Self::Meters => 1.0,
            Self::Inches => 0.0254,
            Self::Feet => 0.3048,
        }
    }

    /// Factor that converts a length in `self` into a length in `target`
    pub fn scale_to(self, target: UnitSystem) -> f64 {
        self.meters_per_unit() / target.meters_per_unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_to() {
        assert!((UnitSystem::Centimeters.scale_to(UnitSystem::Meters) - 0.01).abs() < 1e-12);
        assert!((UnitSystem::Centimeters.scale_to(UnitSystem::Millimeters) - 10.0).abs() < 1e-9);
        assert!((UnitSystem::Feet.scale_to(UnitSystem::Inches) - 12.0).abs() < 1e-9);
        assert_eq!(UnitSystem::Meters.scale_to(UnitSystem::Meters), 1.0);
    }
}
