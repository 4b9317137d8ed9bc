//! Units as opaque strings with a process-wide, read-only conversion
//! table keyed by `"from-to"`. Dimension tags reject conversions across
//! incompatible physical quantities.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PkError, PkResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit(String);

impl Unit {
    pub fn new(s: impl Into<String>) -> Self {
        Unit(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Weight,
    Time,
    Concentration,
}

/// A registry the drug-model library can extend; this crate seeds it
/// with the minimum pairs the dosage model and extractor require.
#[derive(Debug, Clone)]
pub struct ConversionTable {
    factors: HashMap<(String, String), f64>,
    dimensions: HashMap<String, Dimension>,
}

impl ConversionTable {
    pub fn new() -> Self {
        ConversionTable {
            factors: HashMap::new(),
            dimensions: HashMap::new(),
        }
    }

    pub fn register_dimension(&mut self, unit: &str, dimension: Dimension) {
        self.dimensions.insert(unit.to_string(), dimension);
    }

    pub fn register_factor(&mut self, from: &str, to: &str, factor: f64) {
        self.factors.insert((from.to_string(), to.to_string()), factor);
        // Identity is always registered for a unit against itself.
        self.factors.entry((from.to_string(), from.to_string())).or_insert(1.0);
        self.factors.entry((to.to_string(), to.to_string())).or_insert(1.0);
    }

    pub fn dimension_of(&self, unit: &Unit) -> Option<Dimension> {
        self.dimensions.get(unit.as_str()).copied()
    }

    /// `convert(value, from, to) = value * factor(from, to)` if the pair
    /// is registered, otherwise `UnitConversionError`.
    pub fn convert(&self, value: f64, from: &Unit, to: &Unit) -> PkResult<f64> {
        if from == to {
            return Ok(value);
        }
        match self.factors.get(&(from.as_str().to_string(), to.as_str().to_string())) {
            Some(factor) => Ok(value * factor),
            None => Err(PkError::UnitConversionError {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }

    /// The minimum conversion table described by the external interface
    /// contract: identity for every registered unit, the weight pairs
    /// used by dosages, and the concentration pairs used by intake
    /// output/PK results.
    pub fn standard() -> Self {
        let mut table = ConversionTable::new();

        for unit in ["mg", "g", "ug", "mg/l", "ug/l", "h", "d", "m", "s"] {
            table.factors.insert((unit.to_string(), unit.to_string()), 1.0);
        }

        table.register_dimension("mg", Dimension::Weight);
        table.register_dimension("g", Dimension::Weight);
        table.register_dimension("ug", Dimension::Weight);
        table.register_dimension("mg/l", Dimension::Concentration);
        table.register_dimension("ug/l", Dimension::Concentration);
        table.register_dimension("h", Dimension::Time);
        table.register_dimension("d", Dimension::Time);
        table.register_dimension("m", Dimension::Time);
        table.register_dimension("s", Dimension::Time);

        table.register_factor("mg", "g", 0.001);
        table.register_factor("g", "mg", 1000.0);
        table.register_factor("mg", "ug", 1000.0);
        table.register_factor("ug", "mg", 0.001);
        table.register_factor("g", "ug", 1_000_000.0);
        table.register_factor("ug", "g", 0.000_001);

        table.register_factor("mg/l", "ug/l", 1000.0);
        table.register_factor("ug/l", "mg/l", 0.001);

        table.register_factor("d", "h", 24.0);
        table.register_factor("h", "d", 1.0 / 24.0);
        table.register_factor("h", "m", 60.0);
        table.register_factor("m", "h", 1.0 / 60.0);
        table.register_factor("m", "s", 60.0);
        table.register_factor("s", "m", 1.0 / 60.0);

        table
    }

    /// Converts a weight-dimension value, as used when a dosage's dose is
    /// reported in the requested target unit during extraction.
    pub fn convert_weight(&self, value: f64, from: &Unit, to: &Unit) -> PkResult<f64> {
        self.convert(value, from, to)
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_conversion() {
        let table = ConversionTable::standard();
        let mg = Unit::new("mg");
        assert_eq!(table.convert(42.0, &mg, &mg).unwrap(), 42.0);
    }

    #[test]
    fn weight_round_trip() {
        let table = ConversionTable::standard();
        let mg = Unit::new("mg");
        let g = Unit::new("g");
        let converted = table.convert(250.0, &mg, &g).unwrap();
        let back = table.convert(converted, &g, &mg).unwrap();
        assert!((back - 250.0).abs() < 1e-9);
    }

    #[test]
    fn concentration_factor_is_1000() {
        let table = ConversionTable::standard();
        let mgl = Unit::new("mg/l");
        let ugl = Unit::new("ug/l");
        assert_eq!(table.convert(1.0, &mgl, &ugl).unwrap(), 1000.0);
        assert!((table.convert(1000.0, &ugl, &mgl).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unregistered_pair_is_an_error() {
        let table = ConversionTable::standard();
        let mg = Unit::new("mg");
        let h = Unit::new("h");
        assert!(table.convert(1.0, &mg, &h).is_err());
    }
}
