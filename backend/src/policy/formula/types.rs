// Target Formula - Type Definitions
//
// JSON expression format for per-vehicle target coefficients.
// Deserialized once at load time and compiled; never evaluated from strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// FORMULA DEFINITION
// ============================================================================

/// A target formula as written in a scenario file
///
/// # Example
///
/// ```json
/// {
///   "expression": {"compute": {"op": "clamp",
///     "value": {"compute": {"op": "+",
///       "left": {"compute": {"op": "*", "left": {"param": "slope"}, "right": {"field": "footprint_ft2"}}},
///       "right": {"param": "intercept"}}},
///     "min": {"value": 150.0},
///     "max": {"value": 250.0}}},
///   "parameters": {"slope": 4.0, "intercept": 20.0}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDef {
    /// Root value of the expression
    pub expression: Value,

    /// Named constants referenced by `{"param": ...}`
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

impl FormulaDef {
    /// Formula that always evaluates to `value`
    pub fn constant(value: f64) -> Self {
        Self {
            expression: Value::Literal { value },
            parameters: BTreeMap::new(),
        }
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// A value in a formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Vehicle attribute, e.g. "footprint_ft2"
    Field { field: String },

    /// Named formula parameter
    Param { param: String },

    /// Numeric literal
    Literal { value: f64 },

    /// Nested computation
    Compute { compute: Box<Computation> },
}

// ============================================================================
// COMPUTATIONS
// ============================================================================

/// Arithmetic computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Computation {
    #[serde(rename = "+")]
    Add { left: Value, right: Value },

    #[serde(rename = "-")]
    Subtract { left: Value, right: Value },

    #[serde(rename = "*")]
    Multiply { left: Value, right: Value },

    /// Division (zero denominator is an evaluation error)
    #[serde(rename = "/")]
    Divide { left: Value, right: Value },

    #[serde(rename = "max")]
    Max { values: Vec<Value> },

    #[serde(rename = "min")]
    Min { values: Vec<Value> },

    #[serde(rename = "abs")]
    Abs { value: Value },

    #[serde(rename = "floor")]
    Floor { value: Value },

    #[serde(rename = "ceil")]
    Ceil { value: Value },

    /// Clamp value to [min, max]
    #[serde(rename = "clamp")]
    Clamp { value: Value, min: Value, max: Value },

    /// Safe division: `default` when the denominator is zero
    #[serde(rename = "div0")]
    SafeDiv {
        numerator: Value,
        denominator: Value,
        default: Value,
    },
}

// ============================================================================
// TESTS
// ============================================================================
