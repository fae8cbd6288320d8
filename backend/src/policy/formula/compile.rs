// Target Formula - Compilation and Evaluation
//
// Compiles a FormulaDef into a CompiledFormula: parameters are folded into
// constants, field names are resolved to slots, and depth is bounded.
// Evaluation only walks the compiled node tree.

use crate::policy::formula::types::{Computation, FormulaDef, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum nesting depth of a formula
pub const MAX_FORMULA_DEPTH: usize = 32;

/// Errors raised while compiling or evaluating a formula
#[derive(Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Field not provided: {0}")]
    FieldNotProvided(String),

    #[error("Formula exceeds maximum depth ({max})")]
    ExcessiveDepth { max: usize },

    #[error("Empty value list for min/max computation")]
    EmptyValueList,

    #[error("Non-finite literal or parameter in formula")]
    NonFinite,

    #[error("Division by zero in formula")]
    DivisionByZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum UnaryOp {
    Abs,
    Floor,
    Ceil,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Const(f64),
    Slot(usize),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Unary(UnaryOp, Box<Node>),
    Max(Vec<Node>),
    Min(Vec<Node>),
    Clamp(Box<Node>, Box<Node>, Box<Node>),
    SafeDiv(Box<Node>, Box<Node>, Box<Node>),
}

/// A formula ready for evaluation
///
/// # Example
///
/// ```rust
/// use compliance_search_core_rs::policy::formula::{CompiledFormula, FormulaDef};
///
/// let def: FormulaDef = serde_json::from_str(r#"{
///     "expression": {"compute": {"op": "*", "left": {"field": "footprint_ft2"}, "right": {"param": "k"}}},
///     "parameters": {"k": 4.0}
/// }"#).unwrap();
/// let formula = CompiledFormula::compile(&def).unwrap();
///
/// assert_eq!(formula.fields(), &["footprint_ft2".to_string()]);
/// assert_eq!(formula.evaluate(&[50.0]).unwrap(), 200.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFormula {
    root: Node,
    fields: Vec<String>,
}

impl CompiledFormula {
    /// Compile a formula definition
    ///
    /// # Errors
    ///
    /// Fails on unknown parameters, non-finite constants, empty min/max
    /// lists and expressions nested deeper than `MAX_FORMULA_DEPTH`.
    pub fn compile(def: &FormulaDef) -> Result<Self, FormulaError> {
        let mut compiler = Compiler {
            def,
            fields: Vec::new(),
        };
        let root = compiler.value(&def.expression, 0)?;
        Ok(Self {
            root,
            fields: compiler.fields,
        })
    }

    /// Field names in slot order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Evaluate with slot values parallel to `fields()`
    pub fn evaluate(&self, slots: &[f64]) -> Result<f64, FormulaError> {
        if slots.len() < self.fields.len() {
            return Err(FormulaError::FieldNotProvided(
                self.fields[slots.len()].clone(),
            ));
        }
        eval(&self.root, slots)
    }

    /// Evaluate, resolving each field through `lookup`
    pub fn evaluate_with(&self, lookup: impl Fn(&str) -> Option<f64>) -> Result<f64, FormulaError> {
        let slots = self
            .fields
            .iter()
            .map(|name| lookup(name).ok_or_else(|| FormulaError::FieldNotProvided(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        eval(&self.root, &slots)
    }
}

// ============================================================================
// COMPILATION
// ============================================================================

struct Compiler<'a> {
    def: &'a FormulaDef,
    fields: Vec<String>,
}

impl Compiler<'_> {
    fn value(&mut self, value: &Value, depth: usize) -> Result<Node, FormulaError> {
        if depth > MAX_FORMULA_DEPTH {
            return Err(FormulaError::ExcessiveDepth {
                max: MAX_FORMULA_DEPTH,
            });
        }

        match value {
            Value::Field { field } => {
                let slot = match self.fields.iter().position(|f| f == field) {
                    Some(slot) => slot,
                    None => {
                        self.fields.push(field.clone());
                        self.fields.len() - 1
                    }
                };
                Ok(Node::Slot(slot))
            }
            Value::Param { param } => {
                let v = *self
                    .def
                    .parameters
                    .get(param)
                    .ok_or_else(|| FormulaError::ParameterNotFound(param.clone()))?;
                constant(v)
            }
            Value::Literal { value } => constant(*value),
            Value::Compute { compute } => self.computation(compute, depth + 1),
        }
    }

    fn boxed(&mut self, value: &Value, depth: usize) -> Result<Box<Node>, FormulaError> {
        Ok(Box::new(self.value(value, depth)?))
    }

    fn computation(&mut self, computation: &Computation, depth: usize) -> Result<Node, FormulaError> {
        let d = depth + 1;
        let node = match computation {
            Computation::Add { left, right } => {
                Node::Binary(BinaryOp::Add, self.boxed(left, d)?, self.boxed(right, d)?)
            }
            Computation::Subtract { left, right } => {
                Node::Binary(BinaryOp::Subtract, self.boxed(left, d)?, self.boxed(right, d)?)
            }
            Computation::Multiply { left, right } => {
                Node::Binary(BinaryOp::Multiply, self.boxed(left, d)?, self.boxed(right, d)?)
            }
            Computation::Divide { left, right } => {
                Node::Binary(BinaryOp::Divide, self.boxed(left, d)?, self.boxed(right, d)?)
            }
            Computation::Max { values } => Node::Max(self.list(values, d)?),
            Computation::Min { values } => Node::Min(self.list(values, d)?),
            Computation::Abs { value } => Node::Unary(UnaryOp::Abs, self.boxed(value, d)?),
            Computation::Floor { value } => Node::Unary(UnaryOp::Floor, self.boxed(value, d)?),
            Computation::Ceil { value } => Node::Unary(UnaryOp::Ceil, self.boxed(value, d)?),
            Computation::Clamp { value, min, max } => Node::Clamp(
                self.boxed(value, d)?,
                self.boxed(min, d)?,
                self.boxed(max, d)?,
            ),
            Computation::SafeDiv {
                numerator,
                denominator,
                default,
            } => Node::SafeDiv(
                self.boxed(numerator, d)?,
                self.boxed(denominator, d)?,
                self.boxed(default, d)?,
            ),
        };
        Ok(node)
    }

    fn list(&mut self, values: &[Value], depth: usize) -> Result<Vec<Node>, FormulaError> {
        if values.is_empty() {
            return Err(FormulaError::EmptyValueList);
        }
        values.iter().map(|v| self.value(v, depth)).collect()
    }
}

fn constant(v: f64) -> Result<Node, FormulaError> {
    if v.is_finite() {
        Ok(Node::Const(v))
    } else {
        Err(FormulaError::NonFinite)
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

fn eval(node: &Node, slots: &[f64]) -> Result<f64, FormulaError> {
    match node {
        Node::Const(v) => Ok(*v),
        // Slot indices are assigned at compile time and checked by the callers
        Node::Slot(i) => Ok(slots[*i]),
        Node::Binary(op, left, right) => {
            let l = eval(left, slots)?;
            let r = eval(right, slots)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Subtract => Ok(l - r),
                BinaryOp::Multiply => Ok(l * r),
                BinaryOp::Divide => {
                    if r.abs() < f64::EPSILON {
                        return Err(FormulaError::DivisionByZero);
                    }
                    Ok(l / r)
                }
            }
        }
        Node::Unary(op, value) => {
            let v = eval(value, slots)?;
            Ok(match op {
                UnaryOp::Abs => v.abs(),
                UnaryOp::Floor => v.floor(),
                UnaryOp::Ceil => v.ceil(),
            })
        }
        Node::Max(values) => values
            .iter()
            .try_fold(f64::NEG_INFINITY, |acc, v| Ok(acc.max(eval(v, slots)?))),
        Node::Min(values) => values
            .iter()
            .try_fold(f64::INFINITY, |acc, v| Ok(acc.min(eval(v, slots)?))),
        Node::Clamp(value, min, max) => {
            let v = eval(value, slots)?;
            let lo = eval(min, slots)?;
            let hi = eval(max, slots)?;
            Ok(v.max(lo).min(hi))
        }
        Node::SafeDiv(numerator, denominator, default) => {
            let den = eval(denominator, slots)?;
            if den.abs() < f64::EPSILON {
                eval(default, slots)
            } else {
                Ok(eval(numerator, slots)? / den)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn field(name: &str) -> Value {
        Value::Field {
            field: name.to_string(),
        }
    }

    fn lit(value: f64) -> Value {
        Value::Literal { value }
    }

    fn compute(c: Computation) -> Value {
        Value::Compute {
            compute: Box::new(c),
        }
    }

    fn def(expression: Value) -> FormulaDef {
        FormulaDef {
            expression,
            parameters: BTreeMap::new(),
        }
    }

    #[test]
    fn test_footprint_curve_is_clamped() {
        // clamp(4 * footprint + 20, 150, 250)
        let expr = compute(Computation::Clamp {
            value: compute(Computation::Add {
                left: compute(Computation::Multiply {
                    left: lit(4.0),
                    right: field("footprint_ft2"),
                }),
                right: lit(20.0),
            }),
            min: lit(150.0),
            max: lit(250.0),
        });
        let formula = CompiledFormula::compile(&def(expr)).unwrap();

        assert_eq!(formula.evaluate(&[10.0]).unwrap(), 150.0);
        assert_eq!(formula.evaluate(&[45.0]).unwrap(), 200.0);
        assert_eq!(formula.evaluate(&[100.0]).unwrap(), 250.0);
    }

    #[test]
    fn test_repeated_field_shares_slot() {
        let expr = compute(Computation::Add {
            left: field("workfactor"),
            right: field("workfactor"),
        });
        let formula = CompiledFormula::compile(&def(expr)).unwrap();
        assert_eq!(formula.fields().len(), 1);
        assert_eq!(formula.evaluate(&[3.0]).unwrap(), 6.0);
    }

    #[test]
    fn test_unknown_parameter_fails_at_compile() {
        let expr = Value::Param {
            param: "missing".to_string(),
        };
        assert_eq!(
            CompiledFormula::compile(&def(expr)),
            Err(FormulaError::ParameterNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut expr = lit(1.0);
        for _ in 0..MAX_FORMULA_DEPTH {
            expr = compute(Computation::Abs { value: expr });
        }
        assert!(matches!(
            CompiledFormula::compile(&def(expr)),
            Err(FormulaError::ExcessiveDepth { .. })
        ));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let expr = compute(Computation::Divide {
            left: lit(1.0),
            right: field("x"),
        });
        let formula = CompiledFormula::compile(&def(expr)).unwrap();
        assert_eq!(formula.evaluate(&[0.0]), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_missing_field_lookup() {
        let formula = CompiledFormula::compile(&def(field("footprint_ft2"))).unwrap();
        assert_eq!(
            formula.evaluate_with(|_| None),
            Err(FormulaError::FieldNotProvided("footprint_ft2".to_string()))
        );
        assert_eq!(formula.evaluate_with(|_| Some(42.0)).unwrap(), 42.0);
    }
}
